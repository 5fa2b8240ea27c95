use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Button,
    Input,
    Link,
    Text,
    Image,
    Checkbox,
    Radio,
    Select,
    Menu,
    MenuItem,
    Icon,
    Container,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UIElement {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "type")]
    pub node_type: ElementType,
    /// Normalized bounding box [xmin, ymin, xmax, ymax] in range 0.0–1.0
    pub bbox: [f32; 4],
    #[serde(default, alias = "label", alias = "text")]
    pub content: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl UIElement {
    /// Centre of the bounding box in physical pixel coordinates.
    pub fn center_physical(&self, meta: &ScreenshotMeta) -> (i32, i32) {
        let cx = ((self.bbox[0] + self.bbox[2]) / 2.0 * meta.physical_width as f32).round() as i32;
        let cy = ((self.bbox[1] + self.bbox[3]) / 2.0 * meta.physical_height as f32).round() as i32;
        (cx, cy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    pub monitor_index: u32,
    pub scale_factor: f64,
    pub physical_width: u32,
    pub physical_height: u32,
    pub logical_width: u32,
    pub logical_height: u32,
}

impl ScreenshotMeta {
    /// Meta for a single monitor without DPI scaling.
    pub fn unscaled(width: u32, height: u32) -> Self {
        Self {
            monitor_index: 0,
            scale_factor: 1.0,
            physical_width: width,
            physical_height: height,
            logical_width: width,
            logical_height: height,
        }
    }
}

/// Reference to a captured screen image. Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    pub id: String,
    pub meta: ScreenshotMeta,
    pub captured_at: chrono::DateTime<chrono::Utc>,
    /// Encoded image bytes (PNG for the built-in capture provider).
    pub bytes: Arc<[u8]>,
}

impl ImageHandle {
    pub fn new(bytes: Vec<u8>, meta: ScreenshotMeta) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            meta,
            captured_at: chrono::Utc::now(),
            bytes: Arc::from(bytes),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// JSON summary stored as an action result (pixels are not included).
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "image_id": &self.id,
            "width": self.meta.physical_width,
            "height": self.meta.physical_height,
            "captured_at": self.captured_at.to_rfc3339(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OcrWord {
    pub text: String,
    /// Normalized bounding box, when the extractor reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
    #[serde(default)]
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OcrResult {
    pub text: String,
    #[serde(default)]
    pub words: Vec<OcrWord>,
    #[serde(default)]
    pub confidence: f32,
}

/// Structured description of what is on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScreenAnalysis {
    #[serde(default)]
    pub elements: Vec<UIElement>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scene_type: String,
}

impl ScreenAnalysis {
    /// Best element for a free-text description: exact label match, then
    /// substring match, then highest confidence with any label overlap.
    pub fn find_element(&self, description: &str) -> Option<&UIElement> {
        let wanted = description.trim().to_lowercase();
        let label = |e: &UIElement| e.content.as_deref().unwrap_or("").trim().to_lowercase();

        if let Some(e) = self.elements.iter().find(|e| label(e) == wanted) {
            return Some(e);
        }
        if let Some(e) = self
            .elements
            .iter()
            .filter(|e| {
                let l = label(e);
                !l.is_empty() && (l.contains(&wanted) || wanted.contains(&l))
            })
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        {
            return Some(e);
        }
        let words: Vec<&str> = wanted.split_whitespace().collect();
        self.elements
            .iter()
            .filter(|e| {
                let l = label(e);
                words.iter().any(|w| w.len() > 2 && l.contains(w))
            })
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}
