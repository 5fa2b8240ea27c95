//! Screen analysis and text extraction backed by the `vision` LLM role.
//!
//! The captured PNG is sent inline (base64 data URI) together with an
//! instruction to answer in JSON; the reply goes through the same JSON
//! extraction strategies as the plan parser.
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::registry::{ProviderRegistry, Role};
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl, MessageContent};
use crate::perception::traits::{ScreenAnalyzer, TextExtractor};
use crate::perception::types::{ImageHandle, OcrResult, ScreenAnalysis};
use crate::planner::extract::extract_json_object;

const ANALYZE_PROMPT: &str = "\
Describe this screenshot for a desktop automation engine. Objective: {objective}
Respond with JSON only:
{\"description\": string, \"scene_type\": string, \"elements\": [{\"type\": \"button|input|link|text|image|checkbox|menu|icon|container\", \"label\": string, \"bbox\": [xmin, ymin, xmax, ymax], \"confidence\": number}]}
Bounding boxes are normalized to 0.0-1.0.";

const OCR_PROMPT: &str = "\
Transcribe all readable text in this screenshot.
Respond with JSON only:
{\"text\": full text in reading order, \"words\": [{\"text\": string, \"bbox\": [xmin, ymin, xmax, ymax], \"confidence\": number}], \"confidence\": number}
Bounding boxes are normalized to 0.0-1.0.";

pub struct LlmVisionAnalyzer {
    registry: Arc<ProviderRegistry>,
}

impl LlmVisionAnalyzer {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    async fn ask(&self, image: &ImageHandle, instruction: String) -> DeskPilotResult<serde_json::Value> {
        let (provider, cfg) = self.registry.call_config_for_role(Role::Vision)?;
        let message = ChatMessage {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", image.to_base64()),
                    },
                },
                ContentPart::Text { text: instruction },
            ]),
        };
        let response = provider.chat(vec![message], &cfg).await?;
        extract_json_object(&response.content).ok_or_else(|| {
            DeskPilotError::Perception(format!(
                "vision model returned no JSON ({} chars)",
                response.content.len()
            ))
        })
    }
}

#[async_trait]
impl ScreenAnalyzer for LlmVisionAnalyzer {
    async fn analyze(&self, image: &ImageHandle, objective: &str) -> DeskPilotResult<ScreenAnalysis> {
        let json = self
            .ask(image, ANALYZE_PROMPT.replace("{objective}", objective))
            .await?;
        let mut analysis: ScreenAnalysis = serde_json::from_value(json)?;
        for (i, element) in analysis.elements.iter_mut().enumerate() {
            if element.id.is_empty() {
                element.id = format!("e{i}");
            }
        }
        tracing::debug!(
            elements = analysis.elements.len(),
            scene = %analysis.scene_type,
            "screen analyzed"
        );
        Ok(analysis)
    }
}

#[async_trait]
impl TextExtractor for LlmVisionAnalyzer {
    async fn extract_text(&self, image: &ImageHandle) -> DeskPilotResult<OcrResult> {
        let json = self.ask(image, OCR_PROMPT.to_string()).await?;
        let result: OcrResult = serde_json::from_value(json)?;
        tracing::debug!(chars = result.text.len(), words = result.words.len(), "text extracted");
        Ok(result)
    }
}
