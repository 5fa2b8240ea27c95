use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::perception::types::{ImageHandle, OcrResult, ScreenAnalysis};

/// Captures the current screen.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self) -> DeskPilotResult<ImageHandle>;
}

/// Optical character recognition over a captured image.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, image: &ImageHandle) -> DeskPilotResult<OcrResult>;
}

/// Vision analysis: UI elements and a scene description, steered by an objective.
#[async_trait]
pub trait ScreenAnalyzer: Send + Sync {
    async fn analyze(&self, image: &ImageHandle, objective: &str) -> DeskPilotResult<ScreenAnalysis>;
}
