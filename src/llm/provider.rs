use async_trait::async_trait;

use crate::errors::DeskPilotResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, PlanTextResponse};

/// Unified LLM provider trait. All providers implement this trait.
/// New providers only need to implement this trait and register in config.toml.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Runs one chat completion and returns the accumulated reply.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> DeskPilotResult<LlmResponse>;
}

/// Text-completion model used to turn an intent into a JSON plan.
#[async_trait]
pub trait PlanningModel: Send + Sync {
    async fn plan_text(&self, prompt: &str) -> PlanTextResponse;
}
