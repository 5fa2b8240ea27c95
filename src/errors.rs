use thiserror::Error;

use crate::executor::safety::PolicyViolation;

#[derive(Debug, Error)]
pub enum DeskPilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    /// Planning model unreachable or its output unusable. Always recovered by
    /// the fallback parser; never returned from `parse_intent`.
    #[error("Planning failure: {0}")]
    Planning(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Policy denied: {0}")]
    PolicyDenied(#[from] PolicyViolation),

    #[error("Provider failure: {0}")]
    Provider(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("App control error: {0}")]
    App(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Executor is already running a sequence")]
    AlreadyExecuting,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Sequence cancelled")]
    Cancelled,
}

impl serde::Serialize for DeskPilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type DeskPilotResult<T> = Result<T, DeskPilotError>;
