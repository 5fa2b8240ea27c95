use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser::{self, SseLineBuffer};
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// `timeout` bounds each whole request, streamed body included.
    pub fn new(id: String, api_base: String, api_key: String, timeout: Duration) -> DeskPilotResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            id,
            api_base,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> DeskPilotResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            messages = messages.len(),
            "sending LLM request"
        );

        let mut request = self.client.post(&self.api_base).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskPilotError::LlmProvider(format!("{}: {}", status, err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Handle SSE streaming response, accumulating the full reply.
    async fn handle_stream(&self, response: reqwest::Response) -> DeskPilotResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut lines = SseLineBuffer::new();
        let mut out = LlmResponse::default();

        'stream: while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            for line in lines.push(&bytes) {
                if apply_sse_line(&line, &mut out) {
                    break 'stream;
                }
            }
        }
        if let Some(tail) = lines.finish() {
            apply_sse_line(&tail, &mut out);
        }

        tracing::info!(
            provider = %self.id,
            content_len = out.content.len(),
            reasoning_len = out.reasoning.len(),
            "LLM stream complete"
        );
        Ok(out)
    }

    /// Handle a non-streaming JSON response.
    async fn handle_json(&self, response: reqwest::Response) -> DeskPilotResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;
        let message = &json["choices"][0]["message"];

        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["reasoning_content"].as_str().unwrap_or("").to_string();

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            "LLM JSON response received"
        );
        Ok(LlmResponse { content, reasoning })
    }
}

/// Folds one SSE line into `out`. Returns true once the stream is done.
fn apply_sse_line(line: &str, out: &mut LlmResponse) -> bool {
    match sse_parser::parse_sse_line(line) {
        Ok(chunks) => {
            for chunk in chunks {
                match chunk.kind {
                    StreamChunkKind::Reasoning => out.reasoning.push_str(&chunk.content),
                    StreamChunkKind::Content => out.content.push_str(&chunk.content),
                    StreamChunkKind::Done => return true,
                }
            }
            false
        }
        Err(e) => {
            tracing::debug!("SSE parse skipped: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_stream_accumulates_reasoning_and_content() {
        let body = "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"plan\",\"content\":\"{\\\"text\\\": \\\"Gr\u{fc}\u{df}e\"}}]}\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\" \u{20ac}\\\"}\"}}]}\n\
                    data: [DONE]\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n";
        let bytes = body.as_bytes();
        let cut = body.find('\u{20ac}').unwrap() + 1;

        let mut lines = SseLineBuffer::new();
        let mut out = LlmResponse::default();
        let mut done = false;
        for part in [&bytes[..cut], &bytes[cut..]] {
            for line in lines.push(part) {
                if !done {
                    done = apply_sse_line(&line, &mut out);
                }
            }
        }
        assert!(done);
        assert_eq!(out.reasoning, "plan");
        assert_eq!(out.content, "{\"text\": \"Gr\u{fc}\u{df}e \u{20ac}\"}");
    }

    #[test]
    fn client_builds_with_timeout() {
        let provider = OpenAiCompatibleProvider::new(
            "local".into(),
            "http://localhost:1/v1/chat/completions".into(),
            String::new(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(provider.name(), "local");
    }
}
