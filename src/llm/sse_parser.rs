use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Splits a byte stream into complete lines. Bytes are held until their
/// newline arrives, so a UTF-8 character cut across network chunks is
/// decoded whole.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every line completed by them, trimmed.
    /// Blank lines are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Parses a raw SSE line (OpenAI-compatible format) into stream chunks.
/// Keep-alive and non-data lines yield nothing. A delta carrying both
/// reasoning and content yields both, reasoning first.
pub fn parse_sse_line(line: &str) -> DeskPilotResult<Vec<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(Vec::new());
    }

    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(Vec::new());
    };

    if data == "[DONE]" {
        return Ok(vec![StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }]);
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| DeskPilotError::SseParsing(e.to_string()))?;

    let mut chunks = Vec::new();
    if let Some(first) = json["choices"].as_array().and_then(|c| c.first()) {
        let delta = &first["delta"];

        // Reasoning content (some models like DeepSeek expose this)
        for (field, kind) in [
            ("reasoning_content", StreamChunkKind::Reasoning),
            ("content", StreamChunkKind::Content),
        ] {
            if let Some(text) = delta[field].as_str().filter(|t| !t.is_empty()) {
                chunks.push(StreamChunk {
                    kind,
                    content: text.to_string(),
                });
            }
        }

        if first["finish_reason"].as_str().is_some() {
            chunks.push(StreamChunk {
                kind: StreamChunkKind::Done,
                content: String::new(),
            });
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(line: &str) -> StreamChunk {
        let mut chunks = parse_sse_line(line).unwrap();
        assert_eq!(chunks.len(), 1, "{chunks:?}");
        chunks.remove(0)
    }

    #[test]
    fn keep_alive_and_comments_are_skipped() {
        assert!(parse_sse_line("").unwrap().is_empty());
        assert!(parse_sse_line(": ping").unwrap().is_empty());
        assert!(parse_sse_line("event: message").unwrap().is_empty());
    }

    #[test]
    fn done_marker() {
        assert_eq!(single("data: [DONE]").kind, StreamChunkKind::Done);
    }

    #[test]
    fn content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"{\"actions\""},"finish_reason":null}]}"#;
        let chunk = single(line);
        assert_eq!(chunk.kind, StreamChunkKind::Content);
        assert_eq!(chunk.content, "{\"actions\"");
    }

    #[test]
    fn reasoning_delta_with_empty_content() {
        let line = r#"data: {"choices":[{"delta":{"reasoning_content":"thinking","content":""}}]}"#;
        assert_eq!(single(line).kind, StreamChunkKind::Reasoning);
    }

    #[test]
    fn delta_with_reasoning_and_content_keeps_both() {
        let line = r#"data: {"choices":[{"delta":{"reasoning_content":"hmm","content":"{\"a\""}}]}"#;
        let chunks = parse_sse_line(line).unwrap();
        let kinds: Vec<_> = chunks.iter().map(|c| c.kind.clone()).collect();
        assert_eq!(kinds, vec![StreamChunkKind::Reasoning, StreamChunkKind::Content]);
        assert_eq!(chunks[1].content, "{\"a\"");
    }

    #[test]
    fn finish_reason_signals_done() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(single(line).kind, StreamChunkKind::Done);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(DeskPilotError::SseParsing(_))
        ));
    }

    #[test]
    fn multibyte_char_split_across_chunks_survives() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"Preis: 5 \u{20ac} / \u{65e5}\u{672c}\"}}]}\n\n";
        let bytes = line.as_bytes();
        // cut inside the three-byte euro sign
        let cut = line.find('\u{20ac}').unwrap() + 2;

        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(&bytes[..cut]).is_empty());
        let lines = buffer.push(&bytes[cut..]);
        assert_eq!(lines.len(), 1);
        assert_eq!(single(&lines[0]).content, "Preis: 5 \u{20ac} / \u{65e5}\u{672c}");
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn unterminated_tail_is_returned_by_finish() {
        let mut buffer = SseLineBuffer::new();
        assert_eq!(buffer.push(b"data: [DONE]\r\ndata: {"), vec!["data: [DONE]".to_string()]);
        assert_eq!(buffer.finish().as_deref(), Some("data: {"));
    }
}
