use std::collections::HashMap;

use serde_json::Value;

use crate::perception::types::{ImageHandle, OcrResult, ScreenAnalysis};

/// Scratch state for one `execute` call. Created when the run starts and
/// dropped when it ends.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pub last_capture: Option<ImageHandle>,
    pub last_analysis: Option<ScreenAnalysis>,
    pub last_text: Option<OcrResult>,
    /// Values written by one action and read by a later one, e.g. a
    /// `find_element` output consumed by `click { target }`.
    pub variables: HashMap<String, Value>,
    /// Retries spent on the current action; reset before each action.
    pub retry_count: u32,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        tracing::debug!(variable = %name, "context variable set");
        self.variables.insert(name, value);
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Screen point stored under `name`: `{"x": .., "y": ..}` or `[x, y]`.
    pub fn resolve_point(&self, name: &str) -> Option<(i32, i32)> {
        let value = self.variables.get(name.trim())?;
        let (x, y) = match value {
            Value::Object(map) => (map.get("x")?, map.get("y")?),
            Value::Array(items) if items.len() == 2 => (&items[0], &items[1]),
            _ => return None,
        };
        Some((x.as_f64()?.round() as i32, y.as_f64()?.round() as i32))
    }

    /// Latest capture size, if any.
    pub fn screen_size(&self) -> Option<(u32, u32)> {
        self.last_capture
            .as_ref()
            .map(|c| (c.meta.physical_width, c.meta.physical_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_object_and_pair_points() {
        let mut ctx = ExecutionContext::new();
        ctx.set_variable("ok_button", json!({"x": 410.4, "y": 300, "label": "OK"}));
        ctx.set_variable("pair", json!([5, 6]));
        ctx.set_variable("text", json!("hello"));
        assert_eq!(ctx.resolve_point("ok_button"), Some((410, 300)));
        assert_eq!(ctx.resolve_point(" pair "), Some((5, 6)));
        assert_eq!(ctx.resolve_point("text"), None);
        assert_eq!(ctx.resolve_point("missing"), None);
    }
}
