use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::executor::safety::Capability;

pub const DEFAULT_ACTION_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Closed set of action kinds understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Screenshot,
    AnalyzeScreen,
    ExtractText,
    FindElement,
    Click,
    DoubleClick,
    RightClick,
    Drag,
    Scroll,
    TypeText,
    PressKey,
    Hotkey,
    Wait,
    OpenApp,
    SwitchApp,
    CloseApp,
    NavigateUrl,
    Verify,
}

impl ActionKind {
    pub const ALL: [ActionKind; 18] = [
        ActionKind::Screenshot,
        ActionKind::AnalyzeScreen,
        ActionKind::ExtractText,
        ActionKind::FindElement,
        ActionKind::Click,
        ActionKind::DoubleClick,
        ActionKind::RightClick,
        ActionKind::Drag,
        ActionKind::Scroll,
        ActionKind::TypeText,
        ActionKind::PressKey,
        ActionKind::Hotkey,
        ActionKind::Wait,
        ActionKind::OpenApp,
        ActionKind::SwitchApp,
        ActionKind::CloseApp,
        ActionKind::NavigateUrl,
        ActionKind::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Screenshot => "screenshot",
            ActionKind::AnalyzeScreen => "analyze_screen",
            ActionKind::ExtractText => "extract_text",
            ActionKind::FindElement => "find_element",
            ActionKind::Click => "click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::RightClick => "right_click",
            ActionKind::Drag => "drag",
            ActionKind::Scroll => "scroll",
            ActionKind::TypeText => "type_text",
            ActionKind::PressKey => "press_key",
            ActionKind::Hotkey => "hotkey",
            ActionKind::Wait => "wait",
            ActionKind::OpenApp => "open_app",
            ActionKind::SwitchApp => "switch_app",
            ActionKind::CloseApp => "close_app",
            ActionKind::NavigateUrl => "navigate_url",
            ActionKind::Verify => "verify",
        }
    }

    /// Parameter hint shown to the planning model.
    pub fn parameter_hint(&self) -> &'static str {
        match self {
            ActionKind::Screenshot => "{}",
            ActionKind::AnalyzeScreen => r#"{"objective": string}"#,
            ActionKind::ExtractText => r#"{"output"?: variable name}"#,
            ActionKind::FindElement => r#"{"description": string, "output"?: variable name}"#,
            ActionKind::Click | ActionKind::DoubleClick | ActionKind::RightClick => {
                r#"{"x": int, "y": int} or {"target": variable name}"#
            }
            ActionKind::Drag => r#"{"start_x": int, "start_y": int, "end_x": int, "end_y": int}"#,
            ActionKind::Scroll => r#"{"direction": "up"|"down"|"left"|"right", "amount"?: int, "x"?: int, "y"?: int}"#,
            ActionKind::TypeText => r#"{"text": string}"#,
            ActionKind::PressKey => r#"{"key": string}"#,
            ActionKind::Hotkey => r#"{"keys": ["ctrl", "c"]}"#,
            ActionKind::Wait => r#"{"duration": seconds}"#,
            ActionKind::OpenApp | ActionKind::SwitchApp | ActionKind::CloseApp => {
                r#"{"app_name": string}"#
            }
            ActionKind::NavigateUrl => r#"{"url": string}"#,
            ActionKind::Verify => r#"{"expected": text that must be visible}"#,
        }
    }

    /// Rate-limit class this kind counts against.
    pub fn capability(&self) -> Capability {
        match self {
            ActionKind::Click
            | ActionKind::DoubleClick
            | ActionKind::RightClick
            | ActionKind::Drag
            | ActionKind::Scroll => Capability::Pointer,
            ActionKind::TypeText
            | ActionKind::PressKey
            | ActionKind::Hotkey
            | ActionKind::NavigateUrl => Capability::Keyboard,
            ActionKind::OpenApp | ActionKind::SwitchApp | ActionKind::CloseApp => Capability::App,
            ActionKind::Screenshot
            | ActionKind::AnalyzeScreen
            | ActionKind::ExtractText
            | ActionKind::FindElement
            | ActionKind::Verify
            | ActionKind::Wait => Capability::Perception,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

fn default_scroll_amount() -> i32 {
    3
}

/// Parameters of one action, one variant per [`ActionKind`].
///
/// Coordinates and durations accept integers, floats or numeric strings so
/// that loosely formatted model output still deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    Screenshot,
    AnalyzeScreen {
        #[serde(default, alias = "goal", alias = "query")]
        objective: String,
    },
    ExtractText {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    FindElement {
        #[serde(default, alias = "element", alias = "query")]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    Click {
        #[serde(default, deserialize_with = "lenient::opt_i32", skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        #[serde(default, deserialize_with = "lenient::opt_i32", skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    DoubleClick {
        #[serde(default, deserialize_with = "lenient::opt_i32", skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        #[serde(default, deserialize_with = "lenient::opt_i32", skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    RightClick {
        #[serde(default, deserialize_with = "lenient::opt_i32", skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        #[serde(default, deserialize_with = "lenient::opt_i32", skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    Drag {
        #[serde(default, deserialize_with = "lenient::opt_i32")]
        start_x: Option<i32>,
        #[serde(default, deserialize_with = "lenient::opt_i32")]
        start_y: Option<i32>,
        #[serde(default, deserialize_with = "lenient::opt_i32")]
        end_x: Option<i32>,
        #[serde(default, deserialize_with = "lenient::opt_i32")]
        end_y: Option<i32>,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default = "default_scroll_amount", deserialize_with = "lenient::i32_or_default_scroll")]
        amount: i32,
        #[serde(default, deserialize_with = "lenient::opt_i32", skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        #[serde(default, deserialize_with = "lenient::opt_i32", skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
    },
    TypeText {
        #[serde(default)]
        text: String,
    },
    PressKey {
        #[serde(default)]
        key: String,
    },
    Hotkey {
        #[serde(default, deserialize_with = "lenient::key_list")]
        keys: Vec<String>,
    },
    Wait {
        #[serde(default, alias = "seconds", deserialize_with = "lenient::f64_or_zero")]
        duration: f64,
    },
    OpenApp {
        #[serde(default, alias = "app", alias = "name")]
        app_name: String,
    },
    SwitchApp {
        #[serde(default, alias = "app", alias = "name")]
        app_name: String,
    },
    CloseApp {
        #[serde(default, alias = "app", alias = "name")]
        app_name: String,
    },
    NavigateUrl {
        #[serde(default)]
        url: String,
    },
    Verify {
        #[serde(default, alias = "text", alias = "condition")]
        expected: String,
    },
}

/// Where a pointer action lands: fixed coordinates or a context variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerTarget {
    At { x: i32, y: i32 },
    Variable(String),
}

impl ActionSpec {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionSpec::Screenshot => ActionKind::Screenshot,
            ActionSpec::AnalyzeScreen { .. } => ActionKind::AnalyzeScreen,
            ActionSpec::ExtractText { .. } => ActionKind::ExtractText,
            ActionSpec::FindElement { .. } => ActionKind::FindElement,
            ActionSpec::Click { .. } => ActionKind::Click,
            ActionSpec::DoubleClick { .. } => ActionKind::DoubleClick,
            ActionSpec::RightClick { .. } => ActionKind::RightClick,
            ActionSpec::Drag { .. } => ActionKind::Drag,
            ActionSpec::Scroll { .. } => ActionKind::Scroll,
            ActionSpec::TypeText { .. } => ActionKind::TypeText,
            ActionSpec::PressKey { .. } => ActionKind::PressKey,
            ActionSpec::Hotkey { .. } => ActionKind::Hotkey,
            ActionSpec::Wait { .. } => ActionKind::Wait,
            ActionSpec::OpenApp { .. } => ActionKind::OpenApp,
            ActionSpec::SwitchApp { .. } => ActionKind::SwitchApp,
            ActionSpec::CloseApp { .. } => ActionKind::CloseApp,
            ActionSpec::NavigateUrl { .. } => ActionKind::NavigateUrl,
            ActionSpec::Verify { .. } => ActionKind::Verify,
        }
    }

    pub fn click(x: i32, y: i32) -> Self {
        ActionSpec::Click {
            x: Some(x),
            y: Some(y),
            target: None,
        }
    }

    pub fn click_target(name: impl Into<String>) -> Self {
        ActionSpec::Click {
            x: None,
            y: None,
            target: Some(name.into()),
        }
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        ActionSpec::TypeText { text: text.into() }
    }

    pub fn wait(seconds: f64) -> Self {
        ActionSpec::Wait { duration: seconds }
    }

    /// Target of a click-like action. Coordinates win over a variable when
    /// both are present.
    pub fn pointer_target(&self) -> Option<PointerTarget> {
        let (x, y, target) = match self {
            ActionSpec::Click { x, y, target }
            | ActionSpec::DoubleClick { x, y, target }
            | ActionSpec::RightClick { x, y, target } => (x, y, target),
            _ => return None,
        };
        match (x, y, target) {
            (Some(x), Some(y), _) => Some(PointerTarget::At { x: *x, y: *y }),
            (_, _, Some(name)) if !name.trim().is_empty() => {
                Some(PointerTarget::Variable(name.clone()))
            }
            _ => None,
        }
    }

    /// Missing or malformed parameters for this kind. Empty means valid.
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        match self {
            ActionSpec::Screenshot | ActionSpec::ExtractText { .. } | ActionSpec::Scroll { .. } => {}
            ActionSpec::AnalyzeScreen { objective } => {
                if objective.trim().is_empty() {
                    out.push("objective is required".to_string());
                }
            }
            ActionSpec::FindElement { description, .. } => {
                if description.trim().is_empty() {
                    out.push("description is required".to_string());
                }
            }
            ActionSpec::Click { .. } | ActionSpec::DoubleClick { .. } | ActionSpec::RightClick { .. } => {
                if self.pointer_target().is_none() {
                    out.push("requires (x, y) or target".to_string());
                }
            }
            ActionSpec::Drag {
                start_x,
                start_y,
                end_x,
                end_y,
            } => {
                for (name, value) in [
                    ("start_x", start_x),
                    ("start_y", start_y),
                    ("end_x", end_x),
                    ("end_y", end_y),
                ] {
                    if value.is_none() {
                        out.push(format!("{name} is required"));
                    }
                }
            }
            ActionSpec::TypeText { text } => {
                if text.is_empty() {
                    out.push("text must not be empty".to_string());
                }
            }
            ActionSpec::PressKey { key } => {
                if key.trim().is_empty() {
                    out.push("key is required".to_string());
                }
            }
            ActionSpec::Hotkey { keys } => {
                if keys.iter().all(|k| k.trim().is_empty()) {
                    out.push("keys must not be empty".to_string());
                }
            }
            ActionSpec::Wait { duration } => {
                if !(*duration > 0.0) {
                    out.push("duration must be > 0".to_string());
                }
            }
            ActionSpec::OpenApp { app_name }
            | ActionSpec::SwitchApp { app_name }
            | ActionSpec::CloseApp { app_name } => {
                if app_name.trim().is_empty() {
                    out.push("app_name is required".to_string());
                }
            }
            ActionSpec::NavigateUrl { url } => {
                if url.trim().is_empty() {
                    out.push("url is required".to_string());
                }
            }
            ActionSpec::Verify { expected } => {
                if expected.trim().is_empty() {
                    out.push("expected is required".to_string());
                }
            }
        }
        out
    }

    /// Short label used when no description was given.
    pub fn summary(&self) -> String {
        match self {
            ActionSpec::Screenshot => "Take a screenshot".to_string(),
            ActionSpec::AnalyzeScreen { objective } => format!("Analyze screen: {objective}"),
            ActionSpec::ExtractText { .. } => "Extract text from screen".to_string(),
            ActionSpec::FindElement { description, .. } => format!("Find element: {description}"),
            ActionSpec::Click { .. } | ActionSpec::DoubleClick { .. } | ActionSpec::RightClick { .. } => {
                match self.pointer_target() {
                    Some(PointerTarget::At { x, y }) => format!("{} at ({x}, {y})", self.kind()),
                    Some(PointerTarget::Variable(name)) => format!("{} on {name}", self.kind()),
                    None => self.kind().to_string(),
                }
            }
            ActionSpec::Drag { .. } => "Drag".to_string(),
            ActionSpec::Scroll { direction, amount, .. } => {
                format!("Scroll {direction:?} by {amount}").to_lowercase()
            }
            ActionSpec::TypeText { text } => format!("Type \"{text}\""),
            ActionSpec::PressKey { key } => format!("Press {key}"),
            ActionSpec::Hotkey { keys } => format!("Hotkey {}", keys.join("+")),
            ActionSpec::Wait { duration } => format!("Wait {duration}s"),
            ActionSpec::OpenApp { app_name } => format!("Open {app_name}"),
            ActionSpec::SwitchApp { app_name } => format!("Switch to {app_name}"),
            ActionSpec::CloseApp { app_name } => format!("Close {app_name}"),
            ActionSpec::NavigateUrl { url } => format!("Navigate to {url}"),
            ActionSpec::Verify { expected } => format!("Verify \"{expected}\" is visible"),
        }
    }
}

/// Per-action lifecycle.
///
/// pending -> running -> completed | failed | skipped | timeout | cancelled
/// pending -> waiting_user -> running | cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    WaitingUser,
    Running,
    Completed,
    Failed,
    Skipped,
    Timeout,
    Cancelled,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Completed
                | ActionStatus::Failed
                | ActionStatus::Skipped
                | ActionStatus::Timeout
                | ActionStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, to: ActionStatus) -> bool {
        matches!(
            (self, to),
            (ActionStatus::Pending, ActionStatus::WaitingUser)
                | (ActionStatus::Pending, ActionStatus::Running)
                | (ActionStatus::Pending, ActionStatus::Skipped)
                | (ActionStatus::Pending, ActionStatus::Cancelled)
                | (ActionStatus::WaitingUser, ActionStatus::Running)
                | (ActionStatus::WaitingUser, ActionStatus::Cancelled)
                | (ActionStatus::Running, ActionStatus::Completed)
                | (ActionStatus::Running, ActionStatus::Failed)
                | (ActionStatus::Running, ActionStatus::Timeout)
                | (ActionStatus::Running, ActionStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionStatus::Pending => "pending",
            ActionStatus::WaitingUser => "waiting_user",
            ActionStatus::Running => "running",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
            ActionStatus::Skipped => "skipped",
            ActionStatus::Timeout => "timeout",
            ActionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SequenceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SequenceStatus::Completed | SequenceStatus::Failed | SequenceStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SequenceStatus::Pending => "pending",
            SequenceStatus::Running => "running",
            SequenceStatus::Completed => "completed",
            SequenceStatus::Failed => "failed",
            SequenceStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One atomic operation plus its failure policy and run-state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub spec: ActionSpec,
    pub description: String,
    pub timeout_secs: f64,
    pub max_retries: u32,
    pub continue_on_error: bool,

    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Dispatch attempts made, including retries.
    pub attempts: u32,
}

impl Action {
    pub fn new(spec: ActionSpec) -> Self {
        let description = spec.summary();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            spec,
            description,
            timeout_secs: DEFAULT_ACTION_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            continue_on_error: false,
            status: ActionStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            elapsed_ms: None,
            attempts: 0,
        }
    }

    /// Builds an action, rejecting specs with missing parameters.
    pub fn try_new(spec: ActionSpec) -> DeskPilotResult<Self> {
        let problems = spec.problems();
        if problems.is_empty() {
            Ok(Self::new(spec))
        } else {
            Err(DeskPilotError::Validation(
                problems
                    .into_iter()
                    .map(|p| format!("{}: {p}", spec.kind()))
                    .collect(),
            ))
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.trim().is_empty() {
            self.description = description;
        }
        self
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        if secs > 0.0 && secs.is_finite() {
            self.timeout_secs = secs;
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.spec.kind()
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(self.timeout_secs)
            .unwrap_or_else(|_| std::time::Duration::from_secs_f64(DEFAULT_ACTION_TIMEOUT_SECS))
    }

    /// Applies a status change if the lifecycle allows it.
    pub fn transition(&mut self, to: ActionStatus) -> bool {
        if self.status.can_transition_to(to) {
            self.status = to;
            true
        } else {
            tracing::warn!(
                action = %self.id,
                from = %self.status,
                to = %to,
                "rejected invalid action status transition"
            );
            false
        }
    }
}

/// Ordered plan of actions with aggregate run-state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSequence {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub actions: Vec<Action>,

    pub status: SequenceStatus,
    pub current_index: usize,
    pub success_count: usize,
    pub failure_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl ActionSequence {
    pub fn new(name: impl Into<String>, description: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
            actions,
            status: SequenceStatus::Pending,
            current_index: 0,
            success_count: 0,
            failure_count: 0,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(Action::kind).collect()
    }

    /// Moves `current_index` forward; never backwards.
    pub fn advance_to(&mut self, index: usize) {
        if index >= self.current_index && index < self.actions.len() {
            self.current_index = index;
        }
    }
}

/// Final summary of one `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub sequence_id: String,
    pub status: SequenceStatus,
    pub success_count: usize,
    pub failure_count: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Lenient deserializers for model-produced parameters.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn opt_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value
            .as_ref()
            .and_then(as_f64)
            .filter(|v| v.is_finite())
            .map(|v| v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32))
    }

    pub fn i32_or_default_scroll<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
        Ok(opt_i32(d)?.unwrap_or_else(super::default_scroll_amount))
    }

    pub fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.as_ref().and_then(as_f64).unwrap_or(0.0))
    }

    /// Accepts `["ctrl", "c"]` or `"ctrl+c"`.
    pub fn key_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        let keys = match value {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split('+')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_deserializes_loose_model_output() {
        let spec: ActionSpec =
            serde_json::from_value(serde_json::json!({"type": "click", "x": 10.6, "y": "20"})).unwrap();
        assert_eq!(spec, ActionSpec::click(11, 20));

        let spec: ActionSpec =
            serde_json::from_value(serde_json::json!({"type": "hotkey", "keys": "ctrl+shift+t"})).unwrap();
        assert_eq!(
            spec,
            ActionSpec::Hotkey {
                keys: vec!["ctrl".into(), "shift".into(), "t".into()]
            }
        );

        let spec: ActionSpec =
            serde_json::from_value(serde_json::json!({"type": "open_app", "app": "notepad"})).unwrap();
        assert_eq!(
            spec,
            ActionSpec::OpenApp {
                app_name: "notepad".into()
            }
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let res: Result<ActionSpec, _> =
            serde_json::from_value(serde_json::json!({"type": "teleport", "x": 1}));
        assert!(res.is_err());
    }

    #[test]
    fn scroll_defaults() {
        let spec: ActionSpec = serde_json::from_value(serde_json::json!({"type": "scroll"})).unwrap();
        assert_eq!(
            spec,
            ActionSpec::Scroll {
                direction: ScrollDirection::Down,
                amount: 3,
                x: None,
                y: None
            }
        );
    }

    #[test]
    fn pointer_target_prefers_coordinates() {
        let spec = ActionSpec::Click {
            x: Some(1),
            y: Some(2),
            target: Some("button".into()),
        };
        assert_eq!(spec.pointer_target(), Some(PointerTarget::At { x: 1, y: 2 }));
        assert_eq!(
            ActionSpec::click_target("button").pointer_target(),
            Some(PointerTarget::Variable("button".into()))
        );
        let half = ActionSpec::Click {
            x: Some(1),
            y: None,
            target: None,
        };
        assert_eq!(half.pointer_target(), None);
    }

    #[test]
    fn try_new_rejects_missing_parameters() {
        assert!(Action::try_new(ActionSpec::type_text("")).is_err());
        assert!(Action::try_new(ActionSpec::wait(0.0)).is_err());
        assert!(Action::try_new(ActionSpec::Drag {
            start_x: Some(0),
            start_y: Some(0),
            end_x: None,
            end_y: Some(5)
        })
        .is_err());
        assert!(Action::try_new(ActionSpec::Screenshot).is_ok());
    }

    #[test]
    fn status_transitions_are_monotonic() {
        use ActionStatus::*;
        let all = [Pending, WaitingUser, Running, Completed, Failed, Skipped, Timeout, Cancelled];
        for from in all {
            for to in all {
                if from.is_terminal() {
                    assert!(!from.can_transition_to(to), "{from} -> {to}");
                }
                if from.can_transition_to(to) {
                    assert!(!to.can_transition_to(from), "cycle {from} <-> {to}");
                }
            }
        }
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Timeout));
        assert!(!Running.can_transition_to(Pending));
    }

    #[test]
    fn invalid_transition_leaves_status() {
        let mut action = Action::new(ActionSpec::Screenshot);
        assert!(!action.transition(ActionStatus::Completed));
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.transition(ActionStatus::Running));
        assert!(action.transition(ActionStatus::Completed));
    }

    #[test]
    fn sequence_index_only_moves_forward() {
        let mut seq = ActionSequence::new(
            "s",
            "",
            vec![
                Action::new(ActionSpec::Screenshot),
                Action::new(ActionSpec::Screenshot),
                Action::new(ActionSpec::Screenshot),
            ],
        );
        seq.advance_to(2);
        seq.advance_to(1);
        assert_eq!(seq.current_index, 2);
        seq.advance_to(7);
        assert_eq!(seq.current_index, 2);
    }

    #[test]
    fn every_kind_has_a_distinct_name() {
        let names: std::collections::HashSet<_> = ActionKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), ActionKind::ALL.len());
    }
}
