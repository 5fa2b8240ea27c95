use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::agent_engine::state::{Action, ActionSequence, ActionSpec};
use crate::config::AppConfig;
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::PlanningModel;
use crate::planner::extract::extract_json_object;
use crate::planner::fallback::FallbackPlanner;
use crate::planner::prompt::build_planning_prompt;
use crate::planner::validator::optimize;

/// Failure policy applied to actions that do not specify their own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionDefaults {
    pub timeout_secs: f64,
    pub max_retries: u32,
}

impl ActionDefaults {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.executor.default_action_timeout_secs,
            max_retries: config.executor.default_max_retries,
        }
    }
}

impl Default for ActionDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: crate::agent_engine::state::DEFAULT_ACTION_TIMEOUT_SECS,
            max_retries: crate::agent_engine::state::DEFAULT_MAX_RETRIES,
        }
    }
}

/// JSON shape the planning model is asked to produce.
#[derive(Debug, Deserialize)]
struct PlanDocument {
    #[serde(default, alias = "name")]
    sequence_name: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "steps")]
    actions: Vec<PlanEntry>,
}

#[derive(Debug, Deserialize)]
struct PlanEntry {
    #[serde(rename = "type", alias = "action")]
    kind: String,
    #[serde(default, alias = "params")]
    parameters: Map<String, Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    timeout: Option<f64>,
    #[serde(default)]
    max_retries: Option<u32>,
    #[serde(default)]
    continue_on_error: Option<bool>,
}

impl PlanEntry {
    fn into_action(self, index: usize, defaults: ActionDefaults) -> DeskPilotResult<Action> {
        let mut params = self.parameters;
        params.insert("type".into(), Value::String(self.kind.trim().to_lowercase()));
        let spec: ActionSpec = serde_json::from_value(Value::Object(params))
            .map_err(|e| DeskPilotError::Planning(format!("action {index} ({}): {e}", self.kind)))?;
        let action = Action::try_new(spec)
            .map_err(|e| DeskPilotError::Planning(format!("action {index}: {e}")))?
            .with_timeout(self.timeout.unwrap_or(defaults.timeout_secs))
            .with_max_retries(self.max_retries.unwrap_or(defaults.max_retries))
            .with_continue_on_error(self.continue_on_error.unwrap_or(false));
        Ok(match self.description {
            Some(d) => action.with_description(d),
            None => action,
        })
    }
}

/// Maps an extracted plan object to a typed sequence. Any unknown action
/// type, missing parameter or empty action list is an error.
pub fn sequence_from_plan(value: Value, defaults: ActionDefaults) -> DeskPilotResult<ActionSequence> {
    let doc: PlanDocument = serde_json::from_value(value)
        .map_err(|e| DeskPilotError::Planning(format!("plan shape: {e}")))?;
    if doc.actions.is_empty() {
        return Err(DeskPilotError::Planning("plan contains no actions".into()));
    }
    let actions = doc
        .actions
        .into_iter()
        .enumerate()
        .map(|(i, entry)| entry.into_action(i, defaults))
        .collect::<DeskPilotResult<Vec<_>>>()?;
    let name = if doc.sequence_name.trim().is_empty() {
        "plan".to_string()
    } else {
        doc.sequence_name
    };
    Ok(ActionSequence::new(name, doc.description, actions))
}

/// Turns intents into action sequences: planning model first, rule-based
/// fallback on any failure.
pub struct PlanParser {
    model: Option<Arc<dyn PlanningModel>>,
    fallback: FallbackPlanner,
    defaults: ActionDefaults,
}

impl PlanParser {
    pub fn new(model: Option<Arc<dyn PlanningModel>>, fallback: FallbackPlanner, defaults: ActionDefaults) -> Self {
        Self {
            model,
            fallback,
            defaults,
        }
    }

    pub fn from_config(model: Option<Arc<dyn PlanningModel>>, config: &AppConfig) -> Self {
        Self::new(
            model,
            FallbackPlanner::new(config.planner.default_browser.clone()),
            ActionDefaults::from_config(config),
        )
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Never fails; every call returns a sequence with a fresh id that is
    /// still non-empty after [`optimize`].
    pub async fn parse(&self, intent: &str, context: Option<&Value>) -> ActionSequence {
        if let Some(model) = &self.model {
            match self.plan_with_model(model.as_ref(), intent, context).await {
                Ok(seq) => {
                    tracing::info!(
                        sequence = %seq.id,
                        name = %seq.name,
                        actions = seq.len(),
                        source = "model",
                        "plan ready"
                    );
                    return seq;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "planning model unusable, using rule-based fallback");
                }
            }
        }

        let mut seq = self.fallback.plan(intent);
        for action in &mut seq.actions {
            action.timeout_secs = self.defaults.timeout_secs;
            action.max_retries = self.defaults.max_retries;
        }
        tracing::info!(
            sequence = %seq.id,
            actions = seq.len(),
            source = "fallback",
            "plan ready"
        );
        seq
    }

    async fn plan_with_model(
        &self,
        model: &dyn PlanningModel,
        intent: &str,
        context: Option<&Value>,
    ) -> DeskPilotResult<ActionSequence> {
        let prompt = build_planning_prompt(intent, context);
        let response = model.plan_text(&prompt).await;
        if !response.success {
            return Err(DeskPilotError::Planning(
                response.error.unwrap_or_else(|| "planning model call failed".into()),
            ));
        }
        if response.content.trim().is_empty() {
            return Err(DeskPilotError::Planning("planning model returned empty content".into()));
        }
        let value = extract_json_object(&response.content)
            .ok_or_else(|| DeskPilotError::Planning("no JSON object in planning model output".into()))?;
        let seq = sequence_from_plan(value, self.defaults)?;
        if optimize(&seq).is_empty() {
            return Err(DeskPilotError::Planning(
                "plan has nothing left once short waits are dropped".into(),
            ));
        }
        Ok(seq)
    }
}
