use serde::Serialize;

use crate::agent_engine::state::{ActionKind, ActionSequence, ActionSpec};

/// Waits shorter than this are dropped by [`optimize`].
pub const MIN_WAIT_SECS: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Offending action, or `None` for sequence-level problems.
    pub index: Option<usize>,
    pub kind: Option<ActionKind>,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.index, self.kind) {
            (Some(i), Some(kind)) => write!(f, "action {i} ({kind}): {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

pub fn validate(seq: &ActionSequence) -> Vec<ValidationIssue> {
    if seq.is_empty() {
        return vec![ValidationIssue {
            index: None,
            kind: None,
            message: "sequence has no actions".to_string(),
        }];
    }
    seq.actions
        .iter()
        .enumerate()
        .flat_map(|(i, action)| {
            let kind = action.kind();
            action.spec.problems().into_iter().map(move |message| ValidationIssue {
                index: Some(i),
                kind: Some(kind),
                message,
            })
        })
        .collect()
}

/// Returns a copy with consecutive TypeText actions merged and sub-0.1s
/// waits removed. Both passes run in one sweep, so text separated only by
/// a dropped wait is merged too and a second call changes nothing.
pub fn optimize(seq: &ActionSequence) -> ActionSequence {
    let mut out = seq.clone();
    out.actions = Vec::with_capacity(seq.len());

    for action in &seq.actions {
        match &action.spec {
            ActionSpec::Wait { duration } if *duration < MIN_WAIT_SECS => {
                tracing::trace!(action = %action.id, duration, "dropping short wait");
            }
            ActionSpec::TypeText { text } => {
                if let Some(prev) = out.actions.last_mut() {
                    if matches!(prev.spec, ActionSpec::TypeText { .. }) {
                        let auto_label = prev.description == prev.spec.summary();
                        if let ActionSpec::TypeText { text: prev_text } = &mut prev.spec {
                            prev_text.push_str(text);
                        }
                        if auto_label {
                            prev.description = prev.spec.summary();
                        }
                        continue;
                    }
                }
                out.actions.push(action.clone());
            }
            _ => out.actions.push(action.clone()),
        }
    }

    if out.len() != seq.len() {
        tracing::debug!(
            sequence = %seq.id,
            before = seq.len(),
            after = out.len(),
            "sequence optimized"
        );
    }
    out
}
