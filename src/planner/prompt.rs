use std::fmt::Write as _;

use crate::agent_engine::state::ActionKind;

const PLANNING_PREAMBLE: &str = "\
You are the planning component of a desktop automation engine. \
Turn the user's request into an ordered list of atomic actions.";

const RESPONSE_FORMAT: &str = r#"Respond with JSON only, no prose and no markdown, using exactly this shape:
{
  "sequence_name": "short name",
  "description": "what the sequence achieves",
  "actions": [
    {"type": "<action type>", "parameters": {...}, "description": "label shown to the user", "timeout": 30, "max_retries": 2, "continue_on_error": false}
  ]
}
Only "type" and "parameters" are required for each action."#;

/// Builds the prompt sent to the planning model.
pub fn build_planning_prompt(intent: &str, context: Option<&serde_json::Value>) -> String {
    let mut prompt = String::with_capacity(2048);
    prompt.push_str(PLANNING_PREAMBLE);
    prompt.push_str("\n\nAvailable action types and their parameters:\n");
    for kind in ActionKind::ALL {
        let _ = writeln!(prompt, "- {}: {}", kind.as_str(), kind.parameter_hint());
    }
    prompt.push_str(
        "\nFind an element before clicking it when coordinates are unknown: \
         give find_element an \"output\" name and click with {\"target\": that name}.\n",
    );

    if let Some(ctx) = context.filter(|c| !c.is_null()) {
        let rendered = serde_json::to_string_pretty(ctx).unwrap_or_else(|_| ctx.to_string());
        let _ = write!(prompt, "\nContext:\n{rendered}\n");
    }

    let _ = write!(prompt, "\nRequest: {}\n\n", intent.trim());
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_kind_and_the_intent() {
        let prompt = build_planning_prompt("  open notepad ", None);
        for kind in ActionKind::ALL {
            assert!(prompt.contains(&format!("- {}:", kind.as_str())), "{kind} missing");
        }
        assert!(prompt.contains("Request: open notepad\n"));
        assert!(prompt.contains("Respond with JSON only"));
        assert!(!prompt.contains("Context:"));
    }

    #[test]
    fn prompt_embeds_context() {
        let ctx = serde_json::json!({"active_window": "Notepad"});
        let prompt = build_planning_prompt("save the file", Some(&ctx));
        assert!(prompt.contains("Context:"));
        assert!(prompt.contains("\"active_window\": \"Notepad\""));
    }
}
