//! Conversation steps
//!
//! Every message exchanged with the model is one JSON object tagged by its
//! `type` field. The model emits `plan`, `action` and `output` steps; the
//! agent emits the opening `user` step and an `observation` after each
//! action it runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One discriminated unit of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    /// The initiating request
    User { user: String },
    /// The model's stated intention; never dispatched
    Plan { plan: String },
    /// A requested tool call
    Action {
        function: String,
        input: Map<String, Value>,
    },
    /// Result of running an action
    Observation { observation: Value },
    /// Terminal result
    Output { output: Value },
}

impl Step {
    pub fn user(prompt: impl Into<String>) -> Self {
        Step::User { user: prompt.into() }
    }

    pub fn observation(value: impl Into<Value>) -> Self {
        Step::Observation {
            observation: value.into(),
        }
    }

    /// The `type` tag this step serializes with
    pub fn kind(&self) -> &'static str {
        match self {
            Step::User { .. } => "user",
            Step::Plan { .. } => "plan",
            Step::Action { .. } => "action",
            Step::Observation { .. } => "observation",
            Step::Output { .. } => "output",
        }
    }
}

/// Outcome of classifying one decoded value
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// A well-formed step
    Step(Step),
    /// A known `type` whose payload has the wrong shape
    Invalid { kind: String, reason: String },
    /// Missing or unrecognised `type`
    Unknown,
}

const KNOWN_KINDS: [&str; 5] = ["user", "plan", "action", "observation", "output"];

/// Classify a decoded JSON value into a step.
///
/// Values without a recognised `type` are `Unknown`. An `action` needs a
/// non-empty string `function` and an object `input`; anything else is
/// `Invalid` and must not be dispatched.
pub fn classify(value: &Value) -> Classified {
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Classified::Unknown;
    };
    if !KNOWN_KINDS.contains(&kind) {
        return Classified::Unknown;
    }

    if kind == "action" {
        if let Err(reason) = validate_action(value) {
            return Classified::Invalid {
                kind: kind.to_string(),
                reason,
            };
        }
    }

    match serde_json::from_value::<Step>(value.clone()) {
        Ok(step) => Classified::Step(step),
        Err(e) => Classified::Invalid {
            kind: kind.to_string(),
            reason: e.to_string(),
        },
    }
}

fn validate_action(value: &Value) -> Result<(), String> {
    match value.get("function") {
        Some(Value::String(name)) if !name.trim().is_empty() => {}
        Some(Value::String(_)) => return Err("`function` is empty".to_string()),
        Some(_) => return Err("`function` must be a string".to_string()),
        None => return Err("missing `function`".to_string()),
    }

    match value.get("input") {
        Some(Value::Object(_)) => Ok(()),
        Some(_) => Err("`input` must be an object".to_string()),
        None => Err("missing `input`".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_with_type_tag() {
        let step = Step::user("What is 2+3?");
        assert_eq!(
            serde_json::to_value(&step).unwrap(),
            json!({"type": "user", "user": "What is 2+3?"})
        );
    }

    #[test]
    fn test_steps_survive_extraction_from_model_text() {
        let steps = vec![
            Step::Plan { plan: "add the numbers".into() },
            Step::Action {
                function: "calculator".into(),
                input: json!({"expression": "2+3"}).as_object().unwrap().clone(),
            },
            Step::Output { output: json!("5") },
        ];
        let text = steps
            .iter()
            .map(|s| format!("```json\n{}\n```", serde_json::to_string(s).unwrap()))
            .collect::<Vec<_>>()
            .join("\n");

        let decoded: Vec<_> = crate::extract::extract_json_values(&text)
            .iter()
            .map(classify)
            .collect();
        let expected: Vec<_> = steps.into_iter().map(Classified::Step).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_classify_action() {
        let value = json!({"type": "action", "function": "add", "input": {"a": 2, "b": 3}});
        match classify(&value) {
            Classified::Step(Step::Action { function, input }) => {
                assert_eq!(function, "add");
                assert_eq!(input["a"], 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_action_input_must_be_object() {
        for input in [json!("2+3"), json!([2, 3]), json!(5), Value::Null] {
            let value = json!({"type": "action", "function": "add", "input": input});
            assert!(matches!(classify(&value), Classified::Invalid { .. }));
        }
    }

    #[test]
    fn test_action_requires_function() {
        let missing = json!({"type": "action", "input": {}});
        let empty = json!({"type": "action", "function": "  ", "input": {}});
        let numeric = json!({"type": "action", "function": 3, "input": {}});

        assert!(matches!(classify(&missing), Classified::Invalid { .. }));
        assert!(matches!(classify(&empty), Classified::Invalid { .. }));
        assert!(matches!(classify(&numeric), Classified::Invalid { .. }));
    }

    #[test]
    fn test_unknown_and_missing_type() {
        assert_eq!(classify(&json!({"type": "thought", "thought": "hm"})), Classified::Unknown);
        assert_eq!(classify(&json!({"plan": "no tag"})), Classified::Unknown);
        assert_eq!(classify(&json!([1, 2])), Classified::Unknown);
    }

    #[test]
    fn test_plan_with_wrong_payload_is_invalid() {
        let value = json!({"type": "plan", "plan": {"steps": []}});
        assert!(matches!(classify(&value), Classified::Invalid { .. }));
    }

    #[test]
    fn test_output_payload_is_any_value() {
        let value = json!({"type": "output", "output": {"sum": 5}});
        assert_eq!(
            classify(&value),
            Classified::Step(Step::Output { output: json!({"sum": 5}) })
        );
    }

    #[test]
    fn test_extra_fields_are_tolerated() {
        let value = json!({"type": "plan", "plan": "p", "confidence": 0.9});
        assert_eq!(
            classify(&value),
            Classified::Step(Step::Plan { plan: "p".to_string() })
        );
    }
}
