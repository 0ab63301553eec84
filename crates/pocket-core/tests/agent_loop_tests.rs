//! Agent loop integration tests
//!
//! Drives the loop with a scripted model that replays canned replies and
//! records what it was shown.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pocket_core::config::{AgentConfig, ToolErrorPolicy};
use pocket_core::history::{History, HistoryEntry, Role};
use pocket_core::model::Model;
use pocket_core::tools::{Tool, ToolInput};
use pocket_core::{Agent, Error, ToolError};
use serde_json::{Value, json};

/// Replays replies in order and records each request
struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<(String, Vec<HistoryEntry>)>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn system_instruction(&self, call: usize) -> String {
        self.requests.lock().unwrap()[call].0.clone()
    }

    fn history_len(&self, call: usize) -> usize {
        self.requests.lock().unwrap()[call].1.len()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[HistoryEntry],
    ) -> pocket_core::Result<String> {
        self.requests
            .lock()
            .unwrap()
            .push((system_instruction.to_string(), history.to_vec()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Model("script exhausted".to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn add_tool(counter: Arc<AtomicUsize>) -> Tool {
    Tool::blocking("add", move |input: ToolInput| {
        counter.fetch_add(1, Ordering::SeqCst);
        let a = input.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = input.get("b").and_then(Value::as_i64).unwrap_or(0);
        Ok(json!(a + b))
    })
    .with_description("Add two integers")
    .with_signature("a: int, b: int")
}

fn values(history: &History) -> Vec<Value> {
    history.iter().map(|e| e.value().unwrap()).collect()
}

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_addition_scenario() {
        let model = ScriptedModel::new(&[
            r#"{"type":"plan","plan":"add"}{"type":"action","function":"add","input":{"a":2,"b":3}}"#,
            r#"{"type":"output","output":"5"}"#,
        ]);
        let calls = Arc::new(AtomicUsize::new(0));
        let mut agent = Agent::new(model.clone());
        agent.register_tool(add_tool(calls.clone()));

        let mut history = History::with_prompt("2+3?").unwrap();
        let output = agent.run(&mut history).await.unwrap();

        assert_eq!(output, json!("5"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(model.calls(), 2);

        assert_eq!(history.len(), 5);
        let roles: Vec<_> = history.iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Model, Role::Model, Role::User, Role::Model]
        );
        assert_eq!(
            values(&history),
            vec![
                json!({"type": "user", "user": "2+3?"}),
                json!({"type": "plan", "plan": "add"}),
                json!({"type": "action", "function": "add", "input": {"a": 2, "b": 3}}),
                json!({"type": "observation", "observation": 5}),
                json!({"type": "output", "output": "5"}),
            ]
        );

        // Second request carries the observation
        assert_eq!(model.history_len(0), 1);
        assert_eq!(model.history_len(1), 4);
    }

    #[tokio::test]
    async fn test_invoke_returns_output() {
        let model = ScriptedModel::new(&["```json\n{\"type\":\"output\",\"output\":{\"answer\":42}}\n```"]);
        let agent = Agent::new(model);

        assert_eq!(agent.invoke("question").await.unwrap(), json!({"answer": 42}));
    }

    #[tokio::test]
    async fn test_output_stops_remaining_steps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = ScriptedModel::new(&[
            r#"{"type":"output","output":"done"}{"type":"action","function":"add","input":{"a":1,"b":1}}"#,
        ]);
        let mut agent = Agent::new(model);
        agent.register_tool(add_tool(calls.clone()));

        let mut history = History::with_prompt("q").unwrap();
        assert_eq!(agent.run(&mut history).await.unwrap(), json!("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_system_instruction_lists_tools() {
        let model = ScriptedModel::new(&[r#"{"type":"output","output":1}"#]);
        let config = AgentConfig {
            context: "You are terse.".to_string(),
            ..Default::default()
        };
        let mut agent = Agent::with_config(model.clone(), config);
        agent.register_tool(add_tool(Arc::new(AtomicUsize::new(0))));

        agent.invoke("q").await.unwrap();

        let instruction = model.system_instruction(0);
        assert!(instruction.contains("add(a: int, b: int): Add two integers"));
        assert!(instruction.contains("You are terse."));
    }
}

mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_tool_aborts_without_side_effects() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = ScriptedModel::new(&[
            r#"{"type":"action","function":"multiply","input":{"a":2,"b":3}}"#,
        ]);
        let mut agent = Agent::new(model.clone());
        agent.register_tool(add_tool(calls.clone()));

        let err = agent.invoke("2*3?").await.unwrap_err();

        assert!(matches!(err, Error::UnknownTool(ref name) if name == "multiply"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_aborts() {
        let model = ScriptedModel::new(&["I am not sure how to help with that."]);
        let agent = Agent::new(model);

        let err = agent.invoke("q").await.unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_invalid_action_input_is_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = ScriptedModel::new(&[
            r#"{"type":"action","function":"add","input":"2+3"}"#,
            r#"{"type":"output","output":"gave up"}"#,
        ]);
        let mut agent = Agent::new(model.clone());
        agent.register_tool(add_tool(calls.clone()));

        let mut history = History::with_prompt("q").unwrap();
        let output = agent.run(&mut history).await.unwrap();

        assert_eq!(output, json!("gave up"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        // The skipped step is still recorded, with no observation after it
        assert_eq!(history.len(), 3);
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_round_limit() {
        let model = ScriptedModel::new(&[
            r#"{"type":"plan","plan":"one"}"#,
            r#"{"type":"plan","plan":"two"}"#,
            r#"{"type":"plan","plan":"three"}"#,
        ]);
        let config = AgentConfig {
            max_rounds: 2,
            ..Default::default()
        };
        let agent = Agent::with_config(model.clone(), config);

        let err = agent.invoke("q").await.unwrap_err();
        assert!(matches!(err, Error::RoundLimitExceeded(2)));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_round_limit_is_unlimited() {
        let model = ScriptedModel::new(&[
            r#"{"type":"plan","plan":"one"}"#,
            r#"{"type":"plan","plan":"two"}"#,
            r#"{"type":"plan","plan":"three"}"#,
            r#"{"type":"output","output":"done"}"#,
        ]);
        let config = AgentConfig {
            max_rounds: 0,
            ..Default::default()
        };
        let agent = Agent::with_config(model.clone(), config);

        assert_eq!(agent.invoke("q").await.unwrap(), json!("done"));
        assert_eq!(model.calls(), 4);
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let model = ScriptedModel::new(&[]);
        let agent = Agent::new(model);

        assert!(matches!(agent.invoke("q").await, Err(Error::Model(_))));
    }

    #[tokio::test]
    async fn test_tool_failure_aborts_by_default() {
        let model = ScriptedModel::new(&[r#"{"type":"action","function":"broken","input":{}}"#]);
        let mut agent = Agent::new(model);
        agent.register_tool(Tool::blocking("broken", |_| {
            Err(ToolError::ExecutionFailed("disk on fire".into()))
        }));

        let err = agent.invoke("q").await.unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::ExecutionFailed(_))));
    }

    #[tokio::test]
    async fn test_tool_failure_observed_when_configured() {
        let model = ScriptedModel::new(&[
            r#"{"type":"action","function":"broken","input":{}}"#,
            r#"{"type":"output","output":"recovered"}"#,
        ]);
        let config = AgentConfig {
            on_tool_error: ToolErrorPolicy::Observe,
            ..Default::default()
        };
        let mut agent = Agent::with_config(model, config);
        agent.register_tool(Tool::blocking("broken", |_| {
            Err(ToolError::ExecutionFailed("disk on fire".into()))
        }));

        let mut history = History::with_prompt("q").unwrap();
        assert_eq!(agent.run(&mut history).await.unwrap(), json!("recovered"));

        let observation = history.entries()[2].value().unwrap();
        assert_eq!(observation["type"], "observation");
        assert!(
            observation["observation"]["error"]
                .as_str()
                .unwrap()
                .contains("disk on fire")
        );
    }
}

mod tool_kind_tests {
    use super::*;

    #[tokio::test]
    async fn test_async_tool_in_loop() {
        let model = ScriptedModel::new(&[
            r#"{"type":"action","function":"lookup","input":{"key":"k"}}"#,
            r#"{"type":"output","output":"ok"}"#,
        ]);
        let mut agent = Agent::new(model);
        agent.register_tool(Tool::suspending("lookup", |input: ToolInput| async move {
            tokio::task::yield_now().await;
            Ok(json!(format!("value-of-{}", input["key"].as_str().unwrap_or(""))))
        }));

        let mut history = History::with_prompt("q").unwrap();
        agent.run(&mut history).await.unwrap();

        let observation = history.entries()[2].value().unwrap();
        assert_eq!(observation["observation"], "value-of-k");
    }

    #[tokio::test]
    async fn test_reregistered_tool_replaces_first() {
        let first = Arc::new(AtomicUsize::new(0));
        let model = ScriptedModel::new(&[
            r#"{"type":"action","function":"add","input":{"a":1,"b":1}}"#,
            r#"{"type":"output","output":"x"}"#,
        ]);
        let mut agent = Agent::new(model);
        agent.register_tool(add_tool(first.clone()));
        agent.register_tool(Tool::blocking("add", |_| Ok(json!("second"))));

        let mut history = History::with_prompt("q").unwrap();
        agent.run(&mut history).await.unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(agent.tools().len(), 1);
        assert_eq!(history.entries()[2].value().unwrap()["observation"], "second");
    }
}
