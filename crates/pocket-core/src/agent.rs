//! The agent loop
//!
//! One invocation alternates between asking the model for its next steps
//! and acting on them:
//!
//! ```text
//! AwaitModel -> Parse -> (DispatchAction)* -> Continue -> AwaitModel ...
//!                              \-> Terminate (output step)
//!                              \-> Abort (error)
//! ```
//!
//! Every value the model emits is appended to the history as a `model`
//! entry before it is acted on, and every action's result is appended as a
//! `user` observation. The first `output` step ends the invocation.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, ToolErrorPolicy};
use crate::error::{Error, Result};
use crate::extract::extract_json_values;
use crate::history::{History, Role};
use crate::model::Model;
use crate::prompt::SystemPrompt;
use crate::step::{Classified, Step, classify};
use crate::tools::remote::RemoteToolProvider;
use crate::tools::{Tool, ToolInput, ToolRegistry};

/// Where the loop is within one round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitModel,
    Parse,
    DispatchAction,
    Continue,
    Terminate,
    Abort,
}

/// Longest slice of a bad reply quoted in errors
const REPLY_PREVIEW_CHARS: usize = 200;

/// A model, the tools it may call, and the settings for driving it
pub struct Agent {
    model: Arc<dyn Model>,
    tools: ToolRegistry,
    prompt: SystemPrompt,
    config: AgentConfig,
}

impl Agent {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self::with_config(model, AgentConfig::default())
    }

    pub fn with_config(model: Arc<dyn Model>, config: AgentConfig) -> Self {
        let prompt = SystemPrompt::new().with_context(config.context.clone());
        Self {
            model,
            tools: ToolRegistry::new(),
            prompt,
            config,
        }
    }

    /// Replace the system instruction template, keeping the configured context
    pub fn with_prompt(mut self, prompt: SystemPrompt) -> Self {
        self.prompt = prompt.with_context(self.config.context.clone());
        self
    }

    /// Use a prepared registry in place of the current tools
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register_tool(&mut self, tool: Tool) -> &mut Self {
        info!(tool = %tool.name(), "Registering tool");
        self.tools.register(tool);
        self
    }

    /// Register every tool of a connected remote provider
    pub fn register_remote(&mut self, provider: &RemoteToolProvider) -> Result<usize> {
        let count = provider.register_into(&mut self.tools)?;
        info!(count, "Registered remote tools");
        Ok(count)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The system instruction for the current set of tools
    pub fn system_instruction(&self) -> String {
        self.prompt.render(&self.tools.describe_all())
    }

    /// Run one request to completion and return the model's output value
    pub async fn invoke(&self, prompt: &str) -> Result<Value> {
        let mut history = History::with_prompt(prompt)?;
        self.run(&mut history).await
    }

    /// Drive the loop over a caller-owned history.
    ///
    /// `history` normally holds just the opening `user` step. On return it
    /// contains the full trace, including the step that ended the loop.
    pub async fn run(&self, history: &mut History) -> Result<Value> {
        let system_instruction = self.system_instruction();
        let mut round = 0usize;

        loop {
            round += 1;
            let max = self.config.max_rounds;
            if max > 0 && round > max {
                transition(LoopState::Abort, round);
                return Err(Error::RoundLimitExceeded(max));
            }

            transition(LoopState::AwaitModel, round);
            let reply = self
                .model
                .generate(&system_instruction, history.entries())
                .await
                .inspect_err(|_| transition(LoopState::Abort, round))?;

            transition(LoopState::Parse, round);
            let values = extract_json_values(&reply);
            if values.is_empty() {
                transition(LoopState::Abort, round);
                return Err(Error::MalformedOutput(preview(&reply)));
            }
            debug!(round, steps = values.len(), "Decoded model reply");

            for value in values {
                history.push_value(Role::Model, &value)?;

                match classify(&value) {
                    Classified::Step(Step::Output { output }) => {
                        transition(LoopState::Terminate, round);
                        return Ok(output);
                    }
                    Classified::Step(Step::Action { function, input }) => {
                        transition(LoopState::DispatchAction, round);
                        let observation = self
                            .dispatch(&function, input)
                            .await
                            .inspect_err(|_| transition(LoopState::Abort, round))?;
                        history.push_step(Role::User, &Step::observation(observation))?;
                    }
                    Classified::Step(step) => {
                        debug!(round, kind = step.kind(), "Informational step");
                    }
                    Classified::Invalid { kind, reason } => {
                        warn!(round, kind = %kind, reason = %reason, "Skipping malformed step");
                    }
                    Classified::Unknown => {
                        debug!(round, "Skipping value without a known step type");
                    }
                }
            }

            transition(LoopState::Continue, round);
        }
    }

    /// Run one action and produce its observation
    async fn dispatch(&self, function: &str, input: ToolInput) -> Result<Value> {
        let tool = self.tools.resolve(function).ok_or_else(|| {
            warn!(tool = %function, "Model requested an unknown tool");
            Error::UnknownTool(function.to_string())
        })?;

        match tool.call_async(input).await {
            Ok(value) => Ok(value),
            Err(e) => match self.config.on_tool_error {
                ToolErrorPolicy::Abort => Err(e.into()),
                ToolErrorPolicy::Observe => {
                    warn!(tool = %function, error = %e, "Tool failed; reporting to model");
                    Ok(json!({ "error": e.to_string() }))
                }
            },
        }
    }
}

fn transition(state: LoopState, round: usize) {
    debug!(round, state = ?state, "Agent loop");
}

fn preview(reply: &str) -> String {
    let trimmed = reply.trim();
    if trimmed.chars().count() > REPLY_PREVIEW_CHARS {
        let head: String = trimmed.chars().take(REPLY_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_replies() {
        let long = "x".repeat(REPLY_PREVIEW_CHARS + 50);
        let shown = preview(&long);
        assert_eq!(shown.len(), REPLY_PREVIEW_CHARS + 3);
        assert!(shown.ends_with("..."));
        assert_eq!(preview("  short  "), "short");
    }
}
