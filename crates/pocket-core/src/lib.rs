//! Pocket Core - a small tool-using agent runtime
//!
//! This crate provides:
//! - Step extraction from free-form model replies
//! - The typed step vocabulary and the conversation history
//! - A tool registry that drives blocking and async tools alike
//! - Remote tools served over MCP
//! - The agent loop that ties a model and its tools together

pub mod agent;
pub mod config;
pub mod error;
pub mod extract;
pub mod history;
pub mod model;
pub mod prompt;
pub mod step;
pub mod tools;

pub use agent::{Agent, LoopState};
pub use config::{AgentConfig, Config, ConfigManager, McpServerConfig, ProviderConfig, ToolErrorPolicy};
pub use error::{Error, Result, ToolError};
pub use extract::{extract_json_values, strip_code_fences};
pub use history::{History, HistoryEntry, Role};
pub use model::{GenAIModel, Model, ProviderType};
pub use prompt::SystemPrompt;
pub use step::{Classified, Step, classify};
pub use tools::remote::{ProviderTarget, RemoteToolProvider};
pub use tools::{Tool, ToolDescriptor, ToolHandler, ToolInput, ToolRegistry};
