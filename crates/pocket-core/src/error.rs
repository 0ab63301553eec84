//! Error types for Pocket Core

use thiserror::Error;

/// Result type alias using Pocket Error
pub type Result<T> = std::result::Result<T, Error>;

/// Pocket error types
#[derive(Error, Debug)]
pub enum Error {
    /// The model reply contained no decodable JSON value
    #[error("Model returned no decodable steps: {0}")]
    MalformedOutput(String),

    /// An action named a tool that is not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("No output after {0} rounds")]
    RoundLimitExceeded(usize),

    #[error("Unsupported tool provider target: {0}")]
    UnsupportedTarget(String),

    #[error("Remote tool provider error: {0}")]
    Remote(#[from] pocket_mcp::McpError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Tool-specific errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
