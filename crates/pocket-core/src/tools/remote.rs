//! Remote tool provider
//!
//! Connects to an external tool server over MCP, lists its tools and
//! exposes each one to the agent as a suspending [`Tool`]. The provider owns
//! the session for its whole lifetime and must be closed explicitly;
//! dropping it kills the server process as a last resort.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use pocket_mcp::{ClientInfo, McpClient, McpTool, StdioTransport, Transport};

use crate::config::McpServerConfig;
use crate::error::{Error, Result, ToolError};
use crate::tools::{Tool, ToolInput, ToolRegistry};

type SharedClient = Arc<McpClient<Box<dyn Transport>>>;

/// Where a tool server comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderTarget {
    /// A server script, launched with the interpreter for its extension
    Script(PathBuf),
    /// An explicit command line
    Command {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
}

impl ProviderTarget {
    pub fn script(path: impl Into<PathBuf>) -> Self {
        ProviderTarget::Script(path.into())
    }

    pub fn command(command: impl Into<String>, args: Vec<String>) -> Self {
        ProviderTarget::Command {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    /// Build a target from a configured `[mcp_servers.<name>]` table
    pub fn from_config(config: &McpServerConfig) -> Self {
        ProviderTarget::Command {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }

    /// Resolve the process to launch without starting it
    pub fn launch_spec(&self) -> Result<(String, Vec<String>, HashMap<String, String>)> {
        match self {
            ProviderTarget::Script(path) => {
                let interpreter = interpreter_for(path)?;
                Ok((
                    interpreter.to_string(),
                    vec![path.display().to_string()],
                    HashMap::new(),
                ))
            }
            ProviderTarget::Command { command, args, env } => {
                if command.trim().is_empty() {
                    return Err(Error::UnsupportedTarget("empty command".to_string()));
                }
                Ok((command.clone(), args.clone(), env.clone()))
            }
        }
    }
}

fn interpreter_for(path: &Path) -> Result<&'static str> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("py") => Ok("python"),
        Some("js") => Ok("node"),
        _ => Err(Error::UnsupportedTarget(format!(
            "{} (expected a .py or .js server script)",
            path.display()
        ))),
    }
}

/// A session with one remote tool server
#[derive(Default)]
pub struct RemoteToolProvider {
    client: Option<SharedClient>,
    tools: Vec<McpTool>,
    closed: bool,
}

impl RemoteToolProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch the server for `target`, handshake and list its tools.
    ///
    /// Unsupported targets are rejected before any process is started.
    pub async fn connect(&mut self, target: &ProviderTarget) -> Result<&[McpTool]> {
        let (command, args, env) = target.launch_spec()?;
        self.ensure_reusable()?;

        tracing::info!(command = %command, args = ?args, "Starting tool server");
        let transport = StdioTransport::spawn(&command, &args, &env).await?;
        self.connect_with(Box::new(transport)).await
    }

    /// Handshake over an already-open transport and list its tools
    pub async fn connect_with(&mut self, transport: Box<dyn Transport>) -> Result<&[McpTool]> {
        self.ensure_reusable()?;

        let client: SharedClient = Arc::new(McpClient::new(transport));
        // Held before the handshake so close() can release a half-open session
        self.client = Some(Arc::clone(&client));

        let server = client
            .initialize(ClientInfo {
                name: "pocket-agent".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await?;

        self.tools = client.list_tools().await?;
        tracing::info!(
            server = %server.name,
            version = %server.version,
            tools = self.tools.len(),
            "Connected to tool server"
        );

        Ok(&self.tools)
    }

    fn ensure_reusable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Config("Tool provider has been closed".to_string()));
        }
        if self.client.is_some() {
            return Err(Error::Config("Tool provider is already connected".to_string()));
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Tools listed by the server at connect time
    pub fn tools(&self) -> &[McpTool] {
        &self.tools
    }

    /// Register every remote tool under its own name.
    ///
    /// Returns how many tools were registered.
    pub fn register_into(&self, registry: &mut ToolRegistry) -> Result<usize> {
        let client = self.connected_client()?;

        for tool in &self.tools {
            registry.register(remote_tool(Arc::clone(client), tool));
        }
        Ok(self.tools.len())
    }

    /// Call a remote tool directly, returning its primary text.
    ///
    /// A result flagged as an error by the server becomes
    /// `ToolError::ExecutionFailed`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Option<String>> {
        let client = self.connected_client()?;
        Ok(invoke_remote(client, name, arguments).await?)
    }

    fn connected_client(&self) -> Result<&SharedClient> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::Config("Tool provider is not connected".to_string()))
    }

    /// End the session and stop the server.
    ///
    /// Safe to call more than once, and before `connect`.
    pub async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.tools.clear();

        if let Some(client) = self.client.take() {
            client.close().await?;
            tracing::info!("Closed tool server session");
        }
        Ok(())
    }
}

/// Adapt one remote tool into a registry tool
fn remote_tool(client: SharedClient, info: &McpTool) -> Tool {
    let name = info.name.clone();

    Tool::suspending(info.name.clone(), move |input: ToolInput| {
        let client = Arc::clone(&client);
        let name = name.clone();
        async move { forward(&client, &name, Value::Object(input)).await }
    })
    .with_description(info.description.clone())
    .with_schema(info.input_schema.clone())
    .with_argument_logging(true)
}

async fn forward(
    client: &SharedClient,
    name: &str,
    arguments: Value,
) -> std::result::Result<Value, ToolError> {
    let text = invoke_remote(client, name, arguments).await?;
    Ok(text.map(Value::String).unwrap_or(Value::Null))
}

async fn invoke_remote(
    client: &SharedClient,
    name: &str,
    arguments: Value,
) -> std::result::Result<Option<String>, ToolError> {
    let result = client.call_tool(name, arguments).await.map_err(|e| {
        ToolError::ExecutionFailed(format!("Remote tool '{}' failed: {}", name, e))
    })?;

    if result.is_error {
        let message = result
            .primary_text()
            .unwrap_or("remote tool reported an error");
        return Err(ToolError::ExecutionFailed(format!(
            "Remote tool '{}' failed: {}",
            name, message
        )));
    }

    Ok(result.primary_text().map(str::to_string))
}
