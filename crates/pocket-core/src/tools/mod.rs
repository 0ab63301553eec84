//! Tool system for Pocket agents
//!
//! Tools are the actions the model can request. Each tool has:
//! - A name and description shown to the model
//! - An optional JSON schema (or a free-text signature) for its parameters
//! - A handler that is either blocking or suspending
//!
//! Both kinds of handler can be driven from both kinds of caller:
//! [`Tool::call`] never needs an async context, and [`Tool::call_async`]
//! never blocks the caller's scheduler.

pub mod builtin;
pub mod remote;
mod schema;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::ToolError;

pub use schema::validate_arguments;

/// Boxed future type for object-safe async handlers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Named arguments taken from an action's `input` object
pub type ToolInput = Map<String, Value>;

pub type ToolResult = Result<Value, ToolError>;

type BlockingFn = dyn Fn(ToolInput) -> ToolResult + Send + Sync;
type SuspendingFn = dyn Fn(ToolInput) -> BoxFuture<'static, ToolResult> + Send + Sync;

/// The callable behind a tool, tagged by its concurrency nature
#[derive(Clone)]
pub enum ToolHandler {
    /// Runs to completion on the calling thread
    Blocking(Arc<BlockingFn>),
    /// Suspends on I/O; must be polled by an async runtime
    Suspending(Arc<SuspendingFn>),
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolHandler::Blocking(_) => f.write_str("Blocking"),
            ToolHandler::Suspending(_) => f.write_str("Suspending"),
        }
    }
}

/// Tool description shown to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema of the parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Free-text parameter list for tools without a schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl fmt::Display for ToolDescriptor {
    /// Renders as a single line: `name(signature-or-schema): description`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = match (&self.schema, &self.signature) {
            (Some(schema), _) => schema.to_string(),
            (None, Some(signature)) => signature.clone(),
            (None, None) => String::new(),
        };
        let description = self.description.split_whitespace().collect::<Vec<_>>().join(" ");
        write!(f, "{}({}): {}", self.name, params, description)
    }
}

const NO_DESCRIPTION: &str = "No description available";

/// A named, described, invocable capability
#[derive(Debug, Clone)]
pub struct Tool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
    log_arguments: bool,
}

impl Tool {
    /// Wrap a synchronous function
    pub fn blocking<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ToolInput) -> ToolResult + Send + Sync + 'static,
    {
        Self::from_handler(name, ToolHandler::Blocking(Arc::new(f)))
    }

    /// Wrap an asynchronous function
    pub fn suspending<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let handler: Arc<SuspendingFn> = Arc::new(move |input| Box::pin(f(input)));
        Self::from_handler(name, ToolHandler::Suspending(handler))
    }

    pub fn from_handler(name: impl Into<String>, handler: ToolHandler) -> Self {
        Self {
            descriptor: ToolDescriptor {
                name: name.into(),
                description: NO_DESCRIPTION.to_string(),
                schema: None,
                signature: None,
            },
            handler,
            log_arguments: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.trim().is_empty() {
            self.descriptor.description = description;
        }
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.descriptor.schema = Some(schema);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.descriptor.signature = Some(signature.into());
        self
    }

    /// Include the arguments in the invocation log line
    pub fn with_argument_logging(mut self, enabled: bool) -> Self {
        self.log_arguments = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn schema(&self) -> Option<&Value> {
        self.descriptor.schema.as_ref()
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn handler(&self) -> &ToolHandler {
        &self.handler
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self.handler, ToolHandler::Blocking(_))
    }

    /// Wrap the handler so every invocation is logged before it runs
    fn with_invocation_logging(mut self) -> Self {
        let name = self.descriptor.name.clone();
        let log_arguments = self.log_arguments;

        self.handler = match self.handler {
            ToolHandler::Blocking(f) => ToolHandler::Blocking(Arc::new(move |input| {
                log_invocation(&name, log_arguments, &input);
                f(input)
            })),
            ToolHandler::Suspending(f) => ToolHandler::Suspending(Arc::new(move |input| {
                log_invocation(&name, log_arguments, &input);
                f(input)
            })),
        };
        self
    }

    fn validate(&self, input: &ToolInput) -> Result<(), ToolError> {
        match &self.descriptor.schema {
            Some(schema) => validate_arguments(schema, input),
            None => Ok(()),
        }
    }

    /// Invoke the tool, blocking the current thread until it finishes.
    ///
    /// Suspending handlers are driven on the active multi-thread runtime
    /// when there is one, otherwise on a short-lived runtime started for the
    /// call. Inside a current-thread runtime a suspending handler fails
    /// with [`ToolError::ExecutionFailed`]; use [`Tool::call_async`] there.
    pub fn call(&self, input: ToolInput) -> ToolResult {
        self.validate(&input)?;
        match &self.handler {
            ToolHandler::Blocking(f) => f(input),
            ToolHandler::Suspending(f) => block_on_tool(f(input)),
        }
    }

    /// Invoke the tool from async code.
    ///
    /// Blocking handlers are moved to tokio's blocking pool so the calling
    /// scheduler keeps running.
    pub async fn call_async(&self, input: ToolInput) -> ToolResult {
        self.validate(&input)?;
        match &self.handler {
            ToolHandler::Suspending(f) => f(input).await,
            ToolHandler::Blocking(f) => {
                let f = Arc::clone(f);
                tokio::task::spawn_blocking(move || f(input))
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(format!("Tool task failed: {}", e)))?
            }
        }
    }
}

fn log_invocation(name: &str, log_arguments: bool, input: &ToolInput) {
    if log_arguments {
        tracing::info!(tool = %name, arguments = %serde_json::Value::Object(input.clone()), "Running tool");
    } else {
        tracing::info!(tool = %name, "Running tool");
    }
}

const CURRENT_THREAD_BLOCK: &str =
    "Tool::call cannot block a current-thread runtime; use call_async";

/// Drive a tool future to completion from synchronous code
fn block_on_tool(future: BoxFuture<'static, ToolResult>) -> ToolResult {
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            // The future may need this runtime's reactor, whose only worker
            // would be the thread we block
            RuntimeFlavor::CurrentThread => Err(ToolError::ExecutionFailed(
                CURRENT_THREAD_BLOCK.to_string(),
            )),
            _ => tokio::task::block_in_place(|| handle.block_on(future)),
        },
        Err(_) => block_on_fresh_runtime(future),
    }
}

fn block_on_fresh_runtime(future: BoxFuture<'static, ToolResult>) -> ToolResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ToolError::ExecutionFailed(format!("Failed to start runtime: {}", e)))?;
    runtime.block_on(future)
}

/// Registry of available tools, kept in registration order
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    ///
    /// A replaced tool keeps its slot in the listing order. Returns the
    /// replaced tool, if any.
    pub fn register(&mut self, tool: Tool) -> Option<Arc<Tool>> {
        let tool = Arc::new(tool.with_invocation_logging());
        let name = tool.name().to_string();

        match self.index.get(&name) {
            Some(&slot) => {
                tracing::debug!(tool = %name, "Replacing registered tool");
                Some(std::mem::replace(&mut self.tools[slot], tool))
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
                None
            }
        }
    }

    /// Look a tool up by name
    pub fn resolve(&self, name: &str) -> Option<Arc<Tool>> {
        self.index.get(name).map(|&slot| Arc::clone(&self.tools[slot]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors of every tool, in registration order
    pub fn describe_all(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor().clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tool>> {
        self.tools.iter()
    }
}

/// Helper macro for creating tool parameter schemas
#[macro_export]
macro_rules! tool_params {
    ($($field:ident : $type:expr => $desc:expr),* $(,)?) => {
        serde_json::json!({
            "type": "object",
            "properties": {
                $( stringify!($field): { "type": $type, "description": $desc } ),*
            },
            "required": [ $( stringify!($field) ),* ]
        })
    };
}
