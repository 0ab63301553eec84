//! MCP handler exposing [`FsRoot`] operations as tools

use std::sync::Arc;

use pocket_mcp::{McpHandler, McpResource, McpTool, ResourceContent};
use serde_json::{Value, json};

use crate::fs::{DEFAULT_MAX_RESULTS, FsError, FsRoot};

pub const SERVER_NAME: &str = "Filesystem";
pub const CAPABILITIES_URI: &str = "resource://capabilities";

const TOOL_NAMES: [&str; 4] = ["list_dir", "stat", "read_file", "search"];

pub struct FsHandler {
    root: Arc<FsRoot>,
}

impl FsHandler {
    pub fn new(root: FsRoot) -> Self {
        Self {
            root: Arc::new(root),
        }
    }

    fn tool(name: &str, description: &str, schema: Value) -> McpTool {
        McpTool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: schema,
        }
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("{} is required", key))
}

impl McpHandler for FsHandler {
    async fn list_tools(&self) -> Vec<McpTool> {
        vec![
            Self::tool(
                "list_dir",
                "List directory contents. Returns the path and entries with name, is_dir and size.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Directory relative to the root", "default": ""}
                    }
                }),
            ),
            Self::tool(
                "stat",
                "Return basic stat info (is_dir, size, mtime, ctime) for a file or directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path relative to the root"}
                    },
                    "required": ["path"]
                }),
            ),
            Self::tool(
                "read_file",
                "Read up to max_bytes from a file. Returns UTF-8 text, or base64 for binary content.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File relative to the root"},
                        "max_bytes": {"type": "integer", "description": "Upper bound on bytes returned", "default": self.root.read_limit()}
                    },
                    "required": ["path"]
                }),
            ),
            Self::tool(
                "search",
                "Case-insensitive file name search (not full-text) below a directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Directory relative to the root", "default": ""},
                        "query": {"type": "string", "description": "Substring of the file name"},
                        "max_results": {"type": "integer", "default": DEFAULT_MAX_RESULTS}
                    }
                }),
            ),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String> {
        tracing::debug!(tool = %name, "Handling tool call");

        let root = Arc::clone(&self.root);
        let name = name.to_string();

        let result = tokio::task::spawn_blocking(move || -> Result<Value, String> {
            let outcome: Result<Value, FsError> = match name.as_str() {
                "list_dir" => root.list_dir(str_arg(&arguments, "path")),
                "stat" => root.stat(required_str(&arguments, "path")?),
                "read_file" => root.read_file(
                    required_str(&arguments, "path")?,
                    arguments.get("max_bytes").and_then(Value::as_i64),
                ),
                "search" => root.search(
                    str_arg(&arguments, "path"),
                    str_arg(&arguments, "query"),
                    arguments.get("max_results").and_then(Value::as_i64),
                ),
                other => return Err(format!("Unknown tool: {}", other)),
            };
            outcome.map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("Tool task failed: {}", e))?;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Tool call failed");
        }
        result
    }

    async fn list_resources(&self) -> Vec<McpResource> {
        vec![McpResource {
            uri: CAPABILITIES_URI.to_string(),
            name: "capabilities".to_string(),
            description: Some("Server name, tools, root and read limit".to_string()),
            mime_type: Some("application/json".to_string()),
        }]
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, String> {
        if uri != CAPABILITIES_URI {
            return Err(format!("Unknown resource: {}", uri));
        }
        Ok(ResourceContent {
            uri: uri.to_string(),
            mime_type: Some("application/json".to_string()),
            text: Some(self.root.capabilities(SERVER_NAME, &TOOL_NAMES).to_string()),
        })
    }
}
