//! MCP Client implementation

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::OnceLock;
use tokio::sync::Mutex;

use crate::protocol::{methods, notification, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::transport::Transport;
use crate::{McpResource, McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// MCP Client for connecting to MCP servers
///
/// One request is in flight at a time: the transport lock is held from
/// send until the matching response arrives.
pub struct McpClient<T: Transport> {
    transport: Mutex<T>,
    request_id: AtomicI64,
    server_capabilities: OnceLock<ServerCapabilities>,
    closed: AtomicBool,
}

impl<T: Transport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
            request_id: AtomicI64::new(1),
            server_capabilities: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Capabilities reported by the server during `initialize`
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Initialize the connection
    pub async fn initialize(&self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::INITIALIZE).with_params(params);
        let result = self.send_request(request).await?.into_result()?;

        let server_info: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;

        let _ = self.server_capabilities.set(server_info.capabilities);

        let mut transport = self.transport.lock().await;
        transport
            .send(notification(methods::INITIALIZED))
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(ServerInfo {
            name: server_info.server_info.name,
            version: server_info.server_info.version,
        })
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_LIST);
        let response = self.send_request(request).await?;

        match response.into_result() {
            Ok(result) => {
                let tools_result: ToolsListResult = serde_json::from_value(result)
                    .map_err(|e| McpError::Protocol(e.to_string()))?;
                Ok(tools_result.tools)
            }
            Err(McpError::Protocol(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Call a tool
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let request = JsonRpcRequest::new(self.next_id(), methods::TOOLS_CALL).with_params(params);
        let result = self.send_request(request).await?.into_result()?;

        serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
    }

    /// List resources
    pub async fn list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        let request = JsonRpcRequest::new(self.next_id(), methods::RESOURCES_LIST);
        let response = self.send_request(request).await?;

        match response.into_result() {
            Ok(result) => {
                let resources_result: ResourcesListResult = serde_json::from_value(result)
                    .map_err(|e| McpError::Protocol(e.to_string()))?;
                Ok(resources_result.resources)
            }
            Err(McpError::Protocol(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Close the session. Later calls fail with `McpError::Closed`.
    pub async fn close(&self) -> Result<(), McpError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut transport = self.transport.lock().await;
        transport
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }

        let mut transport = self.transport.lock().await;

        let request_value =
            serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;

        transport
            .send(request_value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        loop {
            let message = transport
                .receive()
                .await
                .map_err(|e| McpError::Transport(e.to_string()))?
                .ok_or_else(|| McpError::Transport("Connection closed".to_string()))?;

            // Server notifications and stale replies are not ours
            let matches = message
                .get("id")
                .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())
                .is_some_and(|id| id == request.id);
            if !matches {
                tracing::debug!(method = %request.method, "Skipping unrelated MCP message");
                continue;
            }

            return serde_json::from_value(message).map_err(|e| McpError::Protocol(e.to_string()));
        }
    }
}

impl JsonRpcResponse {
    fn into_result(self) -> Result<serde_json::Value, McpError> {
        if let Some(error) = self.error {
            Err(McpError::Server(error.message))
        } else if let Some(result) = self.result {
            Ok(result)
        } else {
            Err(McpError::Protocol("Empty response".to_string()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, serde::Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    #[allow(dead_code)]
    protocol_version: String,
    #[serde(default)]
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfoInner,
}

#[derive(Debug, serde::Deserialize)]
struct ServerInfoInner {
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, serde::Deserialize)]
struct ToolsListResult {
    tools: Vec<McpTool>,
}

#[derive(Debug, serde::Deserialize)]
struct ResourcesListResult {
    resources: Vec<McpResource>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Text of the first content item, if there is one
    pub fn primary_text(&self) -> Option<&str> {
        self.content.first().and_then(|item| item.text.as_deref())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
}

/// MCP errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Session is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_text_is_first_item() {
        let result: ToolCallResult = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"}
            ]
        }))
        .unwrap();

        assert_eq!(result.primary_text(), Some("first"));
        assert!(!result.is_error);
    }

    #[test]
    fn test_primary_text_none_without_content() {
        let result: ToolCallResult =
            serde_json::from_value(serde_json::json!({ "content": [] })).unwrap();
        assert_eq!(result.primary_text(), None);
    }

    #[test]
    fn test_into_result_prefers_error() {
        let response: JsonRpcResponse = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap();

        match response.into_result() {
            Err(McpError::Server(msg)) => assert_eq!(msg, "Method not found"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
