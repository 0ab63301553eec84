//! MCP Server implementation

use std::sync::Arc;

use serde_json::Value;

use crate::protocol::{methods, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::transport::Transport;
use crate::{McpResource, McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// Handler for MCP requests
#[allow(async_fn_in_trait)]
pub trait McpHandler: Send + Sync {
    /// List available tools
    async fn list_tools(&self) -> Vec<McpTool>;

    /// Call a tool
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String>;

    /// List available resources
    async fn list_resources(&self) -> Vec<McpResource> {
        Vec::new()
    }

    /// Read a resource
    async fn read_resource(&self, uri: &str) -> Result<ResourceContent, String> {
        Err(format!("Unknown resource: {}", uri))
    }
}

/// Resource content
#[derive(Debug, Clone)]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: Option<String>,
    pub text: Option<String>,
}

/// MCP Server
pub struct McpServer<H: McpHandler> {
    handler: Arc<H>,
    capabilities: ServerCapabilities,
    server_name: String,
    server_version: String,
}

impl<H: McpHandler> McpServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            capabilities: ServerCapabilities {
                tools: Some(crate::ToolsCapability { list_changed: false }),
                resources: Some(crate::ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                }),
            },
            server_name: "pocket-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Serve requests from `transport` until the peer disconnects
    pub async fn serve<T: Transport>(&self, mut transport: T) -> std::io::Result<()> {
        while let Some(message) = transport.receive().await? {
            // Notifications carry no id and expect no reply
            if message.get("id").is_none() {
                tracing::debug!(method = ?message.get("method"), "Ignoring notification");
                continue;
            }

            let response = match serde_json::from_value::<JsonRpcRequest>(message.clone()) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed JSON-RPC request");
                    let id = message
                        .get("id")
                        .and_then(|id| serde_json::from_value(id.clone()).ok())
                        .unwrap_or(RequestId::Number(0));
                    JsonRpcResponse::error(id, JsonRpcError::invalid_request())
                }
            };

            transport.send(serde_json::to_value(&response)?).await?;
        }

        transport.close().await
    }

    /// Handle a JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request.id).await,
            methods::TOOLS_LIST => self.handle_tools_list(request.id).await,
            methods::TOOLS_CALL => self.handle_tools_call(request.id, request.params).await,
            methods::RESOURCES_LIST => self.handle_resources_list(request.id).await,
            methods::RESOURCES_READ => self.handle_resources_read(request.id, request.params).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found()),
        }
    }

    async fn handle_initialize(&self, id: RequestId) -> JsonRpcResponse {
        let result = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": self.capabilities,
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version
            }
        });

        JsonRpcResponse::success(id, result)
    }

    async fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        let tools = self.handler.list_tools().await;
        JsonRpcResponse::success(id, serde_json::json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params()),
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n,
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params()),
        };

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        let (text, is_error) = match self.handler.call_tool(name, arguments).await {
            Ok(Value::String(s)) => (s, false),
            Ok(result) => (result.to_string(), false),
            Err(e) => (e, true),
        };

        JsonRpcResponse::success(
            id,
            serde_json::json!({
                "content": [{ "type": "text", "text": text }],
                "isError": is_error
            }),
        )
    }

    async fn handle_resources_list(&self, id: RequestId) -> JsonRpcResponse {
        let resources = self.handler.list_resources().await;
        JsonRpcResponse::success(id, serde_json::json!({ "resources": resources }))
    }

    async fn handle_resources_read(&self, id: RequestId, params: Option<Value>) -> JsonRpcResponse {
        let uri = match params.as_ref().and_then(|p| p.get("uri")).and_then(|v| v.as_str()) {
            Some(u) => u,
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params()),
        };

        match self.handler.read_resource(uri).await {
            Ok(content) => {
                let contents = vec![serde_json::json!({
                    "uri": content.uri,
                    "mimeType": content.mime_type,
                    "text": content.text
                })];
                JsonRpcResponse::success(id, serde_json::json!({ "contents": contents }))
            }
            Err(e) => JsonRpcResponse::error(
                id,
                JsonRpcError::new(-32000, format!("Resource error: {}", e)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl McpHandler for Echo {
        async fn list_tools(&self) -> Vec<McpTool> {
            vec![McpTool {
                name: "echo".to_string(),
                description: "Echo the input".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }]
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, String> {
            match name {
                "echo" => Ok(arguments),
                other => Err(format!("no such tool: {}", other)),
            }
        }
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        let request = JsonRpcRequest::new(RequestId::Number(1), method);
        match params {
            Some(p) => request.with_params(p),
            None => request,
        }
    }

    #[tokio::test]
    async fn test_initialize_reports_protocol_version() {
        let server = McpServer::new(Arc::new(Echo)).with_name("echo-server");
        let response = server.handle_request(request(methods::INITIALIZE, None)).await;
        let result = response.result.unwrap();

        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "echo-server");
    }

    #[tokio::test]
    async fn test_tool_error_is_flagged_not_rpc_error() {
        let server = McpServer::new(Arc::new(Echo));
        let response = server
            .handle_request(request(
                methods::TOOLS_CALL,
                Some(serde_json::json!({"name": "missing", "arguments": {}})),
            ))
            .await;

        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "no such tool: missing");
    }

    #[tokio::test]
    async fn test_tools_call_without_name_is_invalid() {
        let server = McpServer::new(Arc::new(Echo));
        let response = server
            .handle_request(request(methods::TOOLS_CALL, Some(serde_json::json!({}))))
            .await;

        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = McpServer::new(Arc::new(Echo));
        let response = server.handle_request(request("prompts/list", None)).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }
}
