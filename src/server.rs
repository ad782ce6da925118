use std::future::Future;
use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::{Map, Value};
use tracing::debug;

use crate::tools::{ToolExecutor, ToolRegistry};

const INSTRUCTIONS: &str = "TIDAL music tools. Call tidal_login first, and again whenever a \
tool reports kind=unauthenticated. Every response is JSON with status success or error. \
Playlist edits report an outcome (nothing_applied, partially_applied, fully_applied) and \
a per-step mutation report; after partially_applied, re-read the playlist before retrying. \
Include track and playlist URLs when presenting results.";

/// MCP front end over the tool registry.
#[derive(Clone)]
pub struct TidalServer {
    executor: Arc<ToolExecutor>,
}

impl TidalServer {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            executor: Arc::new(ToolExecutor::new(registry)),
        }
    }

    /// Tool definitions as advertised to the client.
    pub fn tool_definitions(&self) -> Vec<Tool> {
        self.executor
            .registry()
            .list_tools()
            .iter()
            .map(|tool| {
                let schema = match tool.parameters_schema() {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                Tool::new(
                    tool.name().to_string(),
                    tool.description().to_string(),
                    Arc::new(schema),
                )
            })
            .collect()
    }
}

/// Wraps an envelope as a text result, flagged as an error when it is one.
fn to_call_result(envelope: Value) -> CallToolResult {
    let failed = envelope["status"] == "error";
    let content = vec![Content::text(envelope.to_string())];
    if failed {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

#[allow(deprecated)]
impl ServerHandler for TidalServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(self.tool_definitions())))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let params = request
                .arguments
                .map(Value::Object)
                .unwrap_or(Value::Null);
            debug!("MCP call: {} {}", request.name, params);
            let envelope = self
                .executor
                .execute(&request.name, params, context.ct.clone())
                .await;
            Ok(to_call_result(envelope))
        }
    }
}
