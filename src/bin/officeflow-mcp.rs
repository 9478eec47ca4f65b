//! Officeflow MCP Server: office workflow automation for LLM assistants.
//! Communicates with the Officeflow HTTP API over localhost.
//!
//! Usage: officeflow-mcp  (stdio transport; set OFFICEFLOW_API_PORT if not 38480)

use rmcp::{
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    schemars, tool, tool_handler, tool_router, ServerHandler,
    service::RequestContext,
    RoleServer, ServiceExt,
    ErrorData as McpError,
};
use reqwest::Client;
use std::collections::HashMap;
use std::env;

const DEFAULT_PORT: u16 = 38480;

fn api_base() -> String {
    let port = env::var("OFFICEFLOW_API_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    format!("http://127.0.0.1:{}", port)
}

// ---------------------------------------------------------------------------
// Parameter types
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct WorkflowIdParam {
    /// Workflow ID (from list_workflows), e.g. "email_automation"
    workflow_id: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ExecuteWorkflowParam {
    /// Workflow ID (from list_workflows)
    workflow_id: String,
    /// Parameter bag passed to the workflow's steps, e.g.
    /// {"recipient": "a@b.com", "subject": "Hi", "content": "Hello"}
    #[serde(default)]
    parameters: HashMap<String, serde_json::Value>,
    /// Start the run and return its execution_id immediately instead of
    /// waiting for it to finish (default: false)
    #[serde(default)]
    background: bool,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ExecutionIdParam {
    /// Execution ID returned by execute_workflow (e.g. "exec_3f2a...")
    execution_id: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ListToolsParam {
    /// Only tools in this category, e.g. "communication", "storage", "accounting"
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ToolActionParam {
    /// Tool ID (from list_tools), e.g. "slack"
    tool_id: String,
    /// One of the tool's actions, e.g. "send_slack_message"
    action: String,
    /// Action parameters, e.g. {"channel": "#general", "text": "Deployed"}
    #[serde(default)]
    parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ConnectToolParam {
    /// Tool ID (from list_tools)
    tool_id: String,
    /// Auth token sent as a bearer token on live calls to this tool
    token: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ToolIdParam {
    /// Tool ID (from list_tools)
    tool_id: String,
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct OfficeflowMcpServer {
    client: Client,
    base: String,
    api_key: Option<String>,
    tool_router: ToolRouter<Self>,
}

impl OfficeflowMcpServer {
    fn new() -> Self {
        Self {
            client: Client::new(),
            base: api_base(),
            api_key: env::var("OFFICEFLOW_API_KEY").ok().filter(|s| !s.is_empty()),
            tool_router: Self::tool_router(),
        }
    }

    fn apply_key(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    /// Send a request; returns the status and body text.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<(reqwest::StatusCode, String), McpError> {
        let resp = self.apply_key(req).send().await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let status = resp.status();
        let text = resp.text().await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok((status, text))
    }

    async fn api_get(&self, path: &str) -> Result<CallToolResult, McpError> {
        let req = self.client.get(format!("{}{}", self.base, path));
        let (status, text) = self.send(req).await?;
        Self::tool_result(status, text)
    }

    async fn api_post(&self, path: &str, body: &serde_json::Value) -> Result<CallToolResult, McpError> {
        let req = self.client.post(format!("{}{}", self.base, path)).json(body);
        let (status, text) = self.send(req).await?;
        Self::tool_result(status, text)
    }

    /// Not-found and failed executions come back as tool errors carrying the
    /// API's JSON body.
    fn tool_result(status: reqwest::StatusCode, text: String) -> Result<CallToolResult, McpError> {
        if status.is_success() {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        } else if status.is_client_error() && status != reqwest::StatusCode::UNAUTHORIZED {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        } else {
            Err(McpError::internal_error(format!("HTTP {}: {}", status, text), None))
        }
    }
}

#[tool_router]
impl OfficeflowMcpServer {
    // ── Workflows ─────────────────────────────────────────────────────────

    /// List registered workflows
    #[tool(description = "List all registered workflows. Returns an array of {id, name, description, step_count}. Use the id with get_workflow and execute_workflow.")]
    async fn list_workflows(&self) -> Result<CallToolResult, McpError> {
        self.api_get("/api/workflows").await
    }

    /// Get a workflow definition
    #[tool(description = "Get the full definition of a workflow: its ordered steps, each with id, action, required parameter names and provided names. Use it to learn which parameters execute_workflow needs.")]
    async fn get_workflow(
        &self,
        Parameters(p): Parameters<WorkflowIdParam>,
    ) -> Result<CallToolResult, McpError> {
        self.api_get(&format!("/api/workflows/{}", p.workflow_id)).await
    }

    /// Execute a workflow
    #[tool(description = "Execute a workflow with a parameter bag. Steps run in order; each step's required parameters must be supplied or produced by an earlier step. Returns the finished execution (status, results per step, logs). On failure returns {error, execution_id, execution}. With background=true returns {execution_id} at once; poll get_workflow_status.")]
    async fn execute_workflow(
        &self,
        Parameters(p): Parameters<ExecuteWorkflowParam>,
    ) -> Result<CallToolResult, McpError> {
        let path = if p.background {
            format!("/api/workflows/{}/execute?background=true", p.workflow_id)
        } else {
            format!("/api/workflows/{}/execute", p.workflow_id)
        };
        let body = serde_json::to_value(&p.parameters)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        self.api_post(&path, &body).await
    }

    // ── Executions ────────────────────────────────────────────────────────

    /// Get execution status
    #[tool(description = "Get a snapshot of an execution: status (running/completed/failed/cancelled), current_step, results keyed by step id, error, and timestamped logs.")]
    async fn get_workflow_status(
        &self,
        Parameters(p): Parameters<ExecutionIdParam>,
    ) -> Result<CallToolResult, McpError> {
        self.api_get(&format!("/api/executions/{}", p.execution_id)).await
    }

    /// Cancel a running execution
    #[tool(description = "Cancel a running execution. Returns {cancelled: true} if it was running, {cancelled: false} if it had already finished or does not exist.")]
    async fn cancel_workflow(
        &self,
        Parameters(p): Parameters<ExecutionIdParam>,
    ) -> Result<CallToolResult, McpError> {
        self.api_post(
            &format!("/api/executions/{}/cancel", p.execution_id),
            &serde_json::json!({}),
        )
        .await
    }

    /// List running executions
    #[tool(description = "List all executions that are still running.")]
    async fn list_active_workflows(&self) -> Result<CallToolResult, McpError> {
        self.api_get("/api/executions?active=true").await
    }

    // ── Tools ─────────────────────────────────────────────────────────────

    /// List tool integrations
    #[tool(description = "List the external tool integrations (email, calendar, documents, Slack, QuickBooks, ...) with their actions, category, whether they require a connection and whether they are connected. Optionally filter by category.")]
    async fn list_tools(
        &self,
        Parameters(p): Parameters<ListToolsParam>,
    ) -> Result<CallToolResult, McpError> {
        match p.category {
            Some(category) => self.api_get(&format!("/api/tools?category={}", category)).await,
            None => self.api_get("/api/tools").await,
        }
    }

    /// Call one tool action directly
    #[tool(description = "Call one action of a tool integration directly, outside any workflow. Returns {success, tool, action, result, simulated, timestamp}. Tools that require a connection answer with simulated results until connect_tool is called.")]
    async fn call_tool_action(
        &self,
        Parameters(p): Parameters<ToolActionParam>,
    ) -> Result<CallToolResult, McpError> {
        let body = serde_json::to_value(&p.parameters)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        self.api_post(
            &format!("/api/tools/{}/actions/{}", p.tool_id, p.action),
            &body,
        )
        .await
    }

    /// Connect a tool
    #[tool(description = "Connect a tool integration with an auth token. Returns {tool_id, connected_at, status}. The token itself is never echoed back.")]
    async fn connect_tool(
        &self,
        Parameters(p): Parameters<ConnectToolParam>,
    ) -> Result<CallToolResult, McpError> {
        self.api_post(
            &format!("/api/tools/{}/connect", p.tool_id),
            &serde_json::json!({ "token": p.token }),
        )
        .await
    }

    /// Disconnect a tool
    #[tool(description = "Drop a tool's connection. Returns {disconnected: true} if it was connected.")]
    async fn disconnect_tool(
        &self,
        Parameters(p): Parameters<ToolIdParam>,
    ) -> Result<CallToolResult, McpError> {
        self.api_post(
            &format!("/api/tools/{}/disconnect", p.tool_id),
            &serde_json::json!({}),
        )
        .await
    }
}

#[tool_handler]
impl ServerHandler for OfficeflowMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "officeflow-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Officeflow Workflow Automation".into()),
                description: Some(
                    "Run office workflows (email, documents, meetings, projects, finance)".into(),
                ),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "# Officeflow MCP: Office Workflow Automation\n\
                 \n\
                 ## Core Concepts\n\
                 - **Workflow**: a named, ordered list of steps (e.g. email_automation).\n\
                 - **Step**: one action with required parameter names. A step may also provide names for later steps.\n\
                 - **Execution**: one run of a workflow, with status, per-step results and logs.\n\
                 \n\
                 ## Standard Workflow\n\
                 ```\n\
                 1. list_workflows      → pick a workflow id\n\
                 2. get_workflow        → see which parameters its steps require\n\
                 3. execute_workflow    → run it with a parameter bag\n\
                 4. get_workflow_status → inspect results or the failing step\n\
                 ```\n\
                 \n\
                 ## Tips\n\
                 - A missing parameter fails the run at the step that needs it; the error names both.\n\
                 - Use background=true for long runs, then poll get_workflow_status or cancel_workflow.\n\
                 - Steps without a live integration return simulated results marked `simulated: true`.\n\
                 - SaaS tools (Slack, Zoom, QuickBooks, ...) need connect_tool before call_tool_action reaches them."
                    .into(),
            ),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        Ok(self.get_info())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let base = api_base();
    let client = Client::new();

    match client.get(format!("{}/api/health", base)).send().await {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Officeflow API reachable at {}", base);
        }
        Ok(resp) => {
            eprintln!("Officeflow API returned HTTP {}: {}", resp.status(), base);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Officeflow API not reachable at {}: {}", base, e);
            eprintln!("Start officeflow with [server] enabled in config.toml (default port 38480).");
            std::process::exit(1);
        }
    }

    let server = OfficeflowMcpServer::new();
    let transport = tokio::io::join(tokio::io::stdin(), tokio::io::stdout());
    let service = server.serve(transport).await?;
    service.waiting().await?;
    Ok(())
}
