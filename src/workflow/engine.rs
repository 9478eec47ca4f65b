//! Engine facade: the public surface used by the HTTP API and embedders.

use crate::config::AppConfig;
use crate::error::{OfficeflowError, Result};
use crate::tools::{ToolActionResult, ToolClient, ToolConnection, ToolManager, ToolRegistry, ToolSummary};
use crate::workflow::catalog::WorkflowCatalog;
use crate::workflow::executor::WorkflowExecutor;
use crate::workflow::handlers::HandlerTable;
use crate::workflow::loader;
use crate::workflow::schema::{Execution, WorkflowDefinition, WorkflowSummary};
use crate::workflow::tracker::{ExecutionEvent, ExecutionTracker};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Catalog, executor, tracker and tool manager wired together.
#[derive(Clone)]
pub struct WorkflowEngine {
    catalog: Arc<WorkflowCatalog>,
    tracker: Arc<ExecutionTracker>,
    tools: Arc<ToolManager>,
    executor: WorkflowExecutor,
}

impl WorkflowEngine {
    pub fn new(catalog: WorkflowCatalog, tool_client: ToolClient) -> Self {
        let tools = Arc::new(ToolManager::new(Arc::clone(catalog.tools()), tool_client));
        let catalog = Arc::new(catalog);
        let tracker = Arc::new(ExecutionTracker::new());
        let executor = WorkflowExecutor::new(
            Arc::clone(&catalog),
            Arc::clone(&tracker),
            Arc::clone(&tools),
        );
        Self {
            catalog,
            tracker,
            tools,
            executor,
        }
    }

    /// Built-in workflows and tools, no network access.
    pub fn builtin() -> Result<Self> {
        let catalog = WorkflowCatalog::with_builtin_workflows(
            Arc::new(HandlerTable::builtin()),
            Arc::new(ToolRegistry::builtin()),
        )?;
        Ok(Self::new(catalog, ToolClient::simulated()))
    }

    /// Engine configured from `config`: tool credentials, live calls and
    /// the workflows directory.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut catalog = WorkflowCatalog::with_builtin_workflows(
            Arc::new(HandlerTable::builtin()),
            Arc::new(ToolRegistry::from_config(config)),
        )?;

        match loader::workflows_dir(config) {
            Ok(dir) => {
                loader::load_into(&mut catalog, &dir)?;
            }
            Err(e) => tracing::warn!("Skipping user workflows: {}", e),
        }

        Ok(Self::new(catalog, ToolClient::new(config)?))
    }

    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        self.catalog.list().collect()
    }

    pub fn get_workflow(&self, id: &str) -> Result<WorkflowDefinition> {
        self.catalog
            .definition(id)
            .ok_or_else(|| OfficeflowError::WorkflowNotFound(id.to_string()))
    }

    /// Run a workflow to completion.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<Execution> {
        self.executor.execute(workflow_id, parameters).await
    }

    /// Run a workflow in the background; returns the execution id at once.
    pub fn start_workflow(
        &self,
        workflow_id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<String> {
        self.executor.spawn(workflow_id, parameters)
    }

    pub fn get_workflow_status(&self, execution_id: &str) -> Result<Execution> {
        self.tracker
            .get_status(execution_id)
            .ok_or_else(|| OfficeflowError::ExecutionNotFound(execution_id.to_string()))
    }

    pub fn cancel_workflow(&self, execution_id: &str) -> bool {
        self.tracker.cancel(execution_id)
    }

    pub fn list_active_workflows(&self) -> Vec<Execution> {
        self.tracker.list_active()
    }

    pub fn list_executions(&self) -> Vec<Execution> {
        self.tracker.list_all()
    }

    pub fn list_tools(&self) -> Vec<ToolSummary> {
        self.tools.list(None)
    }

    pub fn list_tools_by_category(&self, category: &str) -> Vec<ToolSummary> {
        self.tools.list(Some(category))
    }

    /// Call one tool action directly, outside any workflow.
    pub async fn invoke_tool(
        &self,
        tool_id: &str,
        action: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<ToolActionResult> {
        let parameters: Map<String, Value> = parameters.into_iter().collect();
        self.tools.invoke(tool_id, action, &parameters).await
    }

    pub fn connect_tool(&self, tool_id: &str, token: &str) -> Result<ToolConnection> {
        self.tools.connect(tool_id, token)
    }

    pub fn disconnect_tool(&self, tool_id: &str) -> bool {
        self.tools.disconnect(tool_id)
    }

    pub fn is_tool_connected(&self, tool_id: &str) -> bool {
        self.tools.is_connected(tool_id)
    }

    pub fn connected_tools(&self) -> Vec<String> {
        self.tools.connected_tools()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tracker.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_loads_workflows_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("standup.json"),
            r#"{"id":"standup","name":"Standup","steps":[{"id":"post","action":"send_slack_message","required":["channel"]}]}"#,
        )
        .unwrap();

        let config = AppConfig {
            workflows_dir: Some(dir.path().to_path_buf()),
            ..AppConfig::default()
        };
        let engine = WorkflowEngine::from_config(&config).unwrap();
        assert_eq!(engine.list_workflows().len(), 6);
        assert_eq!(engine.get_workflow("standup").unwrap().steps[0].action, "send_slack_message");
    }

    #[test]
    fn test_lookup_errors() {
        let engine = WorkflowEngine::builtin().unwrap();
        assert!(matches!(
            engine.get_workflow("nope"),
            Err(OfficeflowError::WorkflowNotFound(_))
        ));
        assert!(matches!(
            engine.get_workflow_status("exec_nope"),
            Err(OfficeflowError::ExecutionNotFound(_))
        ));
        assert!(!engine.cancel_workflow("exec_nope"));
        assert_eq!(engine.list_tools().len(), 14);
    }

    #[tokio::test]
    async fn test_direct_tool_calls_and_connections() {
        let engine = WorkflowEngine::builtin().unwrap();
        assert_eq!(engine.list_tools_by_category("storage").len(), 2);

        engine.connect_tool("google_workspace", "ya29.token").unwrap();
        assert!(engine.is_tool_connected("google_workspace"));
        assert_eq!(engine.connected_tools(), vec!["google_workspace"]);
        assert!(engine
            .list_tools()
            .iter()
            .any(|t| t.id == "google_workspace" && t.connected));

        let params: HashMap<String, Value> =
            [("to".to_string(), Value::from("a@b.com"))].into();
        let out = engine
            .invoke_tool("google_workspace", "send_gmail", params)
            .await
            .unwrap();
        assert_eq!(out.tool, "Google Workspace");
        assert_eq!(out.result["parameters"]["to"], "a@b.com");

        assert!(matches!(
            engine.invoke_tool("google_workspace", "send_fax", HashMap::new()).await,
            Err(OfficeflowError::ActionNotFound { .. })
        ));
        assert!(engine.disconnect_tool("google_workspace"));
        assert!(engine.connected_tools().is_empty());
    }
}
