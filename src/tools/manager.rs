//! Direct tool calls, outside any workflow, and per-tool connections.

use crate::error::{OfficeflowError, Result};
use crate::tools::{SimulationReason, ToolClient, ToolIntegration, ToolOutcome, ToolRegistry, ToolSummary};
use crate::tools::simulate::simulate_action;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// An established connection to a tool. The token is never serialized.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolConnection {
    pub tool_id: String,
    #[serde(skip_serializing)]
    token: String,
    pub connected_at: DateTime<Utc>,
    pub status: String,
}

/// Envelope returned by a direct tool call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolActionResult {
    pub success: bool,
    /// Display name of the tool.
    pub tool: String,
    pub action: String,
    pub result: Value,
    pub simulated: bool,
    pub timestamp: DateTime<Utc>,
}

/// Registry, HTTP client and connection table.
pub struct ToolManager {
    registry: Arc<ToolRegistry>,
    client: ToolClient,
    connections: RwLock<HashMap<String, ToolConnection>>,
}

impl ToolManager {
    pub fn new(registry: Arc<ToolRegistry>, client: ToolClient) -> Self {
        Self {
            registry,
            client,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn client(&self) -> &ToolClient {
        &self.client
    }

    fn lookup(&self, tool_id: &str) -> Result<Arc<ToolIntegration>> {
        self.registry
            .get(tool_id)
            .ok_or_else(|| OfficeflowError::ToolNotFound(tool_id.to_string()))
    }

    /// Summaries in registration order, optionally restricted to one category.
    pub fn list(&self, category: Option<&str>) -> Vec<ToolSummary> {
        let connections = self.connections.read();
        self.registry
            .list()
            .filter(|t| category.map_or(true, |c| t.category == c))
            .map(|t| ToolSummary {
                connected: connections.contains_key(&t.id),
                ..t.summary()
            })
            .collect()
    }

    /// Store a token for `tool_id`, replacing any earlier connection.
    pub fn connect(&self, tool_id: &str, token: &str) -> Result<ToolConnection> {
        let tool = self.lookup(tool_id)?;
        if token.trim().is_empty() {
            return Err(OfficeflowError::Validation(format!(
                "Auth token for {} is empty",
                tool.id
            )));
        }

        let connection = ToolConnection {
            tool_id: tool.id.clone(),
            token: token.to_string(),
            connected_at: Utc::now(),
            status: "connected".to_string(),
        };
        self.connections
            .write()
            .insert(tool.id.clone(), connection.clone());
        tracing::info!("Connected tool {}", tool.id);
        Ok(connection)
    }

    /// False when the tool was not connected.
    pub fn disconnect(&self, tool_id: &str) -> bool {
        let removed = self.connections.write().remove(tool_id).is_some();
        if removed {
            tracing::info!("Disconnected tool {}", tool_id);
        }
        removed
    }

    pub fn is_connected(&self, tool_id: &str) -> bool {
        self.connections.read().contains_key(tool_id)
    }

    /// Ids of connected tools, in registration order.
    pub fn connected_tools(&self) -> Vec<String> {
        let connections = self.connections.read();
        self.registry
            .list()
            .filter(|t| connections.contains_key(&t.id))
            .map(|t| t.id.clone())
            .collect()
    }

    /// `tool` with the connection token, if it has one, in place of its
    /// configured credentials.
    pub fn authorized(&self, tool: &ToolIntegration) -> ToolIntegration {
        match self.connections.read().get(&tool.id) {
            Some(conn) => tool.clone().with_auth_token(conn.token.clone()),
            None => tool.clone(),
        }
    }

    /// Call `action` on `tool_id` directly.
    ///
    /// Unknown tools and actions are errors. A tool that needs a connection
    /// but has none answers with a simulated result.
    pub async fn invoke(
        &self,
        tool_id: &str,
        action: &str,
        parameters: &Map<String, Value>,
    ) -> Result<ToolActionResult> {
        let tool = self.lookup(tool_id)?;
        if !tool.supports(action) {
            return Err(OfficeflowError::ActionNotFound {
                tool: tool.id.clone(),
                action: action.to_string(),
            });
        }

        let outcome = if tool.auth_required && !self.is_connected(&tool.id) {
            tracing::warn!(
                "Authentication required for {}. Please connect first. Using simulation.",
                tool.name
            );
            ToolOutcome::Simulated {
                value: simulate_action(Some(&tool.name), action, parameters),
                reason: SimulationReason::NotConnected,
            }
        } else {
            let tool = self.authorized(&tool);
            self.client
                .invoke(Some(&tool), action, parameters)
                .await
                .map_err(|e| OfficeflowError::ToolCallFailed(e.to_string()))?
        };

        Ok(ToolActionResult {
            success: true,
            tool: tool.name.clone(),
            action: action.to_string(),
            simulated: outcome.is_simulated(),
            result: outcome.into_value(),
            timestamp: Utc::now(),
        })
    }
}
