//! Workflow data structures and serialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A workflow definition: a named, ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepDefinition>,
}

/// A single step in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepDefinition {
    /// Unique within the workflow; the step's result is stored under it.
    pub id: String,
    /// Name of the handler or tool action that executes the step.
    pub action: String,
    /// Names that must be present in the caller's parameters or produced by
    /// an earlier step before this step may run.
    #[serde(default)]
    pub required: Vec<String>,
    /// Names under which this step's result is exported to later steps.
    #[serde(default)]
    pub provides: Vec<String>,
}

impl StepDefinition {
    pub fn new(id: &str, action: &str, required: &[&str], provides: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            action: action.to_string(),
            required: required.iter().map(|s| s.to_string()).collect(),
            provides: provides.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Discovery view of a registered workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub step_count: usize,
}

impl From<&WorkflowDefinition> for WorkflowSummary {
    fn from(def: &WorkflowDefinition) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            step_count: def.steps.len(),
        }
    }
}

/// Execution status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// One timestamped line of an execution's log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// A workflow execution instance.
///
/// `current_step` only moves forward, `results` only grows, and `status`
/// leaves `Running` at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub current_step: usize,
    /// Caller-supplied parameter bag.
    pub parameters: HashMap<String, serde_json::Value>,
    /// Step id -> step result.
    pub results: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub logs: Vec<LogEntry>,
}

impl Execution {
    /// Create a new running execution.
    pub fn new(workflow_id: String, parameters: HashMap<String, serde_json::Value>) -> Self {
        Self {
            id: format!("exec_{}", uuid::Uuid::new_v4().simple()),
            workflow_id,
            status: ExecutionStatus::Running,
            current_step: 0,
            parameters,
            results: HashMap::new(),
            started_at: Utc::now(),
            ended_at: None,
            error: None,
            logs: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// Move to step `index`; never moves backwards.
    pub fn advance_to(&mut self, index: usize) {
        self.current_step = self.current_step.max(index);
    }

    /// Store a step result. An existing entry is kept.
    pub fn record_result(&mut self, step_id: &str, value: serde_json::Value) {
        self.results.entry(step_id.to_string()).or_insert(value);
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Running -> Completed. Returns false if already terminal.
    pub fn complete(&mut self) -> bool {
        self.finish(ExecutionStatus::Completed, None)
    }

    /// Running -> Failed. Returns false if already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        self.finish(ExecutionStatus::Failed, Some(error.into()))
    }

    /// Running -> Cancelled. Returns false if already terminal.
    pub fn cancel(&mut self) -> bool {
        self.finish(ExecutionStatus::Cancelled, None)
    }

    fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.ended_at = Some(Utc::now());
        true
    }
}
