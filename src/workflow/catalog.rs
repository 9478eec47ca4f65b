//! Workflow catalog: registered definitions with their resolved step routes.

use crate::error::{OfficeflowError, Result};
use crate::tools::{ToolIntegration, ToolRegistry};
use crate::workflow::handlers::{ActionHandler, HandlerTable};
use crate::workflow::schema::{StepDefinition, WorkflowDefinition, WorkflowSummary};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Where a step's action is dispatched, fixed when the workflow is registered.
#[derive(Clone)]
pub enum StepRoute {
    Builtin(Arc<dyn ActionHandler>),
    Tool(Arc<ToolIntegration>),
    /// Neither a handler nor an integration knows the action.
    Simulated,
}

impl fmt::Debug for StepRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepRoute::Builtin(_) => f.write_str("Builtin"),
            StepRoute::Tool(tool) => write!(f, "Tool({})", tool.id),
            StepRoute::Simulated => f.write_str("Simulated"),
        }
    }
}

/// A registered workflow. `routes[i]` belongs to `definition.steps[i]`.
#[derive(Debug)]
pub struct RegisteredWorkflow {
    pub definition: WorkflowDefinition,
    pub routes: Vec<StepRoute>,
}

impl RegisteredWorkflow {
    pub fn steps(&self) -> impl Iterator<Item = (&StepDefinition, &StepRoute)> + '_ {
        self.definition.steps.iter().zip(self.routes.iter())
    }
}

/// Registry of workflow definitions, kept in registration order.
pub struct WorkflowCatalog {
    handlers: Arc<HandlerTable>,
    tools: Arc<ToolRegistry>,
    workflows: Vec<Arc<RegisteredWorkflow>>,
}

impl WorkflowCatalog {
    pub fn new(handlers: Arc<HandlerTable>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            handlers,
            tools,
            workflows: Vec::new(),
        }
    }

    /// Catalog pre-populated with the built-in office workflows.
    pub fn with_builtin_workflows(
        handlers: Arc<HandlerTable>,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self> {
        let mut catalog = Self::new(handlers, tools);
        for def in builtin_workflows() {
            catalog.register(def)?;
        }
        Ok(catalog)
    }

    /// Add a workflow, replacing any existing one with the same id.
    pub fn register(&mut self, definition: WorkflowDefinition) -> Result<()> {
        validate_definition(&definition)?;

        let routes = definition
            .steps
            .iter()
            .map(|step| self.resolve_route(&step.action))
            .collect();
        let registered = Arc::new(RegisteredWorkflow { definition, routes });

        match self
            .workflows
            .iter_mut()
            .find(|w| w.definition.id == registered.definition.id)
        {
            Some(slot) => {
                tracing::debug!("Replacing workflow {}", registered.definition.id);
                *slot = registered;
            }
            None => self.workflows.push(registered),
        }
        Ok(())
    }

    fn resolve_route(&self, action: &str) -> StepRoute {
        if let Some(handler) = self.handlers.get(action) {
            return StepRoute::Builtin(handler);
        }
        match self.tools.find_by_action(action) {
            Some(tool) => StepRoute::Tool(tool),
            None => StepRoute::Simulated,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<RegisteredWorkflow>> {
        self.workflows
            .iter()
            .find(|w| w.definition.id == id)
            .cloned()
    }

    pub fn definition(&self, id: &str) -> Option<WorkflowDefinition> {
        self.get(id).map(|w| w.definition.clone())
    }

    /// Summaries in registration order. Each call starts a fresh pass.
    pub fn list(&self) -> impl Iterator<Item = WorkflowSummary> + '_ {
        self.workflows
            .iter()
            .map(|w| WorkflowSummary::from(&w.definition))
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }
}

/// Structural checks applied before a definition is registered.
pub fn validate_definition(def: &WorkflowDefinition) -> Result<()> {
    if def.id.trim().is_empty() {
        return Err(OfficeflowError::Validation("Workflow id is empty".to_string()));
    }
    if def.steps.is_empty() {
        return Err(OfficeflowError::Validation(format!(
            "Workflow {} has no steps",
            def.id
        )));
    }

    let mut seen = HashSet::new();
    for (i, step) in def.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            return Err(OfficeflowError::Validation(format!(
                "Workflow {}: step {} has an empty id",
                def.id, i
            )));
        }
        if step.action.trim().is_empty() {
            return Err(OfficeflowError::Validation(format!(
                "Workflow {}: step {} has an empty action",
                def.id, step.id
            )));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(OfficeflowError::Validation(format!(
                "Workflow {}: duplicate step id {}",
                def.id, step.id
            )));
        }
    }
    Ok(())
}

fn workflow(id: &str, name: &str, description: &str, steps: Vec<StepDefinition>) -> WorkflowDefinition {
    WorkflowDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        steps,
    }
}

/// The five office workflows available out of the box.
pub fn builtin_workflows() -> Vec<WorkflowDefinition> {
    type S = StepDefinition;
    vec![
        workflow(
            "email_automation",
            "Email Automation",
            "Automate email composition, sending, and tracking",
            vec![
                S::new("compose", "compose_email", &["recipient", "subject", "content"], &["email_data"]),
                S::new("validate", "validate_email", &["email_data"], &["validated_email"]),
                S::new("send", "send_email", &["validated_email"], &["email_id"]),
                S::new("track", "track_delivery", &["email_id"], &[]),
            ],
        ),
        workflow(
            "document_generation",
            "Document Generation",
            "Generate documents from templates and data",
            vec![
                S::new("template", "select_template", &["document_type"], &["template"]),
                S::new("populate", "populate_data", &["template", "data"], &["populated_document"]),
                S::new("format", "format_document", &["populated_document"], &["formatted_document"]),
                S::new("export", "export_document", &["formatted_document", "format"], &[]),
            ],
        ),
        workflow(
            "meeting_management",
            "Meeting Management",
            "Schedule and manage meetings end-to-end",
            vec![
                S::new(
                    "schedule",
                    "schedule_meeting",
                    &["attendees", "datetime", "agenda"],
                    &["meeting_data", "meeting_id"],
                ),
                S::new("invite", "send_invitations", &["meeting_data"], &[]),
                S::new("prepare", "prepare_materials", &["agenda", "documents"], &[]),
                S::new("conduct", "facilitate_meeting", &["meeting_id"], &["minutes", "action_items"]),
                S::new("followup", "send_followup", &["minutes", "action_items"], &[]),
            ],
        ),
        workflow(
            "project_tracking",
            "Project Tracking",
            "Track project progress and generate reports",
            vec![
                S::new("initialize", "create_project", &["project_data"], &["project_id"]),
                S::new("assign", "assign_tasks", &["project_id", "team_members"], &[]),
                S::new("monitor", "track_progress", &["project_id"], &["progress_data"]),
                S::new("report", "generate_status_report", &["progress_data"], &["report"]),
                S::new("notify", "send_notifications", &["stakeholders", "report"], &[]),
            ],
        ),
        workflow(
            "financial_analysis",
            "Financial Analysis",
            "Analyze financial data and generate insights",
            vec![
                S::new("collect", "gather_financial_data", &["data_sources"], &["raw_data"]),
                S::new("validate", "validate_data", &["raw_data"], &["validated_data"]),
                S::new(
                    "analyze",
                    "perform_analysis",
                    &["validated_data", "analysis_type"],
                    &["analysis_results", "insights"],
                ),
                S::new("visualize", "create_charts", &["analysis_results"], &["charts"]),
                S::new("report", "generate_financial_report", &["charts", "insights"], &[]),
            ],
        ),
    ]
}
