//! External tool stub layer: named integrations with fixed action lists.
//!
//! Integrations are registered once at startup and never mutated. Calls go
//! through [`ToolClient`], which either reaches the integration's endpoint or
//! synthesizes a success payload.

pub mod client;
pub mod manager;
pub mod simulate;

use crate::config::AppConfig;
use serde::Serialize;
use std::sync::Arc;

pub use client::{SimulationReason, ToolClient, ToolOutcome};
pub use manager::{ToolActionResult, ToolConnection, ToolManager};

/// A named external-system integration.
#[derive(Debug, Clone)]
pub struct ToolIntegration {
    pub id: String,
    pub name: String,
    pub category: String,
    pub actions: Vec<String>,
    /// Absolute URL, or a path resolved against `tools.base_url`.
    pub endpoint: String,
    /// Direct calls need a connection first.
    pub auth_required: bool,
    auth_token: Option<String>,
}

impl ToolIntegration {
    pub fn new(id: &str, name: &str, category: &str, actions: &[&str], endpoint: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            endpoint: endpoint.to_string(),
            auth_required: false,
            auth_token: None,
        }
    }

    pub fn requiring_auth(mut self) -> Self {
        self.auth_required = true;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn supports(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    /// Token for the Authorization header. Falls back to a placeholder when
    /// no API key is configured for this tool.
    pub fn authenticate(&self) -> String {
        self.auth_token
            .clone()
            .unwrap_or_else(|| format!("{}_auth_token_placeholder", self.id))
    }

    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            actions: self.actions.clone(),
            endpoint: self.endpoint.clone(),
            authenticated: self.auth_token.is_some(),
            auth_required: self.auth_required,
            connected: false,
        }
    }
}

/// Serializable view of a tool integration.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ToolSummary {
    pub id: String,
    pub name: String,
    pub category: String,
    pub actions: Vec<String>,
    pub endpoint: String,
    /// An API key is configured for this tool.
    pub authenticated: bool,
    pub auth_required: bool,
    pub connected: bool,
}

/// Ordered registry of tool integrations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<ToolIntegration>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in integrations, without credentials.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for tool in builtin_integrations() {
            registry.register(tool);
        }
        registry
    }

    /// Built-in integrations with API keys taken from `services.<tool_id>`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();
        for tool in builtin_integrations() {
            let token = config
                .get_api_config(&tool.id)
                .ok()
                .and_then(|api| api.setting("api_key").map(str::to_string));
            match token {
                Some(token) => {
                    tracing::debug!("Using configured credentials for tool {}", tool.id);
                    registry.register(tool.with_auth_token(token));
                }
                None => registry.register(tool),
            }
        }
        registry
    }

    /// Add an integration; an existing one with the same id is replaced in place.
    pub fn register(&mut self, tool: ToolIntegration) {
        let tool = Arc::new(tool);
        match self.tools.iter_mut().find(|t| t.id == tool.id) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ToolIntegration>> {
        self.tools.iter().find(|t| t.id == id).cloned()
    }

    /// First integration (in registration order) that lists `action`.
    pub fn find_by_action(&self, action: &str) -> Option<Arc<ToolIntegration>> {
        self.tools.iter().find(|t| t.supports(action)).cloned()
    }

    pub fn list(&self) -> impl Iterator<Item = &ToolIntegration> + '_ {
        self.tools.iter().map(|t| t.as_ref())
    }

    /// Integrations in `category`, in registration order.
    pub fn by_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ToolIntegration> + 'a {
        self.list().filter(move |t| t.category == category)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn builtin_integrations() -> Vec<ToolIntegration> {
    vec![
        // Engine-level services
        ToolIntegration::new(
            "email_service",
            "Email Service",
            "communication",
            &["send_email", "schedule_email", "track_email"],
            "/api/email",
        ),
        ToolIntegration::new(
            "calendar_service",
            "Calendar Service",
            "scheduling",
            &["create_event", "update_event", "get_availability"],
            "/api/calendar",
        ),
        ToolIntegration::new(
            "document_processor",
            "Document Processor",
            "document",
            &["create_document", "convert_format", "extract_data"],
            "/api/documents",
        ),
        ToolIntegration::new(
            "spreadsheet_service",
            "Spreadsheet Service",
            "data",
            &["create_sheet", "update_data", "generate_chart"],
            "/api/spreadsheets",
        ),
        ToolIntegration::new(
            "file_storage",
            "File Storage",
            "storage",
            &["upload_file", "download_file", "share_file"],
            "/api/storage",
        ),
        ToolIntegration::new(
            "crm_service",
            "CRM Service",
            "customer",
            &["create_contact", "update_contact", "track_interaction"],
            "/api/crm",
        ),
        // SaaS suites
        ToolIntegration::new(
            "microsoft_office",
            "Microsoft Office Suite",
            "productivity",
            &[
                "create_word_document",
                "create_excel_spreadsheet",
                "create_powerpoint",
                "send_outlook_email",
            ],
            "https://graph.microsoft.com/v1.0",
        )
        .requiring_auth(),
        ToolIntegration::new(
            "google_workspace",
            "Google Workspace",
            "productivity",
            &[
                "create_google_doc",
                "create_google_sheet",
                "create_google_slides",
                "send_gmail",
                "schedule_calendar_event",
                "upload_to_drive",
            ],
            "https://www.googleapis.com/v1",
        )
        .requiring_auth(),
        ToolIntegration::new(
            "slack",
            "Slack",
            "communication",
            &[
                "send_slack_message",
                "create_slack_channel",
                "upload_slack_file",
                "schedule_slack_reminder",
            ],
            "https://slack.com/api",
        )
        .requiring_auth(),
        ToolIntegration::new(
            "trello",
            "Trello",
            "project_management",
            &[
                "create_trello_board",
                "create_trello_card",
                "update_trello_card",
                "move_trello_card",
            ],
            "https://api.trello.com/1",
        )
        .requiring_auth(),
        ToolIntegration::new(
            "zoom",
            "Zoom",
            "communication",
            &[
                "schedule_zoom_meeting",
                "start_zoom_meeting",
                "get_zoom_recordings",
            ],
            "https://api.zoom.us/v2",
        )
        .requiring_auth(),
        ToolIntegration::new(
            "dropbox",
            "Dropbox",
            "storage",
            &[
                "upload_to_dropbox",
                "share_dropbox_file",
                "create_dropbox_folder",
            ],
            "https://api.dropboxapi.com/2",
        )
        .requiring_auth(),
        ToolIntegration::new(
            "quickbooks",
            "QuickBooks",
            "accounting",
            &[
                "create_quickbooks_invoice",
                "track_quickbooks_expense",
                "generate_financial_report",
            ],
            "https://sandbox-quickbooks.api.intuit.com/v3",
        )
        .requiring_auth(),
        ToolIntegration::new(
            "salesforce",
            "Salesforce",
            "crm",
            &[
                "create_salesforce_lead",
                "update_salesforce_opportunity",
                "create_salesforce_contact",
            ],
            "https://your-instance.salesforce.com/services/data/v52.0",
        )
        .requiring_auth(),
    ]
}
