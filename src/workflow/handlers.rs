//! Built-in step handlers and the action → handler table.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Error raised by a step handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// Read-only view of everything a step may consume.
pub struct StepContext<'a> {
    pub step_id: &'a str,
    pub action: &'a str,
    /// Caller-supplied parameters.
    pub parameters: &'a HashMap<String, Value>,
    /// Results of completed steps, keyed by step id.
    pub results: &'a HashMap<String, Value>,
    /// Values exported by completed steps through `provides`.
    pub exports: &'a HashMap<String, Value>,
}

impl<'a> StepContext<'a> {
    /// Look up a name: exports first, then step results, then caller parameters.
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.exports
            .get(name)
            .or_else(|| self.results.get(name))
            .or_else(|| self.parameters.get(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get_str(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(|v| v.as_str())
    }

    /// Caller parameters overlaid with exported values.
    pub fn merged_parameters(&self) -> Map<String, Value> {
        let mut merged: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in self.exports {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    fn value_or_null(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Null)
    }
}

/// A step implementation bound to an action name.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, ctx: &StepContext<'_>) -> Result<Value, HandlerError>;
}

/// Action name → handler.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in office handlers.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        table.register("compose_email", ComposeEmail);
        table.register("send_email", SendEmail);
        table.register("schedule_meeting", ScheduleMeeting);
        table.register("create_document", CreateDocument);
        table.register("generate_report", GenerateReport);
        table.register("analyze_data", AnalyzeData);
        table
    }

    pub fn register(&mut self, action: &str, handler: impl ActionHandler + 'static) {
        self.handlers.insert(action.to_string(), Arc::new(handler));
    }

    pub fn get(&self, action: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(action).cloned()
    }

    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Utc::now().timestamp_millis())
}

fn require_str<'a>(ctx: &StepContext<'a>, name: &str) -> Result<&'a str, HandlerError> {
    match ctx.get(name) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(HandlerError(format!("{} must be a string", name))),
        None => Err(HandlerError(format!("{} is required", name))),
    }
}

/// Replace every `{key}` in `template` with the matching parameter.
pub fn apply_email_template(template: &str, parameters: &Map<String, Value>) -> String {
    let mut content = template.to_string();
    for (key, value) in parameters {
        let replacement = match value {
            Value::String(s) => s.clone(),
            v => v.to_string(),
        };
        content = content.replace(&format!("{{{}}}", key), &replacement);
    }
    content
}

struct ComposeEmail;

#[async_trait]
impl ActionHandler for ComposeEmail {
    async fn handle(&self, ctx: &StepContext<'_>) -> Result<Value, HandlerError> {
        let recipient = require_str(ctx, "recipient")?;
        let subject = require_str(ctx, "subject")?;

        let content = match ctx.get_str("template") {
            Some(template) => apply_email_template(template, &ctx.merged_parameters()),
            None => require_str(ctx, "content")?.to_string(),
        };

        Ok(json!({
            "recipient": recipient,
            "subject": subject,
            "content": content,
            "timestamp": timestamp(),
            "status": "composed",
        }))
    }
}

struct SendEmail;

#[async_trait]
impl ActionHandler for SendEmail {
    async fn handle(&self, ctx: &StepContext<'_>) -> Result<Value, HandlerError> {
        // Prefer the composed message over raw parameters.
        let composed = ctx
            .results
            .get("compose")
            .or_else(|| ctx.get("email_data"))
            .and_then(|v| v.as_object());

        let field = |name: &str| match composed.and_then(|email| email.get(name)) {
            Some(v) => v.clone(),
            None => ctx.value_or_null(name),
        };

        let recipient = field("recipient");
        if recipient.is_null() {
            return Err(HandlerError("No recipient to send the email to".to_string()));
        }

        let message_id = generate_id("msg");
        Ok(json!({
            "success": true,
            "message_id": message_id,
            "email_id": message_id,
            "recipient": recipient,
            "subject": field("subject"),
            "sent_at": timestamp(),
            "status": "sent",
        }))
    }
}

struct ScheduleMeeting;

#[async_trait]
impl ActionHandler for ScheduleMeeting {
    async fn handle(&self, ctx: &StepContext<'_>) -> Result<Value, HandlerError> {
        let attendees = ctx.value_or_null("attendees");
        if attendees.as_array().map(|a| a.is_empty()).unwrap_or(false) {
            return Err(HandlerError("attendees must not be empty".to_string()));
        }

        Ok(json!({
            "meeting_id": generate_id("mtg"),
            "title": ctx.get_str("title").unwrap_or("Scheduled Meeting"),
            "attendees": attendees,
            "datetime": ctx.value_or_null("datetime"),
            "agenda": ctx.value_or_null("agenda"),
            "status": "scheduled",
            "created_at": timestamp(),
        }))
    }
}

struct CreateDocument;

#[async_trait]
impl ActionHandler for CreateDocument {
    async fn handle(&self, ctx: &StepContext<'_>) -> Result<Value, HandlerError> {
        let format = ctx.get_str("format").unwrap_or("pdf");
        let id = generate_id("doc");
        Ok(json!({
            "document_id": id,
            "template": ctx.value_or_null("template"),
            "format": format,
            "created_at": timestamp(),
            "status": "created",
            "download_url": format!("https://docs.example.com/{}.{}", id, format),
        }))
    }
}

struct GenerateReport;

#[async_trait]
impl ActionHandler for GenerateReport {
    async fn handle(&self, ctx: &StepContext<'_>) -> Result<Value, HandlerError> {
        let format = ctx.get_str("format").unwrap_or("pdf");
        let id = generate_id("rpt");
        Ok(json!({
            "report_id": id,
            "type": ctx.value_or_null("report_type"),
            "format": format,
            "generated_at": timestamp(),
            "status": "generated",
            "download_url": format!("https://reports.example.com/{}.{}", id, format),
        }))
    }
}

struct AnalyzeData;

#[async_trait]
impl ActionHandler for AnalyzeData {
    async fn handle(&self, ctx: &StepContext<'_>) -> Result<Value, HandlerError> {
        Ok(json!({
            "analysis_id": generate_id("ana"),
            "data_source": ctx.value_or_null("data_source"),
            "type": ctx.value_or_null("analysis_type"),
            "metrics": ctx.value_or_null("metrics"),
            "results": {
                "summary": "Analysis completed successfully",
                "insights": ["Key insight 1", "Key insight 2", "Key insight 3"],
                "recommendations": ["Recommendation 1", "Recommendation 2"],
            },
            "completed_at": timestamp(),
        }))
    }
}
