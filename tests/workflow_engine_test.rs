//! Integration tests for the workflow engine.
//! Built-in workflow runs, parameter validation, failure bookkeeping,
//! cancellation, tool fallback and the event stream.

use async_trait::async_trait;
use officeflow_lib::config::{AppConfig, FEATURE_LIVE_TOOL_CALLS};
use officeflow_lib::error::{OfficeflowError, StepError};
use officeflow_lib::tools::{ToolClient, ToolRegistry};
use officeflow_lib::workflow::{
    ActionHandler, ExecutionEvent, ExecutionStatus, HandlerError, HandlerTable, StepContext,
    StepDefinition, WorkflowCatalog, WorkflowDefinition, WorkflowEngine,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;

fn engine() -> WorkflowEngine {
    WorkflowEngine::builtin().unwrap()
}

fn params(value: Value) -> HashMap<String, Value> {
    serde_json::from_value(value).unwrap()
}

fn full_parameters(workflow_id: &str) -> HashMap<String, Value> {
    params(match workflow_id {
        "email_automation" => json!({
            "recipient": "dana@example.com",
            "subject": "Quarterly review",
            "content": "See you Monday.",
        }),
        "document_generation" => json!({
            "document_type": "invoice",
            "data": { "customer": "Acme", "amount": 1200 },
            "format": "pdf",
        }),
        "meeting_management" => json!({
            "attendees": ["a@example.com", "b@example.com"],
            "datetime": "2026-03-02T10:00:00Z",
            "agenda": "Roadmap",
            "documents": ["roadmap.pdf"],
        }),
        "project_tracking" => json!({
            "project_data": { "name": "Website relaunch" },
            "team_members": ["ana", "ben"],
            "stakeholders": ["cto@example.com"],
        }),
        "financial_analysis" => json!({
            "data_sources": ["ledger", "bank"],
            "analysis_type": "cash_flow",
        }),
        other => panic!("no fixture for {}", other),
    })
}

fn expect_step_error(result: Result<impl std::fmt::Debug, OfficeflowError>) -> (String, StepError) {
    match result {
        Err(OfficeflowError::ExecutionFailed {
            execution_id,
            source,
        }) => (execution_id, source),
        other => panic!("expected ExecutionFailed, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Built-in workflows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_every_builtin_workflow_completes() {
    let engine = engine();
    for summary in engine.list_workflows() {
        let exec = engine
            .execute_workflow(&summary.id, full_parameters(&summary.id))
            .await
            .unwrap_or_else(|e| panic!("{} failed: {}", summary.id, e));

        assert_eq!(exec.status, ExecutionStatus::Completed, "{}", summary.id);
        assert_eq!(exec.results.len(), summary.step_count, "{}", summary.id);
        assert_eq!(exec.current_step, summary.step_count - 1);
        assert!(exec.ended_at.is_some());
        assert!(exec.error.is_none());
    }
    assert!(engine.list_active_workflows().is_empty());
    assert_eq!(engine.list_executions().len(), 5);
}

#[tokio::test]
async fn test_email_automation_scenario() {
    let engine = engine();
    let exec = engine
        .execute_workflow("email_automation", full_parameters("email_automation"))
        .await
        .unwrap();

    for step in ["compose", "validate", "send", "track"] {
        assert!(exec.results.contains_key(step), "missing result for {}", step);
    }
    assert_eq!(exec.results["compose"]["content"], "See you Monday.");
    assert_eq!(exec.results["send"]["recipient"], "dana@example.com");
    assert_eq!(exec.results["send"]["status"], "sent");
    // Simulated steps are marked as such.
    assert_eq!(exec.results["validate"]["simulated"], true);
    // track received the id exported by send.
    assert_eq!(
        exec.results["track"]["parameters"]["email_id"],
        exec.results["send"]["email_id"]
    );

    let messages: Vec<&str> = exec.logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages[1], "Executing step: compose");
    assert!(messages.contains(&"Step compose completed successfully"));
    assert!(messages.contains(&"Step track completed successfully"));

    let status = engine.get_workflow_status(&exec.id).unwrap();
    assert_eq!(status, exec);
}

#[tokio::test]
async fn test_compose_email_template() {
    let engine = engine();
    let mut parameters = full_parameters("email_automation");
    parameters.insert("template".to_string(), json!("Hello {recipient}, re: {subject}"));

    let exec = engine
        .execute_workflow("email_automation", parameters)
        .await
        .unwrap();
    assert_eq!(
        exec.results["compose"]["content"],
        "Hello dana@example.com, re: Quarterly review"
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_meeting_without_attendees_fails_at_schedule() {
    let engine = engine();
    let mut parameters = full_parameters("meeting_management");
    parameters.remove("attendees");

    let (execution_id, err) =
        expect_step_error(engine.execute_workflow("meeting_management", parameters).await);
    assert_eq!(
        err,
        StepError::MissingParameter {
            step: "schedule".to_string(),
            param: "attendees".to_string(),
        }
    );

    let exec = engine.get_workflow_status(&execution_id).unwrap();
    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert_eq!(exec.current_step, 0);
    assert!(exec.results.is_empty());
    assert_eq!(
        exec.error.as_deref(),
        Some("Missing required parameter: attendees for step: schedule")
    );
    assert!(engine.list_active_workflows().is_empty());
}

#[tokio::test]
async fn test_missing_parameter_fails_at_later_step_and_keeps_partial_results() {
    let engine = engine();
    let mut parameters = full_parameters("meeting_management");
    parameters.remove("documents");

    let (execution_id, err) =
        expect_step_error(engine.execute_workflow("meeting_management", parameters).await);
    assert_eq!(err.to_string(), "Missing required parameter: documents for step: prepare");

    let exec = engine.get_workflow_status(&execution_id).unwrap();
    assert_eq!(exec.current_step, 2);
    let mut done: Vec<&str> = exec.results.keys().map(String::as_str).collect();
    done.sort_unstable();
    assert_eq!(done, vec!["invite", "schedule"]);
    assert!(exec.ended_at.is_some());
}

#[tokio::test]
async fn test_handler_error_fails_execution() {
    let engine = engine();
    let mut parameters = full_parameters("email_automation");
    parameters.insert("recipient".to_string(), json!(42));

    let (execution_id, err) =
        expect_step_error(engine.execute_workflow("email_automation", parameters).await);
    assert!(matches!(err, StepError::Handler { ref step, .. } if step == "compose"));
    assert_eq!(
        engine.get_workflow_status(&execution_id).unwrap().status,
        ExecutionStatus::Failed
    );
}

#[tokio::test]
async fn test_unknown_workflow_creates_no_execution() {
    let engine = engine();
    let result = engine.execute_workflow("does_not_exist", HashMap::new()).await;
    assert!(matches!(result, Err(OfficeflowError::WorkflowNotFound(ref id)) if id == "does_not_exist"));
    assert!(engine.list_executions().is_empty());
}

#[tokio::test]
async fn test_cancel_finished_execution_returns_false() {
    let engine = engine();
    let exec = engine
        .execute_workflow("project_tracking", full_parameters("project_tracking"))
        .await
        .unwrap();

    assert!(!engine.cancel_workflow(&exec.id));
    let after = engine.get_workflow_status(&exec.id).unwrap();
    assert_eq!(after.status, ExecutionStatus::Completed);
    assert_eq!(after.logs.len(), exec.logs.len());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Signals when it starts, then blocks far longer than any test runs.
struct SlowHandler {
    started: Arc<Notify>,
}

#[async_trait]
impl ActionHandler for SlowHandler {
    async fn handle(&self, _ctx: &StepContext<'_>) -> Result<Value, HandlerError> {
        self.started.notify_one();
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(json!({ "done": true }))
    }
}

fn slow_engine(started: Arc<Notify>) -> WorkflowEngine {
    let mut handlers = HandlerTable::builtin();
    handlers.register("wait_for_approval", SlowHandler { started });

    let mut catalog =
        WorkflowCatalog::new(Arc::new(handlers), Arc::new(ToolRegistry::builtin()));
    catalog
        .register(WorkflowDefinition {
            id: "approval".to_string(),
            name: "Approval".to_string(),
            description: String::new(),
            steps: vec![
                StepDefinition::new("approve", "wait_for_approval", &[], &[]),
                StepDefinition::new("notify", "send_email", &["recipient"], &[]),
            ],
        })
        .unwrap();
    WorkflowEngine::new(catalog, ToolClient::simulated())
}

#[tokio::test]
async fn test_cancel_interrupts_running_step() {
    let started = Arc::new(Notify::new());
    let engine = slow_engine(Arc::clone(&started));

    let runner = engine.clone();
    let run = tokio::spawn(async move {
        runner
            .execute_workflow("approval", params(json!({ "recipient": "a@b.com" })))
            .await
    });

    started.notified().await;
    let active = engine.list_active_workflows();
    assert_eq!(active.len(), 1);
    let id = active[0].id.clone();

    assert!(engine.cancel_workflow(&id));
    assert!(!engine.cancel_workflow(&id));

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("driver did not stop after cancel")
        .unwrap();
    let (execution_id, err) = expect_step_error(result);
    assert_eq!(execution_id, id);
    assert_eq!(err, StepError::Cancelled { step: "approve".to_string() });

    let exec = engine.get_workflow_status(&id).unwrap();
    assert_eq!(exec.status, ExecutionStatus::Cancelled);
    assert!(exec.results.is_empty());
    assert_eq!(exec.logs.last().unwrap().message, "Workflow cancelled by user");
    assert!(engine.list_active_workflows().is_empty());
}

/// Cancels the execution it runs in, then reports success anyway.
struct SelfCancellingHandler {
    engine: Arc<OnceLock<WorkflowEngine>>,
}

#[async_trait]
impl ActionHandler for SelfCancellingHandler {
    async fn handle(&self, _ctx: &StepContext<'_>) -> Result<Value, HandlerError> {
        let engine = self.engine.get().ok_or_else(|| HandlerError("no engine".into()))?;
        for exec in engine.list_active_workflows() {
            engine.cancel_workflow(&exec.id);
        }
        Ok(json!({ "approved": true }))
    }
}

#[tokio::test]
async fn test_step_finishing_after_cancel_is_not_recorded() {
    let slot = Arc::new(OnceLock::new());
    let mut handlers = HandlerTable::builtin();
    handlers.register(
        "approve_and_withdraw",
        SelfCancellingHandler {
            engine: Arc::clone(&slot),
        },
    );
    let mut catalog =
        WorkflowCatalog::new(Arc::new(handlers), Arc::new(ToolRegistry::builtin()));
    catalog
        .register(WorkflowDefinition {
            id: "withdrawn".to_string(),
            name: "Withdrawn".to_string(),
            description: String::new(),
            steps: vec![
                StepDefinition::new("approve", "approve_and_withdraw", &[], &[]),
                StepDefinition::new("notify", "send_email", &["recipient"], &[]),
            ],
        })
        .unwrap();
    let engine = WorkflowEngine::new(catalog, ToolClient::simulated());
    assert!(slot.set(engine.clone()).is_ok());

    let (execution_id, err) = expect_step_error(
        engine
            .execute_workflow("withdrawn", params(json!({ "recipient": "a@b.com" })))
            .await,
    );
    assert_eq!(err, StepError::Cancelled { step: "approve".to_string() });

    let exec = engine.get_workflow_status(&execution_id).unwrap();
    assert_eq!(exec.status, ExecutionStatus::Cancelled);
    assert!(exec.results.is_empty());
    let messages: Vec<&str> = exec.logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "Started workflow withdrawn",
            "Executing step: approve",
            "Workflow cancelled by user",
        ]
    );
}

#[tokio::test]
async fn test_background_start_returns_running_execution() {
    let started = Arc::new(Notify::new());
    let engine = slow_engine(Arc::clone(&started));

    let id = engine
        .start_workflow("approval", params(json!({ "recipient": "a@b.com" })))
        .unwrap();
    started.notified().await;
    assert!(engine.get_workflow_status(&id).unwrap().is_running());

    assert!(engine.cancel_workflow(&id));
    assert_eq!(
        engine.get_workflow_status(&id).unwrap().status,
        ExecutionStatus::Cancelled
    );
    assert!(matches!(
        engine.start_workflow("nope", HashMap::new()),
        Err(OfficeflowError::WorkflowNotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

fn calendar_engine(fallback: bool) -> WorkflowEngine {
    let mut config = AppConfig::default();
    config.features.insert(FEATURE_LIVE_TOOL_CALLS.to_string(), true);
    // Nothing listens on port 1.
    config.tools.base_url = "http://127.0.0.1:1".to_string();
    config.tools.timeout_secs = 2;
    config.tools.fallback_to_simulation = fallback;

    let mut catalog = WorkflowCatalog::new(
        Arc::new(HandlerTable::builtin()),
        Arc::new(ToolRegistry::builtin()),
    );
    catalog
        .register(WorkflowDefinition {
            id: "book_room".to_string(),
            name: "Book Room".to_string(),
            description: String::new(),
            steps: vec![StepDefinition::new("event", "create_event", &["title"], &[])],
        })
        .unwrap();
    WorkflowEngine::new(catalog, ToolClient::new(&config).unwrap())
}

#[tokio::test]
async fn test_failed_live_call_falls_back_and_is_logged() {
    let engine = calendar_engine(true);
    let exec = engine
        .execute_workflow("book_room", params(json!({ "title": "Standup" })))
        .await
        .unwrap();

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.results["event"]["simulated"], true);
    assert_eq!(exec.results["event"]["title"], "Standup");
    assert!(exec
        .logs
        .iter()
        .any(|l| l.message.starts_with("External call for step event failed")));
}

#[tokio::test]
async fn test_failed_live_call_without_fallback_fails_step() {
    let engine = calendar_engine(false);
    let (execution_id, err) = expect_step_error(
        engine
            .execute_workflow("book_room", params(json!({ "title": "Standup" })))
            .await,
    );
    assert!(matches!(err, StepError::ExternalCallFailed { ref tool, .. } if tool == "calendar_service"));
    assert_eq!(
        engine.get_workflow_status(&execution_id).unwrap().status,
        ExecutionStatus::Failed
    );
}

// ---------------------------------------------------------------------------
// Events and concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_event_stream_follows_execution() {
    let engine = engine();
    let mut rx = engine.subscribe();

    let exec = engine
        .execute_workflow("email_automation", full_parameters("email_automation"))
        .await
        .unwrap();

    let mut step_ids = Vec::new();
    loop {
        match rx.recv().await.unwrap() {
            ExecutionEvent::Started { execution_id, workflow_id } => {
                assert_eq!(execution_id, exec.id);
                assert_eq!(workflow_id, "email_automation");
            }
            ExecutionEvent::StepStarted { step_id, .. } => step_ids.push(step_id),
            ExecutionEvent::Finished { status, .. } => {
                assert_eq!(status, ExecutionStatus::Completed);
                break;
            }
            _ => {}
        }
    }
    assert_eq!(step_ids, vec!["compose", "validate", "send", "track"]);
}

#[tokio::test]
async fn test_concurrent_executions_are_independent() {
    let engine = engine();
    let runs = (0..8).map(|i| {
        let engine = engine.clone();
        async move {
            if i % 2 == 0 {
                engine
                    .execute_workflow("email_automation", full_parameters("email_automation"))
                    .await
                    .is_ok()
            } else {
                engine
                    .execute_workflow("meeting_management", HashMap::new())
                    .await
                    .is_ok()
            }
        }
    });
    let outcomes = futures::future::join_all(runs).await;
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 4);

    let all = engine.list_executions();
    assert_eq!(all.len(), 8);
    let completed = all
        .iter()
        .filter(|e| e.status == ExecutionStatus::Completed)
        .count();
    assert_eq!(completed, 4);
    assert!(engine.list_active_workflows().is_empty());
}
