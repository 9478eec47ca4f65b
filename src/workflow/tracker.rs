//! In-memory execution table, with a broadcast of every change.

use crate::workflow::schema::{Execution, ExecutionStatus};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Maximum number of events buffered per subscriber.
const CHANNEL_CAPACITY: usize = 256;

/// Execution change pushed to subscribers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionEvent {
    Started {
        execution_id: String,
        workflow_id: String,
    },
    StepStarted {
        execution_id: String,
        step_index: usize,
        step_id: String,
    },
    Log {
        execution_id: String,
        message: String,
    },
    Finished {
        execution_id: String,
        status: ExecutionStatus,
        error: Option<String>,
    },
    /// Keep-alive for idle WebSocket clients.
    Heartbeat,
}

struct TrackedExecution {
    execution: Execution,
    cancel: CancellationToken,
}

/// Owns every execution started in this process.
///
/// Executions are only mutated by their driver and by [`cancel`](Self::cancel);
/// readers always get a cloned snapshot.
pub struct ExecutionTracker {
    executions: RwLock<HashMap<String, TrackedExecution>>,
    events: broadcast::Sender<ExecutionEvent>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            executions: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    /// Create and store a running execution. Returns its id and cancellation token.
    pub fn start(
        &self,
        workflow_id: &str,
        parameters: HashMap<String, Value>,
    ) -> (String, CancellationToken) {
        let mut execution = Execution::new(workflow_id.to_string(), parameters);
        execution.log(format!("Started workflow {}", workflow_id));
        let id = execution.id.clone();
        let cancel = CancellationToken::new();

        self.executions.write().insert(
            id.clone(),
            TrackedExecution {
                execution,
                cancel: cancel.clone(),
            },
        );

        tracing::info!("Execution {} started for workflow {}", id, workflow_id);
        self.emit(ExecutionEvent::Started {
            execution_id: id.clone(),
            workflow_id: workflow_id.to_string(),
        });
        (id, cancel)
    }

    fn update<R>(&self, id: &str, f: impl FnOnce(&mut TrackedExecution) -> R) -> Option<R> {
        self.executions.write().get_mut(id).map(f)
    }

    /// Like `update`, but only while the execution is still running.
    fn update_running<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut TrackedExecution) -> R,
    ) -> Option<R> {
        self.executions
            .write()
            .get_mut(id)
            .filter(|t| t.execution.is_running())
            .map(f)
    }

    pub fn advance(&self, id: &str, index: usize, step_id: &str) {
        if self.update_running(id, |t| t.execution.advance_to(index)).is_some() {
            self.emit(ExecutionEvent::StepStarted {
                execution_id: id.to_string(),
                step_index: index,
                step_id: step_id.to_string(),
            });
        }
    }

    /// Store a step result. Ignored once the execution has finished.
    pub fn record_result(&self, id: &str, step_id: &str, value: Value) {
        self.update_running(id, |t| t.execution.record_result(step_id, value));
    }

    /// Append a log entry. Ignored once the execution has finished.
    pub fn log(&self, id: &str, message: impl Into<String>) {
        let message = message.into();
        if self
            .update_running(id, |t| t.execution.log(message.clone()))
            .is_some()
        {
            self.emit(ExecutionEvent::Log {
                execution_id: id.to_string(),
                message,
            });
        }
    }

    /// Running -> Completed. False if the execution already left `running`.
    pub fn complete(&self, id: &str) -> bool {
        let done = self
            .update(id, |t| {
                let done = t.execution.complete();
                if done {
                    t.execution.log("Workflow completed successfully");
                }
                done
            })
            .unwrap_or(false);
        if done {
            self.emit_finished(id, ExecutionStatus::Completed, None);
        }
        done
    }

    /// Running -> Failed. False if the execution already left `running`.
    pub fn fail(&self, id: &str, error: &str) -> bool {
        let done = self
            .update(id, |t| {
                let done = t.execution.fail(error);
                if done {
                    t.execution.log(format!("Workflow failed: {}", error));
                }
                done
            })
            .unwrap_or(false);
        if done {
            self.emit_finished(id, ExecutionStatus::Failed, Some(error.to_string()));
        }
        done
    }

    /// Running -> Cancelled and fire the cancellation token.
    ///
    /// Returns false, changing nothing, when the execution is unknown or not running.
    pub fn cancel(&self, id: &str) -> bool {
        let done = self
            .update(id, |t| {
                let done = t.execution.cancel();
                if done {
                    t.execution.log("Workflow cancelled by user");
                    t.cancel.cancel();
                }
                done
            })
            .unwrap_or(false);
        if done {
            tracing::info!("Execution {} cancelled", id);
            self.emit_finished(id, ExecutionStatus::Cancelled, None);
        }
        done
    }

    fn emit_finished(&self, id: &str, status: ExecutionStatus, error: Option<String>) {
        self.emit(ExecutionEvent::Finished {
            execution_id: id.to_string(),
            status,
            error,
        });
    }

    /// Snapshot of one execution.
    pub fn get_status(&self, id: &str) -> Option<Execution> {
        self.executions.read().get(id).map(|t| t.execution.clone())
    }

    /// Every execution still running, oldest first.
    pub fn list_active(&self) -> Vec<Execution> {
        self.collect(|e| e.is_running())
    }

    /// Every retained execution, oldest first.
    pub fn list_all(&self) -> Vec<Execution> {
        self.collect(|_| true)
    }

    fn collect(&self, keep: impl Fn(&Execution) -> bool) -> Vec<Execution> {
        let mut list: Vec<Execution> = self
            .executions
            .read()
            .values()
            .map(|t| &t.execution)
            .filter(|e| keep(e))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        list
    }
}

impl Default for ExecutionTracker {
    fn default() -> Self {
        Self::new()
    }
}
