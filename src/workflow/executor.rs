//! Workflow executor: drives an execution through its steps in order.

use crate::error::{OfficeflowError, Result, StepError};
use crate::tools::{SimulationReason, ToolIntegration, ToolManager, ToolOutcome};
use crate::workflow::catalog::{RegisteredWorkflow, StepRoute, WorkflowCatalog};
use crate::workflow::handlers::StepContext;
use crate::workflow::schema::{Execution, StepDefinition};
use crate::workflow::tracker::ExecutionTracker;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs registered workflows and records progress in the tracker.
#[derive(Clone)]
pub struct WorkflowExecutor {
    catalog: Arc<WorkflowCatalog>,
    tracker: Arc<ExecutionTracker>,
    tools: Arc<ToolManager>,
}

/// An execution that has been created but not yet driven.
struct Pending {
    id: String,
    workflow: Arc<RegisteredWorkflow>,
    parameters: HashMap<String, Value>,
    cancel: CancellationToken,
}

impl WorkflowExecutor {
    pub fn new(
        catalog: Arc<WorkflowCatalog>,
        tracker: Arc<ExecutionTracker>,
        tools: Arc<ToolManager>,
    ) -> Self {
        Self {
            catalog,
            tracker,
            tools,
        }
    }

    fn begin(&self, workflow_id: &str, parameters: HashMap<String, Value>) -> Result<Pending> {
        let workflow = self
            .catalog
            .get(workflow_id)
            .ok_or_else(|| OfficeflowError::WorkflowNotFound(workflow_id.to_string()))?;
        let (id, cancel) = self.tracker.start(workflow_id, parameters.clone());
        Ok(Pending {
            id,
            workflow,
            parameters,
            cancel,
        })
    }

    /// Run a workflow to its end and return the final execution.
    ///
    /// A failed or cancelled run is returned as [`OfficeflowError::ExecutionFailed`];
    /// the execution itself stays inspectable through the tracker.
    pub async fn execute(
        &self,
        workflow_id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<Execution> {
        let pending = self.begin(workflow_id, parameters)?;
        self.drive(pending).await
    }

    /// Start a workflow in the background and return the execution id.
    pub fn spawn(&self, workflow_id: &str, parameters: HashMap<String, Value>) -> Result<String> {
        let pending = self.begin(workflow_id, parameters)?;
        let id = pending.id.clone();
        let executor = self.clone();
        tokio::spawn(async move {
            if let Err(e) = executor.drive(pending).await {
                tracing::warn!("{}", e);
            }
        });
        Ok(id)
    }

    async fn drive(&self, pending: Pending) -> Result<Execution> {
        let id = pending.id.as_str();
        let outcome = self
            .run_steps(id, &pending.workflow, &pending.parameters, &pending.cancel)
            .await;

        let outcome = match outcome {
            Ok(()) if self.tracker.complete(id) => {
                tracing::info!("Execution {} completed", id);
                Ok(())
            }
            // Cancelled after the last step finished.
            Ok(()) => Err(StepError::Cancelled {
                step: pending
                    .workflow
                    .definition
                    .steps
                    .last()
                    .map(|s| s.id.clone())
                    .unwrap_or_default(),
            }),
            Err(e @ StepError::Cancelled { .. }) => Err(e),
            Err(e) => {
                tracing::warn!("Execution {} failed: {}", id, e);
                self.tracker.fail(id, &e.to_string());
                Err(e)
            }
        };

        match outcome {
            Ok(()) => self
                .tracker
                .get_status(id)
                .ok_or_else(|| OfficeflowError::ExecutionNotFound(id.to_string())),
            Err(source) => Err(OfficeflowError::ExecutionFailed {
                execution_id: id.to_string(),
                source,
            }),
        }
    }

    async fn run_steps(
        &self,
        id: &str,
        workflow: &RegisteredWorkflow,
        parameters: &HashMap<String, Value>,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), StepError> {
        let mut results: HashMap<String, Value> = HashMap::new();
        let mut exports: HashMap<String, Value> = HashMap::new();

        for (index, (step, route)) in workflow.steps().enumerate() {
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled {
                    step: step.id.clone(),
                });
            }

            self.tracker.advance(id, index, &step.id);
            self.tracker.log(id, format!("Executing step: {}", step.id));
            check_required(step, parameters, &results, &exports)?;
            tracing::debug!("Execution {}: step {} ({}) via {:?}", id, step.id, step.action, route);

            let value = {
                let ctx = StepContext {
                    step_id: &step.id,
                    action: &step.action,
                    parameters,
                    results: &results,
                    exports: &exports,
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(StepError::Cancelled { step: step.id.clone() });
                    }
                    value = self.dispatch(id, step, route, &ctx) => value?,
                }
            };
            // Cancelled while the step was finishing: drop its result.
            if cancel.is_cancelled() {
                return Err(StepError::Cancelled {
                    step: step.id.clone(),
                });
            }

            for name in &step.provides {
                exports.insert(name.clone(), export_value(&value, name));
            }
            self.tracker.record_result(id, &step.id, value.clone());
            results.insert(step.id.clone(), value);
            self.tracker
                .log(id, format!("Step {} completed successfully", step.id));
        }

        Ok(())
    }

    async fn dispatch(
        &self,
        id: &str,
        step: &StepDefinition,
        route: &StepRoute,
        ctx: &StepContext<'_>,
    ) -> std::result::Result<Value, StepError> {
        match route {
            StepRoute::Builtin(handler) => {
                handler.handle(ctx).await.map_err(|e| StepError::Handler {
                    step: step.id.clone(),
                    message: e.0,
                })
            }
            StepRoute::Tool(tool) => self.invoke_tool(id, Some(tool.as_ref()), step, ctx).await,
            StepRoute::Simulated => self.invoke_tool(id, None, step, ctx).await,
        }
    }

    async fn invoke_tool(
        &self,
        id: &str,
        tool: Option<&ToolIntegration>,
        step: &StepDefinition,
        ctx: &StepContext<'_>,
    ) -> std::result::Result<Value, StepError> {
        // Connected tools use their connection token.
        let tool = tool.map(|t| self.tools.authorized(t));
        let outcome = self
            .tools
            .client()
            .invoke(tool.as_ref(), &step.action, &ctx.merged_parameters())
            .await?;

        if let ToolOutcome::Simulated {
            reason: SimulationReason::CallFailed(reason),
            ..
        } = &outcome
        {
            self.tracker.log(
                id,
                format!(
                    "External call for step {} failed, using simulated result: {}",
                    step.id, reason
                ),
            );
        }
        Ok(outcome.into_value())
    }
}

/// First required name not supplied by the caller or an earlier step.
fn check_required(
    step: &StepDefinition,
    parameters: &HashMap<String, Value>,
    results: &HashMap<String, Value>,
    exports: &HashMap<String, Value>,
) -> std::result::Result<(), StepError> {
    let missing = step.required.iter().find(|name| {
        !parameters.contains_key(name.as_str())
            && !results.contains_key(name.as_str())
            && !exports.contains_key(name.as_str())
    });
    match missing {
        Some(param) => Err(StepError::MissingParameter {
            step: step.id.clone(),
            param: param.clone(),
        }),
        None => Ok(()),
    }
}

/// The result's field named `name`, or the whole result.
fn export_value(result: &Value, name: &str) -> Value {
    result.get(name).cloned().unwrap_or_else(|| result.clone())
}
