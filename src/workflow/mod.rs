//! Workflow engine: catalog, step dispatch and execution tracking.

pub mod catalog;
pub mod engine;
pub mod executor;
pub mod handlers;
pub mod loader;
pub mod schema;
pub mod tracker;

pub use catalog::{builtin_workflows, StepRoute, WorkflowCatalog};
pub use engine::WorkflowEngine;
pub use executor::WorkflowExecutor;
pub use handlers::{ActionHandler, HandlerError, HandlerTable, StepContext};
pub use schema::*;
pub use tracker::{ExecutionEvent, ExecutionTracker};
