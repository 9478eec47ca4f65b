use crate::config::AppConfig;
use crate::error::Result;
use crate::workflow::WorkflowEngine;
use parking_lot::RwLock;
use std::sync::Arc;

/// Application global state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    /// Workflow catalog, executor and execution tracker.
    pub engine: WorkflowEngine,
}

impl AppState {
    /// Build the engine from `config` (tool credentials, workflows directory).
    pub fn new(config: AppConfig) -> Result<Self> {
        let engine = WorkflowEngine::from_config(&config)?;
        Ok(Self::with_engine(config, engine))
    }

    pub fn with_engine(config: AppConfig, engine: WorkflowEngine) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            engine,
        }
    }
}
