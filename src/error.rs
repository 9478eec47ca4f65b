use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfficeflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Action not found: {action} for tool: {tool}")]
    ActionNotFound { tool: String, action: String },

    #[error("Tool call failed: {0}")]
    ToolCallFailed(String),

    /// A step failed inside a running execution. The execution is retained
    /// by the tracker and can still be inspected by id.
    #[error("Execution {execution_id} failed: {source}")]
    ExecutionFailed {
        execution_id: String,
        #[source]
        source: StepError,
    },
}

/// Failure of a single workflow step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Missing required parameter: {param} for step: {step}")]
    MissingParameter { step: String, param: String },

    #[error("Step {step} failed: {message}")]
    Handler { step: String, message: String },

    #[error("External call to {tool} failed: {message}")]
    ExternalCallFailed { tool: String, message: String },

    #[error("Execution cancelled at step {step}")]
    Cancelled { step: String },
}

impl OfficeflowError {
    /// The step error behind a failed execution, if any.
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            OfficeflowError::ExecutionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, OfficeflowError>;
