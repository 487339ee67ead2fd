use thiserror::Error;

/// Errors raised by the workflow engine
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("context error: {0}")]
    ContextError(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("graph has no start task")]
    MissingStartTask,
}

pub type Result<T> = std::result::Result<T, FlowError>;
