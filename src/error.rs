//! Error types for growth-engine.

use thiserror::Error;

use crate::model::workflow::{Status, WorkflowId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid metrics snapshot: {0}")]
    InvalidMetrics(String),

    #[error("workflow {0} is paused")]
    WorkflowPaused(WorkflowId),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("workflow {0} already has a run in flight")]
    RunInFlight(WorkflowId),

    #[error("invalid action event: {0}")]
    InvalidEvent(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The underlying automation of a workflow failed.
///
/// Never returned as an `Err` to callers: the orchestrator absorbs it by
/// moving the workflow to `failed` and scheduling a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("execution failed: {message}")]
pub struct ExecutionFailure {
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
