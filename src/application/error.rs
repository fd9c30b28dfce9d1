//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::DomainError;

/// Application errors wrap domain errors and add run-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Growth halted; the tree keeps its last committed state.
    #[error("run failed after {produced}/{target} terminals (failure rate {failure_rate:.3}): {reason}")]
    RunFailure {
        reason: String,
        produced: usize,
        target: usize,
        failure_rate: f64,
    },

    #[error("config error: {message}")]
    Config { message: String },
}

impl ApplicationError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
