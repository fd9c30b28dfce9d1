//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => crate::exitcode::USAGE,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => crate::exitcode::IOERR,
                InfraError::Serialize { .. } => crate::exitcode::CANTCREAT,
                InfraError::Application(ApplicationError::Config { .. }) => crate::exitcode::CONFIG,
                InfraError::Application(ApplicationError::Domain(_)) => crate::exitcode::DATAERR,
                InfraError::Application(ApplicationError::RunFailure { .. }) => crate::exitcode::GROWTH_FAILED,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    #[test]
    fn given_errors_when_mapping_then_sysexits_codes() {
        assert_eq!(CliError::Usage("x".into()).exit_code(), crate::exitcode::USAGE);
        assert_eq!(
            CliError::from(ApplicationError::config("bad")).exit_code(),
            crate::exitcode::CONFIG
        );
        assert_eq!(
            CliError::from(ApplicationError::Domain(DomainError::VesselNotFound)).exit_code(),
            crate::exitcode::DATAERR
        );
        let failure = ApplicationError::RunFailure {
            reason: "stuck".into(),
            produced: 3,
            target: 10,
            failure_rate: 0.95,
        };
        assert_eq!(CliError::from(failure).exit_code(), crate::exitcode::GROWTH_FAILED);
    }
}
