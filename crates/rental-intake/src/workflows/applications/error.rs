use serde::Serialize;

use super::domain::{ApplicationId, ApplicationStatus, Role};
use super::repository::RepositoryError;

/// Machine-readable error kind surfaced to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTransition,
    Unauthorized,
    PreconditionNotMet,
    DuplicateReference,
    AlreadyVerified,
    AlreadySigned,
    ValidationError,
    Conflict,
    NotFound,
    Infrastructure,
}

impl ErrorKind {
    /// Only stale-read conflicts are worth retrying against fresh state.
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Conflict)
    }
}

/// Errors raised by the lifecycle core. None of them are retried internally.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("transition {from} -> {to} is not permitted")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("{0}")]
    InvalidSigningStep(String),
    #[error("{} actor may not {action}", .role.label())]
    Unauthorized { role: Role, action: String },
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),
    #[error("payment reference {0} already recorded for this application")]
    DuplicateReference(String),
    #[error("application {0} already has a verified payment")]
    AlreadyVerified(ApplicationId),
    #[error("{0}")]
    AlreadySigned(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("application {0} changed since it was read; retry against fresh state")]
    Conflict(ApplicationId),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error("history export failed: {0}")]
    Export(#[from] csv::Error),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidTransition { .. } | LifecycleError::InvalidSigningStep(_) => {
                ErrorKind::InvalidTransition
            }
            LifecycleError::Unauthorized { .. } => ErrorKind::Unauthorized,
            LifecycleError::PreconditionNotMet(_) => ErrorKind::PreconditionNotMet,
            LifecycleError::DuplicateReference(_) => ErrorKind::DuplicateReference,
            LifecycleError::AlreadyVerified(_) => ErrorKind::AlreadyVerified,
            LifecycleError::AlreadySigned(_) => ErrorKind::AlreadySigned,
            LifecycleError::Validation(_) => ErrorKind::ValidationError,
            LifecycleError::Conflict(_) => ErrorKind::Conflict,
            LifecycleError::NotFound(_) => ErrorKind::NotFound,
            LifecycleError::Repository(_) | LifecycleError::Export(_) => ErrorKind::Infrastructure,
        }
    }

    pub(crate) fn unauthorized(role: Role, action: impl Into<String>) -> Self {
        LifecycleError::Unauthorized {
            role,
            action: action.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LifecycleError::Validation(message.into())
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        LifecycleError::PreconditionNotMet(message.into())
    }
}

impl From<RepositoryError> for LifecycleError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(id) => LifecycleError::Conflict(id),
            RepositoryError::NotFound(id) => LifecycleError::NotFound(format!("application {id}")),
            other => LifecycleError::Repository(other),
        }
    }
}

/// Serializable error body for HTTP responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&LifecycleError> for ErrorBody {
    fn from(value: &LifecycleError) -> Self {
        Self {
            kind: value.kind(),
            message: value.to_string(),
        }
    }
}
