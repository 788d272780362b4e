use serde::Serialize;
use thiserror::Error;

use crate::domain::request::RequestStatus;
use crate::lifecycle::RequestAction;

/// Stable machine-readable classification of a `WorkflowError`; the token
/// callers branch on and the one logged alongside every failed operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    PermissionDenied,
    NotFound,
    InvalidTransition,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::InvalidTransition => "invalid_transition",
            Self::Conflict => "conflict",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("cannot apply {action:?} to a request in status {from:?}")]
    InvalidTransition { from: RequestStatus, action: RequestAction },
    #[error("attempt {attempt_no} of request `{request_id}` has already been decided")]
    AttemptNotPending { request_id: String, attempt_no: u32 },
    #[error("request `{request_id}` was modified concurrently; re-read and retry")]
    Conflict { request_id: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } | Self::AttemptNotPending { .. } => {
                ErrorKind::InvalidTransition
            }
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// What a caller outside the process is allowed to see. Internal detail
    /// goes to the log only; everything else is safe to relay verbatim.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "An unexpected internal error occurred.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }
}
