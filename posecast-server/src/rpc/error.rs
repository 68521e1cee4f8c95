use thiserror::Error;

use crate::stream::ControlError;

/// A command that failed validation. Each variant renders one of the fixed
/// message templates clients match on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required param(s): '{}'", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Incompatible type for param: '{0}'")]
    IncompatibleType(String),

    #[error("Expected param '{path}' to be one of: {}", .allowed.join(", "))]
    NotOneOf { path: String, allowed: Vec<String> },

    #[error("Invalid format for param '{path}': expected {expected}")]
    InvalidFormat { path: String, expected: &'static str },
}

/// Broad failure categories. All of them go out with the same wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    Validation,
    UnknownMethod,
    Conflict,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("Malformed command: {0}")]
    Malformed(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Runtime(String),
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Malformed(_) => ErrorKind::Malformed,
            RpcError::Validation(_) => ErrorKind::Validation,
            RpcError::UnknownMethod(_) => ErrorKind::UnknownMethod,
            RpcError::Conflict(_) => ErrorKind::Conflict,
            RpcError::Runtime(_) => ErrorKind::Runtime,
        }
    }

    /// Whether the reply may go to the caller's `replyTo`. Failures raised
    /// while a handler runs, and envelopes that could not be read at all, are
    /// sent to the error channel instead.
    pub fn replies_to_caller(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::UnknownMethod | ErrorKind::Conflict
        )
    }
}

impl From<ControlError> for RpcError {
    fn from(err: ControlError) -> Self {
        if err.is_conflict() {
            RpcError::Conflict(err.to_string())
        } else {
            RpcError::Runtime(err.to_string())
        }
    }
}
