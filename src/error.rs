use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fieldless tag carried by failed outcomes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum ErrorKind {
    IoReadFailure,
    ServiceUnavailable,
    PermissionDenied,
    DeadlineExceeded,
    EmptyResponse,
    TransportError,
    NoStructuredPayload,
    IoWriteFailure,
    Unexpected,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::IoReadFailure => "io-read-failure",
            ErrorKind::ServiceUnavailable => "service-unavailable",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::DeadlineExceeded => "deadline-exceeded",
            ErrorKind::EmptyResponse => "empty-response",
            ErrorKind::TransportError => "transport-error",
            ErrorKind::NoStructuredPayload => "no-structured-payload",
            ErrorKind::IoWriteFailure => "io-write-failure",
            ErrorKind::Unexpected => "unexpected",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Failure of the completion service call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion service unavailable: no credential configured")]
    Unavailable,
    #[error("permission denied by completion service: {0}")]
    PermissionDenied(String),
    #[error("completion request exceeded {timeout_secs}s deadline")]
    DeadlineExceeded { timeout_secs: u64 },
    #[error("completion service returned an empty response")]
    EmptyResponse,
    #[error("completion transport failure: {0}")]
    Transport(String),
}

/// Everything that can end an audit job early.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to read {path}: {source}")]
    IoRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Completion(#[from] CompletionError),
    #[error("no valid structured payload in completion response")]
    NoStructuredPayload,
    #[error("failed to write report {path}: {source}")]
    IoWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unexpected failure: {0}")]
    Unexpected(String),
    #[error("batch cancelled before start")]
    Cancelled,
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::IoRead { .. } => ErrorKind::IoReadFailure,
            AuditError::Completion(c) => match c {
                CompletionError::Unavailable => ErrorKind::ServiceUnavailable,
                CompletionError::PermissionDenied(_) => ErrorKind::PermissionDenied,
                CompletionError::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
                CompletionError::EmptyResponse => ErrorKind::EmptyResponse,
                CompletionError::Transport(_) => ErrorKind::TransportError,
            },
            AuditError::NoStructuredPayload => ErrorKind::NoStructuredPayload,
            AuditError::IoWrite { .. } => ErrorKind::IoWriteFailure,
            AuditError::Unexpected(_) => ErrorKind::Unexpected,
            AuditError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
