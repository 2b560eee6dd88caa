//! Error taxonomy and provider error classification
//!
//! Provider error codes and messages are inspected in exactly one place,
//! [`classify`]. Everything downstream reasons over [`ErrorKind`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Engine-level classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced stack, service or resource does not exist
    NotFound,
    /// Network failure or throttling, worth retrying
    Transient,
    /// Backend refused the operation in the current state
    Conflict,
    /// Backend reported there was nothing to do
    NoOp,
    /// Remediation is structurally impossible
    Unfixable,
    /// A bounded wait was exceeded
    Timeout,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NoOp => "no_op",
            ErrorKind::Unfixable => "unfixable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Failure of a single backend call
#[derive(Debug, Clone, Error)]
#[error("{operation} failed ({kind}): {message}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub operation: String,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Build from a raw provider code and message
    pub fn from_provider(
        operation: impl Into<String>,
        code: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let kind = classify(code, &message);
        Self::new(kind, operation, message)
    }

    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, operation, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_no_op(&self) -> bool {
        self.kind == ErrorKind::NoOp
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Configuration loading failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

const NOT_FOUND_CODES: &[&str] = &[
    "ClusterNotFoundException",
    "ServiceNotFoundException",
    "ServiceNotActiveException",
    "TargetGroupNotFound",
    "TargetGroupNotFoundException",
    "ObjectNotFoundException",
    "ResourceNotFoundException",
    "StackNotFoundException",
];

const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalFailure",
    "InternalServiceError",
    "RequestTimeout",
    "RequestTimeoutException",
];

const CONFLICT_CODES: &[&str] = &[
    "ConcurrentUpdateException",
    "ResourceInUseException",
    "ResourceInUse",
    "InvalidParameterException",
    "OperationInProgressException",
];

const NO_OP_MARKERS: &[&str] = &[
    "nothing to roll back",
    "no updates are to be performed",
    "is already being deleted",
    "no scaling policy found",
];

const NOT_FOUND_MARKERS: &[&str] = &["does not exist", "not found", "could not be found"];

const CONFLICT_MARKERS: &[&str] = &[
    "cannot be called from current stack status",
    "state and can not be updated",
    "state and cannot be updated",
    "already exists",
    "currently being",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "rate exceeded",
    "timed out",
    "connection reset",
    "could not connect",
    "temporarily unavailable",
];

/// Map a provider error code and message onto an [`ErrorKind`]
pub fn classify(code: Option<&str>, message: &str) -> ErrorKind {
    let lowered = message.to_ascii_lowercase();

    // Checked before codes: the provider reports these as validation errors
    if NO_OP_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorKind::NoOp;
    }

    if let Some(code) = code {
        if NOT_FOUND_CODES.contains(&code) {
            return ErrorKind::NotFound;
        }
        if TRANSIENT_CODES.contains(&code) {
            return ErrorKind::Transient;
        }
        if CONFLICT_CODES.contains(&code) {
            return ErrorKind::Conflict;
        }
    }

    if NOT_FOUND_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorKind::NotFound;
    }
    if TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorKind::Transient;
    }
    if CONFLICT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return ErrorKind::Conflict;
    }

    ErrorKind::Other
}

/// Pull `(code, message)` out of a provider CLI error line such as
/// `An error occurred (ValidationError) when calling the X operation: msg`
pub fn parse_provider_error(stderr: &str) -> (Option<String>, String) {
    let text = stderr.trim();
    let code = text
        .find("An error occurred (")
        .map(|start| start + "An error occurred (".len())
        .and_then(|start| {
            text[start..]
                .find(')')
                .map(|end| text[start..start + end].to_string())
        });

    let message = match text.find("operation: ") {
        Some(idx) => text[idx + "operation: ".len()..].trim().to_string(),
        None => text.to_string(),
    };

    (code, message)
}
