use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("provision of {stack} failed: {message}")]
    ProvisionFailed { stack: String, message: String },

    #[error("teardown of {stack} failed: {message}")]
    TeardownFailed { stack: String, message: String },

    #[error("stack {stack} has no output '{key}'")]
    MissingOutput { stack: String, key: String },

    #[error("policy validation of {stack} found {count} violation(s): {summary}")]
    PolicyViolations {
        stack: String,
        count: usize,
        summary: String,
    },

    #[error("internal driver error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    PermissionDenied,
    NotFound,
    /// Transient or otherwise unclassified API failure.
    Api,
    /// The response could not be decoded.
    Decode,
    /// The query client itself could not run (spawn, auth, transport).
    Client,
}

impl std::fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryErrorKind::PermissionDenied => write!(f, "permission denied"),
            QueryErrorKind::NotFound => write!(f, "not found"),
            QueryErrorKind::Api => write!(f, "api error"),
            QueryErrorKind::Decode => write!(f, "decode error"),
            QueryErrorKind::Client => write!(f, "client error"),
        }
    }
}

/// A failed read against the control plane.
#[derive(Debug, Clone, Error)]
#[error("{kind} running `{command}`: {message}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub command: String,
    pub message: String,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, command: impl Into<String>, message: impl Into<String>) -> Self {
        QueryError {
            kind,
            command: command.into(),
            message: message.into(),
        }
    }
}
