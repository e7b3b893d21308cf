use thiserror::Error;

use crate::chain::Stage;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("organization {organization} has no access policy")]
    PolicyNotFound { organization: String },

    #[error("organization {organization} has {} access policies: {}", .candidates.len(), .candidates.join(", "))]
    AmbiguousPolicy {
        organization: String,
        candidates: Vec<String>,
    },

    #[error("access policy of organization {organization} has no name")]
    MalformedPolicy { organization: String },

    #[error(transparent)]
    Query(#[from] topoverify_driver::QueryError),
}

/// A stack in a case's chain could not be read or applied.
#[derive(Debug, Error)]
#[error("{stage} stack: {source}")]
pub struct ChainError {
    pub stage: Stage,
    #[source]
    pub source: topoverify_driver::DriverError,
}

/// Anything that stops globals from resolving; no case runs.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    Config(#[from] topoverify_config::ConfigError),

    #[error("organization policy lookup: {0}")]
    Policy(#[from] ResolveError),

    #[error("{stack} outputs: {source}")]
    Stack {
        stack: &'static str,
        #[source]
        source: topoverify_driver::DriverError,
    },

    #[error("retry policy: {0}")]
    Retry(topoverify_driver::DriverError),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("internal error: {0}")]
    Internal(String),
}
