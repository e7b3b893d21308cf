use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid business unit id: {0}")]
    InvalidBusinessUnit(String),

    #[error("unknown environment '{0}' (expected development, non-production or production)")]
    UnknownEnvironment(String),
}
