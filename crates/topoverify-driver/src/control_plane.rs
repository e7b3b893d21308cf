use async_trait::async_trait;

use crate::error::QueryError;
use crate::query::Query;
use crate::Document;

/// Read-only access to cloud state.
///
/// Implementations never mutate anything and never retry: a failed read is
/// returned to the caller as-is.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run(&self, query: &Query) -> Result<Document, QueryError>;
}
