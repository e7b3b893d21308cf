use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::control_plane::ControlPlane;
use crate::error::{QueryError, QueryErrorKind};
use crate::process;
use crate::query::Query;
use crate::Document;

const TIMEOUT_SECS: u64 = 300;

/// Serves queries by shelling out to `gcloud … --format json`.
pub struct GcloudCli {
    pub binary: String,
    /// Passed as `--impersonate-service-account` on every call.
    pub impersonate: Option<String>,
    pub timeout: Duration,
}

impl GcloudCli {
    pub fn new(impersonate: Option<String>) -> Self {
        GcloudCli {
            binary: "gcloud".into(),
            impersonate,
            timeout: Duration::from_secs(TIMEOUT_SECS),
        }
    }

    fn command_args(&self, query: &Query) -> Vec<String> {
        let mut args = query.args();
        args.push("--format".into());
        args.push("json".into());
        if let Some(sa) = &self.impersonate {
            args.push(format!("--impersonate-service-account={}", sa));
        }
        args
    }
}

#[async_trait]
impl ControlPlane for GcloudCli {
    fn name(&self) -> &'static str {
        "gcloud"
    }

    async fn run(&self, query: &Query) -> Result<Document, QueryError> {
        let args = self.command_args(query);
        debug!(%query, "running control-plane query");
        let out = process::run(&self.binary, &args, None, &HashMap::new(), self.timeout)
            .await
            .map_err(|e| QueryError::new(QueryErrorKind::Client, query.to_string(), e.to_string()))?;

        if out.code != 0 {
            return Err(QueryError::new(
                classify_stderr(&out.stderr),
                query.to_string(),
                last_error_line(&out.stderr),
            ));
        }

        let body = out.stdout.trim();
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body)
            .map_err(|e| QueryError::new(QueryErrorKind::Decode, query.to_string(), e.to_string()))
    }
}

/// Map gcloud's error text to a query error kind.
fn classify_stderr(stderr: &str) -> QueryErrorKind {
    if stderr.contains("PERMISSION_DENIED")
        || stderr.contains("does not have permission")
        || stderr.contains("HTTPError 403")
    {
        QueryErrorKind::PermissionDenied
    } else if stderr.contains("NOT_FOUND") || stderr.contains("HTTPError 404") || stderr.contains("was not found") {
        QueryErrorKind::NotFound
    } else {
        QueryErrorKind::Api
    }
}

fn last_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("gcloud exited non-zero")
        .trim()
        .to_string()
}
