use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::control_plane::ControlPlane;
use crate::error::{QueryError, QueryErrorKind};
use crate::query::Query;
use crate::Document;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

// ── Base URLs (overridden in tests to point at a mock server) ─────────────────

#[derive(Clone)]
struct BaseUrls {
    resourcemanager:      String,
    serviceusage:         String,
    accesscontextmanager: String,
    compute:              String,
    iam:                  String,
    iamcredentials:       String,
}

impl Default for BaseUrls {
    fn default() -> Self {
        Self {
            resourcemanager:      "https://cloudresourcemanager.googleapis.com".into(),
            serviceusage:         "https://serviceusage.googleapis.com".into(),
            accesscontextmanager: "https://accesscontextmanager.googleapis.com".into(),
            compute:              "https://compute.googleapis.com".into(),
            iam:                  "https://iam.googleapis.com".into(),
            iamcredentials:       "https://iamcredentials.googleapis.com".into(),
        }
    }
}

// ── Token providers ───────────────────────────────────────────────────────────

/// Bearer token source for every REST call.
#[async_trait]
trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, String>;
}

/// Application Default Credentials.
struct AdcTokenProvider {
    inner: Arc<dyn gcp_auth::TokenProvider>,
}

#[async_trait]
impl TokenProvider for AdcTokenProvider {
    async fn token(&self) -> Result<String, String> {
        let token = self
            .inner
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| format!("GCP auth failed: {}", e))?;
        Ok(token.as_str().to_string())
    }
}

/// Fixed token, no network.
struct StaticToken(String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String, String> {
        Ok(self.0.clone())
    }
}

/// Short-lived token for `account`, minted from the source credentials via
/// IAM Credentials `generateAccessToken`. Cached until a minute before expiry.
struct ImpersonatedToken {
    source:  Box<dyn TokenProvider>,
    account: String,
    client:  reqwest::Client,
    base:    String,
    cached:  Mutex<Option<(String, DateTime<Utc>)>>,
}

#[async_trait]
impl TokenProvider for ImpersonatedToken {
    async fn token(&self) -> Result<String, String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if *expires - ChronoDuration::seconds(60) > Utc::now() {
                return Ok(token.clone());
            }
        }

        let source = self.source.token().await?;
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            self.base, self.account
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&source)
            .json(&json!({ "scope": [CLOUD_PLATFORM_SCOPE] }))
            .send()
            .await
            .map_err(|e| format!("impersonate {}: {}", self.account, e))?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!(
                "impersonate {}: {}",
                self.account,
                GcpRestControlPlane::extract_gcp_error(&body)
            ));
        }

        let token = body["accessToken"]
            .as_str()
            .ok_or_else(|| format!("impersonate {}: no accessToken in response", self.account))?
            .to_string();
        let expires = body["expireTime"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc::now() + ChronoDuration::minutes(5));
        *cached = Some((token.clone(), expires));
        Ok(token)
    }
}

// ── GcpRestControlPlane ───────────────────────────────────────────────────────

/// Serves queries from the GCP REST APIs, normalising each response into the
/// shape `gcloud --format json` prints for the equivalent command.
pub struct GcpRestControlPlane {
    client: reqwest::Client,
    token:  Box<dyn TokenProvider>,
    base:   BaseUrls,
}

impl GcpRestControlPlane {
    /// Use Application Default Credentials, optionally impersonating `impersonate`.
    pub async fn from_adc(impersonate: Option<String>) -> Result<Self, QueryError> {
        let inner = gcp_auth::provider().await.map_err(|e| {
            QueryError::new(QueryErrorKind::Client, "adc", format!("Failed to initialise GCP ADC: {}", e))
        })?;
        let source: Box<dyn TokenProvider> = Box::new(AdcTokenProvider { inner });
        let client = reqwest::Client::new();
        let base = BaseUrls::default();
        let token: Box<dyn TokenProvider> = match impersonate {
            Some(account) => Box::new(ImpersonatedToken {
                source,
                account,
                client: client.clone(),
                base: base.iamcredentials.clone(),
                cached: Mutex::new(None),
            }),
            None => source,
        };
        Ok(Self { client, token, base })
    }

    #[cfg(test)]
    fn with_static_token(token: &str, base: BaseUrls) -> Self {
        Self {
            client: reqwest::Client::new(),
            token:  Box::new(StaticToken(token.to_string())),
            base,
        }
    }

    #[cfg(test)]
    fn impersonating(source: &str, account: &str, base: BaseUrls) -> Self {
        let client = reqwest::Client::new();
        Self {
            token: Box::new(ImpersonatedToken {
                source:  Box::new(StaticToken(source.to_string())),
                account: account.to_string(),
                client:  client.clone(),
                base:    base.iamcredentials.clone(),
                cached:  Mutex::new(None),
            }),
            client,
            base,
        }
    }

    // ── GCP error parsing ─────────────────────────────────────────────────────

    /// Convert a GCP REST error envelope into a human-readable message:
    ///   `"PERMISSION_DENIED: The caller does not have permission (IAM_PERMISSION_DENIED: resourcemanager.projects.get)"`
    fn extract_gcp_error(body: &Value) -> String {
        let err = &body["error"];
        let status  = err["status"].as_str().unwrap_or("UNKNOWN");
        let message = err["message"].as_str().unwrap_or("unknown error");

        let detail_suffix = err["details"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|d| {
                let reason = d["reason"].as_str()?;
                let meta_vals: Vec<&str> = d["metadata"]
                    .as_object()
                    .map(|m| m.values().filter_map(|v| v.as_str()).collect())
                    .unwrap_or_default();
                Some(format!(" ({}: {})", reason, meta_vals.join(", ")))
            })
            .unwrap_or_default();

        format!("{}: {}{}", status, message, detail_suffix)
    }

    // ── HTTP helpers ──────────────────────────────────────────────────────────

    async fn send(&self, query: &Query, req: reqwest::RequestBuilder) -> Result<Value, QueryError> {
        let command = query.to_string();
        let token = self
            .token
            .token()
            .await
            .map_err(|e| QueryError::new(QueryErrorKind::Client, &command, e))?;
        let resp = req
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| QueryError::new(QueryErrorKind::Client, &command, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body: Value = resp.json().await.unwrap_or_default();
            let kind = match status.as_u16() {
                403 => QueryErrorKind::PermissionDenied,
                404 => QueryErrorKind::NotFound,
                _ => QueryErrorKind::Api,
            };
            return Err(QueryError::new(kind, command, Self::extract_gcp_error(&body)));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| QueryError::new(QueryErrorKind::Client, &command, e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&text).map_err(|e| QueryError::new(QueryErrorKind::Decode, command, e.to_string()))
    }

    async fn get(&self, query: &Query, url: &str, params: &[(&str, &str)]) -> Result<Value, QueryError> {
        self.send(query, self.client.get(url).query(params)).await
    }

    async fn post(&self, query: &Query, url: &str, body: Value) -> Result<Value, QueryError> {
        self.send(query, self.client.post(url).json(&body)).await
    }

    /// Follow `nextPageToken` and concatenate the `items_key` arrays, preserving order.
    async fn list_all(
        &self,
        query: &Query,
        url: &str,
        params: &[(&str, &str)],
        items_key: &str,
    ) -> Result<Value, QueryError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut p: Vec<(&str, &str)> = params.to_vec();
            if let Some(t) = page_token.as_deref() {
                p.push(("pageToken", t));
            }
            let page = self.get(query, url, &p).await?;
            if let Some(arr) = page[items_key].as_array() {
                items.extend(arr.iter().cloned());
            }
            match page["nextPageToken"].as_str() {
                Some(t) if !t.is_empty() => page_token = Some(t.to_string()),
                _ => break,
            }
        }
        Ok(Value::Array(items))
    }
}

#[async_trait]
impl ControlPlane for GcpRestControlPlane {
    fn name(&self) -> &'static str {
        "gcp-rest"
    }

    async fn run(&self, query: &Query) -> Result<Document, QueryError> {
        debug!(%query, "running control-plane query over REST");
        let b = &self.base;
        match query {
            Query::ProjectDescribe { project } => {
                self.get(query, &format!("{}/v1/projects/{}", b.resourcemanager, project), &[])
                    .await
            }
            Query::ServicesList { project } => {
                self.list_all(
                    query,
                    &format!("{}/v1/projects/{}/services", b.serviceusage, project),
                    &[("filter", "state:ENABLED"), ("pageSize", "200")],
                    "services",
                )
                .await
            }
            Query::PerimeterDescribe { perimeter, policy } => {
                self.get(
                    query,
                    &format!(
                        "{}/v1/accessPolicies/{}/servicePerimeters/{}",
                        b.accesscontextmanager, policy, perimeter
                    ),
                    &[],
                )
                .await
            }
            Query::SharedVpcHost { project } => {
                let host = self
                    .get(query, &format!("{}/compute/v1/projects/{}/getXpnHost", b.compute, project), &[])
                    .await?;
                // A project without a host answers with an empty resource.
                if host.get("name").is_none() {
                    return Ok(Value::Null);
                }
                Ok(host)
            }
            Query::NetworksList { project } => {
                self.list_all(
                    query,
                    &format!("{}/compute/v1/projects/{}/global/networks", b.compute, project),
                    &[],
                    "items",
                )
                .await
            }
            Query::PeeringsList { project } => {
                let networks = self
                    .list_all(
                        query,
                        &format!("{}/compute/v1/projects/{}/global/networks", b.compute, project),
                        &[],
                        "items",
                    )
                    .await?;
                Ok(peered_networks(networks))
            }
            Query::ServiceAccountIamPolicy { account } => {
                self.post(
                    query,
                    &format!("{}/v1/projects/-/serviceAccounts/{}:getIamPolicy", b.iam, account),
                    json!({}),
                )
                .await
            }
            Query::ProjectIamPolicyByRole { project, role } => {
                let policy = self
                    .post(
                        query,
                        &format!("{}/v1/projects/{}:getIamPolicy", b.resourcemanager, project),
                        json!({}),
                    )
                    .await?;
                Ok(flatten_bindings(&policy, role))
            }
            Query::AccessPolicies { organization } => {
                let parent = format!("organizations/{}", organization);
                self.list_all(
                    query,
                    &format!("{}/v1/accessPolicies", b.accesscontextmanager),
                    &[("parent", parent.as_str())],
                    "accessPolicies",
                )
                .await
            }
        }
    }
}

/// Networks that carry at least one peering, in listing order.
fn peered_networks(networks: Value) -> Value {
    let items = match networks {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    Value::Array(
        items
            .into_iter()
            .filter(|n| n["peerings"].as_array().is_some_and(|p| !p.is_empty()))
            .collect(),
    )
}

/// gcloud's `--flatten bindings --filter bindings.role:<role>`: one policy copy
/// per matching binding, with `bindings` narrowed to that single binding.
fn flatten_bindings(policy: &Value, role: &str) -> Value {
    let bindings = policy["bindings"].as_array().cloned().unwrap_or_default();
    Value::Array(
        bindings
            .into_iter()
            .filter(|b| b["role"].as_str() == Some(role))
            .map(|b| {
                let mut row = policy.clone();
                row["bindings"] = b;
                row
            })
            .collect(),
    )
}
