use std::time::Duration;

use regex::Regex;

use crate::error::DriverError;

/// Transient provisioning failures worth another attempt: (pattern, description).
///
/// Patterns are matched line by line against the combined Terraform log.
pub const TRANSIENT_ERRORS: &[(&str, &str)] = &[
    // VPC Service Controls edits are eventually consistent.
    (
        r".*Error 403.*Request is prohibited by organization's policy.*vpcServiceControlsUniqueIdentifier.*",
        "Request is prohibited by organization's policy.",
    ),
    (
        r".*Error 400.*Service account service-.*@gs-project-accounts\.iam\.gserviceaccount\.com does not exist.*",
        "Google Storage Service Agent propagation issue",
    ),
    (r".*Error code 13.*", "Error code 13"),
    (r".*Error code 14.*", "Error code 14"),
    (r".*Error 409.*unable to queue the operation.*", "Unable to queue the operation"),
    (r".*Error 429.*Quota exceeded.*", "Quota exceeded, retry later"),
    (r".*Error 503.*", "Service temporarily unavailable"),
    (
        r".*Error 400.*is not a valid service account.*",
        "Service account propagation delay",
    ),
];

/// Retries after the first attempt for the project step.
pub const DEFAULT_MAX_RETRIES: u32 = 1;
/// Fixed delay between attempts for the project step.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RetrySignature {
    pub pattern: Regex,
    pub description: String,
}

impl PartialEq for RetrySignature {
    fn eq(&self, other: &Self) -> bool {
        self.pattern.as_str() == other.pattern.as_str() && self.description == other.description
    }
}

impl Eq for RetrySignature {}

/// Which provisioning failures are retried, how often and how far apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub signatures: Vec<RetrySignature>,
    /// Retries after the first attempt; `0` means a single attempt.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(
        signatures: &[(&str, &str)],
        max_retries: u32,
        backoff: Duration,
    ) -> Result<Self, DriverError> {
        let signatures = signatures
            .iter()
            .map(|(pattern, description)| {
                Regex::new(pattern)
                    .map(|pattern| RetrySignature {
                        pattern,
                        description: description.to_string(),
                    })
                    .map_err(|e| DriverError::Internal(format!("retry pattern {pattern:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RetryPolicy { signatures, max_retries, backoff })
    }

    /// The transient-error allow-list with one retry after two minutes.
    pub fn transient() -> Result<Self, DriverError> {
        Self::new(TRANSIENT_ERRORS, DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF)
    }

    /// Description of the first signature found in `log`, if any.
    pub fn matched(&self, log: &str) -> Option<&str> {
        self.signatures
            .iter()
            .find(|s| log.lines().any(|line| s.pattern.is_match(line)))
            .map(|s| s.description.as_str())
    }
}
