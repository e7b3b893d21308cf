use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use topoverify_domain::{Environment, ResourceRole, TopologyMode};
use uuid::Uuid;

use crate::chain::Stage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed { expected: String, actual: String },
    /// The control plane could not answer; never counted as a pass.
    Errored { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    /// Project, account or perimeter the check looked at.
    pub resource: String,
    pub outcome: CheckOutcome,
}

impl CheckResult {
    pub fn passed(name: &str, resource: &str) -> Self {
        Self::with(name, resource, CheckOutcome::Passed)
    }

    pub fn failed(name: &str, resource: &str, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::with(
            name,
            resource,
            CheckOutcome::Failed {
                expected: expected.into(),
                actual: actual.into(),
            },
        )
    }

    pub fn errored(name: &str, resource: &str, error: impl std::fmt::Display) -> Self {
        Self::with(name, resource, CheckOutcome::Errored { error: error.to_string() })
    }

    /// Passed when `expected == actual`, failed with both values otherwise.
    pub fn equals(name: &str, resource: &str, expected: &str, actual: &str) -> Self {
        if expected == actual {
            Self::passed(name, resource)
        } else {
            Self::failed(name, resource, expected, actual)
        }
    }

    fn with(name: &str, resource: &str, outcome: CheckOutcome) -> Self {
        CheckResult {
            name: name.to_string(),
            resource: resource.to_string(),
            outcome,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == CheckOutcome::Passed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleReport {
    pub role: ResourceRole,
    /// `None` when the project stack did not expose the role's project id.
    pub project_id: Option<String>,
    pub checks: Vec<CheckResult>,
}

impl RoleReport {
    pub fn passed(&self) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(CheckResult::is_pass)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Verified { roles: Vec<RoleReport> },
    /// A stack in the chain failed; no checks ran.
    ProvisioningFailed { stage: Stage, message: String },
    TimedOut { after_ms: u64 },
}

/// What happened to the project stack after verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Teardown {
    Destroyed,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub case: String,
    pub environment: Environment,
    pub outcome: CaseOutcome,
    /// `None` unless teardown was requested and the case got as far as verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown: Option<Teardown>,
    pub duration_ms: u64,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        let verified = match &self.outcome {
            CaseOutcome::Verified { roles } => roles.iter().all(RoleReport::passed),
            _ => false,
        };
        verified && !matches!(self.teardown, Some(Teardown::Failed { .. }))
    }

    /// Every check of a verified case, in role order.
    pub fn checks(&self) -> impl Iterator<Item = &CheckResult> {
        let roles: &[RoleReport] = match &self.outcome {
            CaseOutcome::Verified { roles } => roles,
            _ => &[],
        };
        roles.iter().flat_map(|r| r.checks.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: TopologyMode,
    pub verify_only: bool,
    /// Matrix order, whatever order the cases finished in.
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(CaseReport::passed)
    }

    pub fn failed_cases(&self) -> usize {
        self.cases.iter().filter(|c| !c.passed()).count()
    }

    /// Per case and per role, one line per check with the compared values.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "run {} ({}{})", self.run_id, self.mode, if self.verify_only { ", verify-only" } else { "" });

        for case in &self.cases {
            let status = if case.passed() { "PASS" } else { "FAIL" };
            let _ = writeln!(out, "\n{} {} ({} ms)", status, case.case, case.duration_ms);
            match &case.outcome {
                CaseOutcome::ProvisioningFailed { stage, message } => {
                    let _ = writeln!(out, "  provisioning failed at {} stack: {}", stage, message);
                }
                CaseOutcome::TimedOut { after_ms } => {
                    let _ = writeln!(out, "  timed out after {} ms", after_ms);
                }
                CaseOutcome::Verified { roles } => {
                    for role in roles {
                        let _ = writeln!(
                            out,
                            "  {} {}",
                            role.role,
                            role.project_id.as_deref().unwrap_or("<unknown project>")
                        );
                        for check in &role.checks {
                            let line = match &check.outcome {
                                CheckOutcome::Passed => format!("PASS  {}", check.name),
                                CheckOutcome::Failed { expected, actual } => format!(
                                    "FAIL  {} on {}: expected {}, got {}",
                                    check.name, check.resource, expected, actual
                                ),
                                CheckOutcome::Errored { error } => {
                                    format!("ERROR {} on {}: {}", check.name, check.resource, error)
                                }
                            };
                            let _ = writeln!(out, "    {}", line);
                        }
                    }
                }
            }
            match &case.teardown {
                Some(Teardown::Destroyed) => {
                    let _ = writeln!(out, "  project stack destroyed");
                }
                Some(Teardown::Failed { message }) => {
                    let _ = writeln!(out, "  teardown failed: {}", message);
                }
                None => {}
            }
        }

        let total = self.cases.len();
        let _ = writeln!(
            out,
            "\n{} of {} case(s) passed",
            total - self.failed_cases(),
            total
        );
        out
    }
}
