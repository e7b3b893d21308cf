use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::DomainError;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessUnitId(pub String);

impl BusinessUnitId {
    pub fn new(s: impl Into<String>) -> Self {
        BusinessUnitId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BusinessUnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A business unit of the foundation, e.g. `bu1` living under `4-projects/business_unit_1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessUnit {
    pub id: BusinessUnitId,
    /// Directory name under the projects step.
    pub dir: String,
}

impl BusinessUnit {
    pub fn new(id: impl Into<String>, dir: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        let dir = dir.into();
        let valid = !id.is_empty()
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !dir.is_empty()
            && !dir.contains('/');
        if !valid {
            return Err(DomainError::InvalidBusinessUnit(id));
        }
        Ok(BusinessUnit { id: BusinessUnitId(id), dir })
    }
}

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Development,
    NonProduction,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::Development,
        Environment::NonProduction,
        Environment::Production,
    ];

    /// Identifier used for stack directories and the `environment` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::NonProduction => "non-production",
            Environment::Production => "production",
        }
    }

    /// Single-letter code embedded in network names (`d`, `n`, `p`).
    pub fn code(&self) -> char {
        match self {
            Environment::Development => 'd',
            Environment::NonProduction => 'n',
            Environment::Production => 'p',
        }
    }
}

impl FromStr for Environment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| DomainError::UnknownEnvironment(s.to_string()))
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network layout of the foundation. Resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyMode {
    SingleVpc,
    HubAndSpoke,
}

impl TopologyMode {
    /// Interpret the foundation's `example_foundations_mode` variable.
    /// Only the literal `HubAndSpoke` selects hub-and-spoke.
    pub fn from_foundation_value(value: &str) -> Self {
        if value == "HubAndSpoke" {
            TopologyMode::HubAndSpoke
        } else {
            TopologyMode::SingleVpc
        }
    }

    pub fn network_suffix(&self) -> &'static str {
        match self {
            TopologyMode::SingleVpc => "",
            TopologyMode::HubAndSpoke => "-spoke",
        }
    }

    /// Directory of the networks step that provisions this layout.
    pub fn networks_step_dir(&self) -> &'static str {
        match self {
            TopologyMode::SingleVpc => "3-networks-dual-svpc",
            TopologyMode::HubAndSpoke => "3-networks-hub-and-spoke",
        }
    }
}

impl std::fmt::Display for TopologyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyMode::SingleVpc => write!(f, "single-vpc"),
            TopologyMode::HubAndSpoke => write!(f, "hub-and-spoke"),
        }
    }
}

/// Logical category of a project under verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceRole {
    BaseSharedVpcProject,
    FloatingProject,
    PeeringProject,
    RestrictedSharedVpcProject,
}

impl ResourceRole {
    pub const ALL: [ResourceRole; 4] = [
        ResourceRole::BaseSharedVpcProject,
        ResourceRole::FloatingProject,
        ResourceRole::PeeringProject,
        ResourceRole::RestrictedSharedVpcProject,
    ];

    /// Project-stack output holding this role's project id.
    pub fn output_key(&self) -> &'static str {
        match self {
            ResourceRole::BaseSharedVpcProject => "base_shared_vpc_project",
            ResourceRole::FloatingProject => "floating_project",
            ResourceRole::PeeringProject => "peering_project",
            ResourceRole::RestrictedSharedVpcProject => "restricted_shared_vpc_project",
        }
    }

    /// Expected `application_name` label of the shared-VPC host, for roles that have one.
    pub fn host_application_label(&self) -> Option<&'static str> {
        match self {
            ResourceRole::BaseSharedVpcProject => Some("base-shared-vpc-host"),
            ResourceRole::RestrictedSharedVpcProject => Some("restricted-shared-vpc-host"),
            ResourceRole::FloatingProject | ResourceRole::PeeringProject => None,
        }
    }
}

impl std::fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceRole::BaseSharedVpcProject => write!(f, "base-shared-vpc-project"),
            ResourceRole::FloatingProject => write!(f, "floating-project"),
            ResourceRole::PeeringProject => write!(f, "peering-project"),
            ResourceRole::RestrictedSharedVpcProject => write!(f, "restricted-shared-vpc-project"),
        }
    }
}

// ── Core structs ──────────────────────────────────────────────────────────────

/// One business-unit × environment combination to verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    /// `{bu}_{environment}`, e.g. `bu1_development`.
    pub name: String,
    pub business_unit: BusinessUnit,
    pub environment: Environment,
    /// Business unit directory under the projects step; stacks live below it.
    pub base_dir: PathBuf,
    /// Expected name of the base shared VPC network.
    pub base_network: String,
    /// Expected name of the restricted shared VPC network.
    pub restricted_network: String,
}

impl Case {
    /// Directory of a stack below this case's business unit, e.g. `shared` or `development`.
    pub fn stack_dir(&self, leaf: &str) -> PathBuf {
        self.base_dir.join(leaf)
    }
}
