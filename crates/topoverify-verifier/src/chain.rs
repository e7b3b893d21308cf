use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use topoverify_domain::{Case, TopologyMode};
use topoverify_driver::{DriverError, PolicyLibrary, Provisioner, RetryPolicy, StackHandle, StackSpec};
use tracing::{debug, info};

use crate::error::ChainError;

pub const PERIMETER_OUTPUT: &str = "restricted_service_perimeter_name";
pub const SHARED_SERVICES_ACCOUNT_OUTPUT: &str = "cloudbuild_sa";
pub const SHARED_STACK_DIR: &str = "shared";

/// Run-wide values resolved once before any case starts. Read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Globals {
    pub foundation_root: PathBuf,
    pub mode: TopologyMode,
    pub policy_id: String,
    /// Principal every case stack is driven as.
    pub terraform_service_account: String,
    pub state_bucket: String,
    pub policy_library: Option<PolicyLibrary>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Network,
    Shared,
    Project,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Network => write!(f, "network"),
            Stage::Shared => write!(f, "shared"),
            Stage::Project => write!(f, "project"),
        }
    }
}

/// The three stacks a case depends on, in the order they are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPlan {
    pub network: StackSpec,
    pub shared: StackSpec,
    pub project: StackSpec,
}

/// Everything verification needs from a materialized chain.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub perimeter: String,
    pub shared_services_account: String,
    pub project: StackHandle,
}

pub fn resolve_chain(case: &Case, globals: &Globals) -> ChainPlan {
    let sa = Some(globals.terraform_service_account.clone());

    let mut network = StackSpec::new(
        format!("{}/network", case.name),
        globals
            .foundation_root
            .join(globals.mode.networks_step_dir())
            .join("envs")
            .join(case.environment.as_str()),
    )
    .var("access_context_manager_policy_id", globals.policy_id.clone());
    network.impersonate = sa.clone();

    let mut shared = StackSpec::new(format!("{}/shared", case.name), case.stack_dir(SHARED_STACK_DIR));
    shared.impersonate = sa.clone();

    let mut project = StackSpec::new(
        format!("{}/project", case.name),
        case.stack_dir(case.environment.as_str()),
    )
    .var("backend_bucket", globals.state_bucket.clone())
    .var("access_context_manager_policy_id", globals.policy_id.clone())
    .backend("bucket", globals.state_bucket.clone());
    project.impersonate = sa;
    project.policy_library = globals.policy_library.clone();
    project.retry = Some(globals.retry.clone());

    ChainPlan { network, shared, project }
}

/// Read the upstream outputs, then apply the project stack (or only read its
/// outputs when `apply` is false).
pub async fn materialize(
    plan: &ChainPlan,
    provisioner: &dyn Provisioner,
    apply: bool,
) -> Result<Materialized, ChainError> {
    let at = |stage: Stage| move |source: DriverError| ChainError { stage, source };

    let network = provisioner.outputs(&plan.network).await.map_err(at(Stage::Network))?;
    let perimeter = network.get_output(PERIMETER_OUTPUT).map_err(at(Stage::Network))?;
    debug!(stack = %plan.network.name, %perimeter, "network outputs read");

    let shared = provisioner.outputs(&plan.shared).await.map_err(at(Stage::Shared))?;
    let shared_services_account = shared
        .get_output(SHARED_SERVICES_ACCOUNT_OUTPUT)
        .map_err(at(Stage::Shared))?;

    let project = if apply {
        info!(stack = %plan.project.name, provisioner = provisioner.name(), "applying project stack");
        provisioner.apply(&plan.project).await
    } else {
        provisioner.outputs(&plan.project).await
    }
    .map_err(at(Stage::Project))?;

    Ok(Materialized {
        perimeter,
        shared_services_account,
        project,
    })
}
