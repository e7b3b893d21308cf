//! Verification engine: per-role assertion bundles against live control-plane state.
//!
//! Every role gets `lifecycle_active` first, then its own bundle. Roles run
//! concurrently; checks inside a role run in order because later checks use
//! earlier results (the host project id, for one). Nothing here retries: a
//! failed read becomes an errored check and its siblings carry on.

use async_trait::async_trait;
use topoverify_domain::{Case, ResourceRole};
use topoverify_driver::{document, ControlPlane, Query, StackHandle};
use tracing::debug;

use crate::bundles::bundle_for;
use crate::report::{CheckResult, RoleReport};

pub const PROJECT_ID_OUTPUT_CHECK: &str = "project_id_output";
pub const LIFECYCLE_CHECK: &str = "lifecycle_active";

/// Per-case values the bundles compare against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyContext {
    pub perimeter: String,
    pub policy_id: String,
    /// Account the project step's build pipeline runs as.
    pub shared_services_account: String,
}

/// What a bundle looks at: one role's project within a case.
pub struct Target<'a> {
    pub project_id: String,
    pub stack: &'a StackHandle,
    pub case: &'a Case,
    pub ctx: &'a VerifyContext,
}

/// The role-specific checks, after `lifecycle_active`.
#[async_trait]
pub trait RoleBundle: Send + Sync {
    fn role(&self) -> ResourceRole;

    async fn checks(&self, control_plane: &dyn ControlPlane, target: &Target<'_>) -> Vec<CheckResult>;
}

pub async fn verify(
    control_plane: &dyn ControlPlane,
    stack: &StackHandle,
    case: &Case,
    ctx: &VerifyContext,
) -> Vec<RoleReport> {
    let [a, b, c, d] = ResourceRole::ALL;
    let (a, b, c, d) = tokio::join!(
        verify_role(control_plane, a, stack, case, ctx),
        verify_role(control_plane, b, stack, case, ctx),
        verify_role(control_plane, c, stack, case, ctx),
        verify_role(control_plane, d, stack, case, ctx),
    );
    vec![a, b, c, d]
}

async fn verify_role(
    control_plane: &dyn ControlPlane,
    role: ResourceRole,
    stack: &StackHandle,
    case: &Case,
    ctx: &VerifyContext,
) -> RoleReport {
    let project_id = match stack.get_output(role.output_key()) {
        Ok(id) => id,
        Err(e) => {
            return RoleReport {
                role,
                project_id: None,
                checks: vec![CheckResult::errored(PROJECT_ID_OUTPUT_CHECK, &stack.name, e)],
            };
        }
    };

    let mut checks = vec![lifecycle_check(control_plane, &project_id).await];
    let target = Target {
        project_id: project_id.clone(),
        stack,
        case,
        ctx,
    };
    checks.extend(bundle_for(role).checks(control_plane, &target).await);

    debug!(
        case = %case.name,
        %role,
        project = %project_id,
        failed = checks.iter().filter(|c| !c.is_pass()).count(),
        "role verified"
    );
    RoleReport {
        role,
        project_id: Some(project_id),
        checks,
    }
}

async fn lifecycle_check(control_plane: &dyn ControlPlane, project_id: &str) -> CheckResult {
    match control_plane
        .run(&Query::ProjectDescribe {
            project: project_id.to_string(),
        })
        .await
    {
        Ok(doc) => CheckResult::equals(
            LIFECYCLE_CHECK,
            project_id,
            "ACTIVE",
            document::str_at(&doc, "lifecycleState").unwrap_or(""),
        ),
        Err(e) => CheckResult::errored(LIFECYCLE_CHECK, project_id, e),
    }
}

/// Shared-VPC host checks for a service project.
///
/// Records `shared_vpc_host_attached`; only when a host is found are the label
/// and network checks recorded against it.
pub(crate) async fn host_checks(
    control_plane: &dyn ControlPlane,
    project_id: &str,
    application_label: &str,
    environment_label: &str,
    expected_network: &str,
) -> Vec<CheckResult> {
    let host = match control_plane
        .run(&Query::SharedVpcHost {
            project: project_id.to_string(),
        })
        .await
    {
        Ok(doc) => doc,
        Err(e) => return vec![CheckResult::errored("shared_vpc_host_attached", project_id, e)],
    };
    let host_id = match document::str_at(&host, "name") {
        Some(name) if !document::is_empty(&host) => name.to_string(),
        _ => {
            return vec![CheckResult::failed(
                "shared_vpc_host_attached",
                project_id,
                "a shared VPC host project",
                "none",
            )]
        }
    };
    let mut checks = vec![CheckResult::passed("shared_vpc_host_attached", project_id)];

    match control_plane
        .run(&Query::ProjectDescribe {
            project: host_id.clone(),
        })
        .await
    {
        Ok(doc) => {
            checks.push(CheckResult::equals(
                "host_application_label",
                &host_id,
                application_label,
                document::str_at(&doc, "labels.application_name").unwrap_or(""),
            ));
            checks.push(CheckResult::equals(
                "host_environment_label",
                &host_id,
                environment_label,
                document::str_at(&doc, "labels.environment").unwrap_or(""),
            ));
        }
        Err(e) => {
            checks.push(CheckResult::errored("host_application_label", &host_id, &e));
            checks.push(CheckResult::errored("host_environment_label", &host_id, &e));
        }
    }

    let network = match control_plane
        .run(&Query::NetworksList {
            project: host_id.clone(),
        })
        .await
    {
        Ok(list) => match document::first(&list) {
            Some(first) => CheckResult::equals(
                "host_network_name",
                &host_id,
                expected_network,
                document::str_at(first, "name").unwrap_or(""),
            ),
            None => CheckResult::failed("host_network_name", &host_id, expected_network, "no networks"),
        },
        Err(e) => CheckResult::errored("host_network_name", &host_id, e),
    };
    checks.push(network);
    checks
}
