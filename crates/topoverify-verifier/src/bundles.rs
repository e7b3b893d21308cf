use async_trait::async_trait;
use topoverify_domain::ResourceRole;
use topoverify_driver::{document, ControlPlane, Query};

use crate::engine::{host_checks, RoleBundle, Target};
use crate::report::CheckResult;

/// APIs the restricted shared-VPC project must have enabled.
pub const RESTRICTED_APIS: &[&str] = &[
    "accesscontextmanager.googleapis.com",
    "billingbudgets.googleapis.com",
];
pub const RESTRICTED_PROJECT_NUMBER_OUTPUT: &str = "restricted_shared_vpc_project_number";
pub const BASE_PROJECT_SA_OUTPUT: &str = "base_shared_vpc_project_sa";
pub const TOKEN_CREATOR_ROLE: &str = "roles/iam.serviceAccountTokenCreator";
pub const EDITOR_ROLE: &str = "roles/editor";

static RESTRICTED: RestrictedSharedVpcBundle = RestrictedSharedVpcBundle;
static BASE: BaseSharedVpcBundle = BaseSharedVpcBundle;
static FLOATING: FloatingBundle = FloatingBundle;
static PEERING: PeeringBundle = PeeringBundle;

pub fn bundle_for(role: ResourceRole) -> &'static dyn RoleBundle {
    match role {
        ResourceRole::RestrictedSharedVpcProject => &RESTRICTED,
        ResourceRole::BaseSharedVpcProject => &BASE,
        ResourceRole::FloatingProject => &FLOATING,
        ResourceRole::PeeringProject => &PEERING,
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

// ── Restricted shared-VPC service project ─────────────────────────────────────

pub struct RestrictedSharedVpcBundle;

impl RestrictedSharedVpcBundle {
    async fn apis_enabled(&self, cp: &dyn ControlPlane, project_id: &str) -> CheckResult {
        const NAME: &str = "restricted_apis_enabled";
        let services = match cp.run(&Query::ServicesList { project: project_id.to_string() }).await {
            Ok(list) => list,
            Err(e) => return CheckResult::errored(NAME, project_id, e),
        };
        let enabled = document::field_values(&services, "config.name");
        let missing: Vec<String> = RESTRICTED_APIS
            .iter()
            .filter(|api| !enabled.iter().any(|e| e.as_str() == **api))
            .map(|api| api.to_string())
            .collect();
        if missing.is_empty() {
            CheckResult::passed(NAME, project_id)
        } else {
            CheckResult::failed(
                NAME,
                project_id,
                RESTRICTED_APIS.join(", "),
                format!("missing {}", missing.join(", ")),
            )
        }
    }

    async fn perimeter_membership(&self, cp: &dyn ControlPlane, target: &Target<'_>) -> CheckResult {
        const NAME: &str = "perimeter_membership";
        let perimeter = target.ctx.perimeter.as_str();
        let number = match target.stack.get_output(RESTRICTED_PROJECT_NUMBER_OUTPUT) {
            Ok(n) => n,
            Err(e) => return CheckResult::errored(NAME, &target.stack.name, e),
        };
        let query = Query::PerimeterDescribe {
            perimeter: perimeter.to_string(),
            policy: target.ctx.policy_id.clone(),
        };
        let doc = match cp.run(&query).await {
            Ok(doc) => doc,
            Err(e) => return CheckResult::errored(NAME, perimeter, e),
        };

        let member = format!("projects/{}", number);
        let resources = document::str_list_at(&doc, "status.resources");
        if resources.contains(&member) {
            CheckResult::passed(NAME, perimeter)
        } else {
            CheckResult::failed(
                NAME,
                perimeter,
                format!("{} in perimeter resources", member),
                list_or_none(&resources),
            )
        }
    }
}

#[async_trait]
impl RoleBundle for RestrictedSharedVpcBundle {
    fn role(&self) -> ResourceRole {
        ResourceRole::RestrictedSharedVpcProject
    }

    async fn checks(&self, cp: &dyn ControlPlane, target: &Target<'_>) -> Vec<CheckResult> {
        let mut checks = vec![
            self.apis_enabled(cp, &target.project_id).await,
            self.perimeter_membership(cp, target).await,
        ];
        checks.extend(
            host_checks(
                cp,
                &target.project_id,
                self.role().host_application_label().unwrap_or_default(),
                target.case.environment.as_str(),
                &target.case.restricted_network,
            )
            .await,
        );
        checks
    }
}

// ── Base shared-VPC service project ───────────────────────────────────────────

pub struct BaseSharedVpcBundle;

impl BaseSharedVpcBundle {
    /// Token-creator binding on the project's service account: member, then role.
    async fn token_creator(&self, cp: &dyn ControlPlane, account: &str, shared_services: &str) -> [CheckResult; 2] {
        const MEMBER: &str = "sa_token_creator_member";
        const ROLE: &str = "sa_token_creator_role";
        let policy = match cp
            .run(&Query::ServiceAccountIamPolicy { account: account.to_string() })
            .await
        {
            Ok(doc) => doc,
            Err(e) => return [CheckResult::errored(MEMBER, account, &e), CheckResult::errored(ROLE, account, &e)],
        };

        let expected_member = format!("serviceAccount:{}", shared_services);
        let members = document::str_list_at(&policy, "bindings.0.members");
        let member = if members.contains(&expected_member) {
            CheckResult::passed(MEMBER, account)
        } else {
            CheckResult::failed(MEMBER, account, expected_member, list_or_none(&members))
        };

        let role = match document::str_at(&policy, "bindings.0.role") {
            Some(actual) => CheckResult::equals(ROLE, account, TOKEN_CREATOR_ROLE, actual),
            None => CheckResult::failed(ROLE, account, TOKEN_CREATOR_ROLE, "no bindings"),
        };
        [member, role]
    }

    async fn project_editor(&self, cp: &dyn ControlPlane, project_id: &str, account: &str) -> CheckResult {
        const NAME: &str = "project_editor_member";
        let query = Query::ProjectIamPolicyByRole {
            project: project_id.to_string(),
            role: EDITOR_ROLE.to_string(),
        };
        let rows = match cp.run(&query).await {
            Ok(doc) => doc,
            Err(e) => return CheckResult::errored(NAME, project_id, e),
        };

        let expected = format!("serviceAccount:{}", account);
        let Some(first) = document::first(&rows) else {
            return CheckResult::failed(NAME, project_id, expected, format!("no {} binding", EDITOR_ROLE));
        };
        let members = document::str_list_at(first, "bindings.members");
        if members.contains(&expected) {
            CheckResult::passed(NAME, project_id)
        } else {
            CheckResult::failed(NAME, project_id, expected, list_or_none(&members))
        }
    }
}

#[async_trait]
impl RoleBundle for BaseSharedVpcBundle {
    fn role(&self) -> ResourceRole {
        ResourceRole::BaseSharedVpcProject
    }

    async fn checks(&self, cp: &dyn ControlPlane, target: &Target<'_>) -> Vec<CheckResult> {
        let mut checks = Vec::new();
        match target.stack.get_output(BASE_PROJECT_SA_OUTPUT) {
            Ok(account) => {
                checks.extend(
                    self.token_creator(cp, &account, &target.ctx.shared_services_account)
                        .await,
                );
                checks.push(self.project_editor(cp, &target.project_id, &account).await);
            }
            Err(e) => {
                for name in ["sa_token_creator_member", "sa_token_creator_role", "project_editor_member"] {
                    checks.push(CheckResult::errored(name, &target.stack.name, &e));
                }
            }
        }
        checks.extend(
            host_checks(
                cp,
                &target.project_id,
                self.role().host_application_label().unwrap_or_default(),
                target.case.environment.as_str(),
                &target.case.base_network,
            )
            .await,
        );
        checks
    }
}

// ── Floating project ──────────────────────────────────────────────────────────

pub struct FloatingBundle;

#[async_trait]
impl RoleBundle for FloatingBundle {
    fn role(&self) -> ResourceRole {
        ResourceRole::FloatingProject
    }

    async fn checks(&self, cp: &dyn ControlPlane, target: &Target<'_>) -> Vec<CheckResult> {
        const NAME: &str = "no_shared_vpc_host";
        let project_id = target.project_id.as_str();
        let check = match cp.run(&Query::SharedVpcHost { project: project_id.to_string() }).await {
            Ok(host) if document::is_empty(&host) => CheckResult::passed(NAME, project_id),
            Ok(host) => {
                let actual = document::str_at(&host, "name")
                    .map(String::from)
                    .unwrap_or_else(|| host.to_string());
                CheckResult::failed(NAME, project_id, "no shared VPC host", actual)
            }
            Err(e) => CheckResult::errored(NAME, project_id, e),
        };
        vec![check]
    }
}

// ── Peering project ───────────────────────────────────────────────────────────

pub struct PeeringBundle;

#[async_trait]
impl RoleBundle for PeeringBundle {
    fn role(&self) -> ResourceRole {
        ResourceRole::PeeringProject
    }

    async fn checks(&self, cp: &dyn ControlPlane, target: &Target<'_>) -> Vec<CheckResult> {
        const NAME: &str = "peering_network";
        let project_id = target.project_id.as_str();
        let expected = format!("peering to {}", target.case.base_network);
        let check = match cp.run(&Query::PeeringsList { project: project_id.to_string() }).await {
            Ok(list) => match document::first(&list).and_then(|n| document::str_at(n, "peerings.0.network")) {
                Some(network) if network.contains(&target.case.base_network) => {
                    CheckResult::passed(NAME, project_id)
                }
                Some(network) => CheckResult::failed(NAME, project_id, expected, network),
                None => CheckResult::failed(NAME, project_id, expected, "no peerings"),
            },
            Err(e) => CheckResult::errored(NAME, project_id, e),
        };
        vec![check]
    }
}
