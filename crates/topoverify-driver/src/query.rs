use serde::{Deserialize, Serialize};

/// A read-only control-plane request.
///
/// Each variant corresponds to one gcloud describe/list command; [`Query::args`]
/// renders it. Results are in gcloud's `--format json` shape regardless of the
/// backend that serves them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Query {
    /// Project resource: `lifecycleState`, `projectNumber`, `labels`.
    ProjectDescribe { project: String },
    /// Array of enabled services, each with `config.name`.
    ServicesList { project: String },
    /// Service perimeter with `status.resources`.
    PerimeterDescribe { perimeter: String, policy: String },
    /// Host project of a shared-VPC service project; empty when there is none.
    SharedVpcHost { project: String },
    /// Array of networks in listing order.
    NetworksList { project: String },
    /// Array of networks, each with its `peerings`.
    PeeringsList { project: String },
    /// Service account IAM policy with ordered `bindings`.
    ServiceAccountIamPolicy { account: String },
    /// Project IAM policy flattened per binding and filtered to one role:
    /// an array of `{ "bindings": { "role", "members" } }`.
    ProjectIamPolicyByRole { project: String, role: String },
    /// Array of access policies of an organization.
    AccessPolicies { organization: String },
}

impl Query {
    /// gcloud arguments, without output format or impersonation flags.
    pub fn args(&self) -> Vec<String> {
        let v = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match self {
            Query::ProjectDescribe { project } => v(&["projects", "describe", project]),
            Query::ServicesList { project } => v(&["services", "list", "--project", project]),
            Query::PerimeterDescribe { perimeter, policy } => v(&[
                "access-context-manager",
                "perimeters",
                "describe",
                perimeter,
                "--policy",
                policy,
            ]),
            Query::SharedVpcHost { project } => v(&["compute", "shared-vpc", "get-host-project", project]),
            Query::NetworksList { project } => v(&["compute", "networks", "list", "--project", project]),
            Query::PeeringsList { project } => {
                v(&["compute", "networks", "peerings", "list", "--project", project])
            }
            Query::ServiceAccountIamPolicy { account } => {
                v(&["iam", "service-accounts", "get-iam-policy", account])
            }
            Query::ProjectIamPolicyByRole { project, role } => v(&[
                "projects",
                "get-iam-policy",
                project,
                "--flatten",
                "bindings",
                "--filter",
                &format!("bindings.role:{}", role),
            ]),
            Query::AccessPolicies { organization } => v(&[
                "access-context-manager",
                "policies",
                "list",
                &format!("--organization={}", organization),
            ]),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gcloud {}", self.args().join(" "))
    }
}
