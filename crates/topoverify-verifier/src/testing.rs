//! In-memory collaborators and a bu1/development fixture shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use topoverify_config::{build_cases, Matrix};
use topoverify_domain::{Case, Environment, TopologyMode};
use topoverify_driver::{
    ControlPlane, Document, DriverError, Provisioner, Query, QueryError, QueryErrorKind, RetryPolicy, StackHandle,
    StackSpec,
};

use crate::chain::{resolve_chain, Globals};
use crate::engine::VerifyContext;

pub const ROOT: &str = "/foundation";
pub const ORG_ID: &str = "111111111111";
pub const POLICY_ID: &str = "123456";
pub const TERRAFORM_SA: &str = "sa-terraform-proj@prj-b-seed.iam.gserviceaccount.com";
pub const STATE_BUCKET: &str = "bkt-b-tfstate";
pub const PERIMETER: &str = "sp_d_shared_restricted_default_perimeter_f8fb";
pub const CLOUDBUILD_SA: &str = "sa-tf-cb-bu1-example-app@prj-b-cicd.iam.gserviceaccount.com";

pub const BASE: &str = "prj-d-bu1-sample-base";
pub const FLOATING: &str = "prj-d-bu1-sample-floating";
pub const PEERING: &str = "prj-d-bu1-sample-peering";
pub const RESTRICTED: &str = "prj-d-bu1-sample-restrict";
pub const RESTRICTED_NUMBER: &str = "12345";
pub const BASE_SA: &str = "sa-example-app@prj-d-bu1-sample-base.iam.gserviceaccount.com";
pub const BASE_HOST: &str = "prj-d-shared-base";
pub const RESTRICTED_HOST: &str = "prj-d-shared-restricted";

pub fn cases(environments: &[Environment]) -> Vec<Case> {
    build_cases(
        Path::new(ROOT),
        &Matrix::default().business_units,
        environments,
        TopologyMode::SingleVpc,
    )
}

/// `bu1_development`, single-VPC.
pub fn case() -> Case {
    cases(&[Environment::Development]).remove(0)
}

pub fn globals() -> Globals {
    Globals {
        foundation_root: PathBuf::from(ROOT),
        mode: TopologyMode::SingleVpc,
        policy_id: POLICY_ID.into(),
        terraform_service_account: TERRAFORM_SA.into(),
        state_bucket: STATE_BUCKET.into(),
        policy_library: None,
        retry: RetryPolicy::transient().unwrap(),
    }
}

pub fn context() -> VerifyContext {
    VerifyContext {
        perimeter: PERIMETER.into(),
        policy_id: POLICY_ID.into(),
        shared_services_account: CLOUDBUILD_SA.into(),
    }
}

pub fn project_outputs() -> HashMap<String, Value> {
    HashMap::from([
        ("base_shared_vpc_project".to_string(), json!(BASE)),
        ("floating_project".to_string(), json!(FLOATING)),
        ("peering_project".to_string(), json!(PEERING)),
        ("restricted_shared_vpc_project".to_string(), json!(RESTRICTED)),
        ("restricted_shared_vpc_project_number".to_string(), json!(RESTRICTED_NUMBER)),
        ("base_shared_vpc_project_sa".to_string(), json!(BASE_SA)),
    ])
}

pub fn project_stack() -> StackHandle {
    StackHandle::new(
        "bu1_development/project",
        "/foundation/4-projects/business_unit_1/development",
        project_outputs(),
    )
}

// ── FakeControlPlane ──────────────────────────────────────────────────────────

/// Canned responses keyed by query; anything unknown is `NotFound`.
pub struct FakeControlPlane {
    responses: HashMap<Query, Result<Document, QueryErrorKind>>,
    calls: Mutex<Vec<Query>>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with(mut self, query: Query, doc: Document) -> Self {
        self.responses.insert(query, Ok(doc));
        self
    }

    pub fn fail(mut self, query: Query, kind: QueryErrorKind) -> Self {
        self.responses.insert(query, Err(kind));
        self
    }

    pub fn calls(&self) -> Vec<Query> {
        self.calls.lock().unwrap().clone()
    }

    /// State in which every check of `case` passes.
    pub fn healthy(case: &Case) -> Self {
        let env = case.environment.as_str();
        let project = |id: &str| json!({ "projectId": id, "lifecycleState": "ACTIVE" });
        let host = |id: &str, app: &str| {
            json!({
                "projectId": id,
                "lifecycleState": "ACTIVE",
                "labels": { "application_name": app, "environment": env },
            })
        };

        Self::new()
            .with(Query::ProjectDescribe { project: BASE.into() }, project(BASE))
            .with(Query::ProjectDescribe { project: FLOATING.into() }, project(FLOATING))
            .with(Query::ProjectDescribe { project: PEERING.into() }, project(PEERING))
            .with(Query::ProjectDescribe { project: RESTRICTED.into() }, project(RESTRICTED))
            .with(
                Query::ServicesList { project: RESTRICTED.into() },
                json!([
                    { "config": { "name": "accesscontextmanager.googleapis.com" } },
                    { "config": { "name": "billingbudgets.googleapis.com" } },
                    { "config": { "name": "compute.googleapis.com" } },
                ]),
            )
            .with(
                Query::PerimeterDescribe {
                    perimeter: PERIMETER.into(),
                    policy: POLICY_ID.into(),
                },
                json!({ "status": { "resources": ["projects/777", format!("projects/{}", RESTRICTED_NUMBER)] } }),
            )
            .with(Query::SharedVpcHost { project: RESTRICTED.into() }, json!({ "name": RESTRICTED_HOST }))
            .with(Query::SharedVpcHost { project: BASE.into() }, json!({ "name": BASE_HOST }))
            .with(Query::SharedVpcHost { project: FLOATING.into() }, Value::Null)
            .with(
                Query::ProjectDescribe { project: RESTRICTED_HOST.into() },
                host(RESTRICTED_HOST, "restricted-shared-vpc-host"),
            )
            .with(
                Query::ProjectDescribe { project: BASE_HOST.into() },
                host(BASE_HOST, "base-shared-vpc-host"),
            )
            .with(
                Query::NetworksList { project: RESTRICTED_HOST.into() },
                json!([{ "name": case.restricted_network }, { "name": "default" }]),
            )
            .with(
                Query::NetworksList { project: BASE_HOST.into() },
                json!([{ "name": case.base_network }]),
            )
            .with(
                Query::ServiceAccountIamPolicy { account: BASE_SA.into() },
                json!({
                    "bindings": [{
                        "role": "roles/iam.serviceAccountTokenCreator",
                        "members": [format!("serviceAccount:{}", CLOUDBUILD_SA)],
                    }]
                }),
            )
            .with(
                Query::ProjectIamPolicyByRole {
                    project: BASE.into(),
                    role: "roles/editor".into(),
                },
                json!([{ "bindings": { "role": "roles/editor", "members": [format!("serviceAccount:{}", BASE_SA)] } }]),
            )
            .with(
                Query::PeeringsList { project: PEERING.into() },
                json!([{
                    "name": "vpc-d-peering-base",
                    "peerings": [{
                        "network": format!(
                            "https://www.googleapis.com/compute/v1/projects/{}/global/networks/{}",
                            BASE_HOST, case.base_network
                        ),
                    }],
                }]),
            )
            .with(
                Query::AccessPolicies { organization: ORG_ID.into() },
                json!([{ "name": format!("accessPolicies/{}", POLICY_ID), "title": "default policy" }]),
            )
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn run(&self, query: &Query) -> Result<Document, QueryError> {
        self.calls.lock().unwrap().push(query.clone());
        match self.responses.get(query) {
            Some(Ok(doc)) => Ok(doc.clone()),
            Some(Err(kind)) => Err(QueryError::new(*kind, query.to_string(), "canned failure")),
            None => Err(QueryError::new(QueryErrorKind::NotFound, query.to_string(), "no canned response")),
        }
    }
}

// ── FakeProvisioner ───────────────────────────────────────────────────────────

/// Stacks keyed by directory. A directory without outputs reads as an empty stack.
///
/// Every call marks its directory busy for the call's duration; a second call
/// arriving meanwhile is recorded in `overlaps`.
pub struct FakeProvisioner {
    outputs: HashMap<PathBuf, HashMap<String, Value>>,
    failures: HashMap<PathBuf, String>,
    destroy_failures: HashMap<PathBuf, String>,
    delays: HashMap<PathBuf, Duration>,
    applied: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
    busy: Mutex<HashSet<PathBuf>>,
    overlaps: Mutex<Vec<PathBuf>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            failures: HashMap::new(),
            destroy_failures: HashMap::new(),
            delays: HashMap::new(),
            applied: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            busy: Mutex::new(HashSet::new()),
            overlaps: Mutex::new(Vec::new()),
        }
    }

    pub fn stack(mut self, dir: impl Into<PathBuf>, outputs: HashMap<String, Value>) -> Self {
        self.outputs.insert(dir.into(), outputs);
        self
    }

    pub fn without_stack(mut self, dir: &Path) -> Self {
        self.outputs.remove(dir);
        self
    }

    pub fn failing(mut self, dir: &Path, message: &str) -> Self {
        self.failures.insert(dir.to_path_buf(), message.to_string());
        self
    }

    pub fn failing_destroy(mut self, dir: &Path, message: &str) -> Self {
        self.destroy_failures.insert(dir.to_path_buf(), message.to_string());
        self
    }

    /// Every call in `dir` takes at least `delay`.
    pub fn slow(mut self, dir: &Path, delay: Duration) -> Self {
        self.delays.insert(dir.to_path_buf(), delay);
        self
    }

    /// Bootstrap and setup stacks for `root`.
    pub fn with_foundation(self) -> Self {
        self.stack(
            Path::new(ROOT).join("0-bootstrap"),
            HashMap::from([
                ("projects_step_terraform_service_account_email".to_string(), json!(TERRAFORM_SA)),
                ("gcs_bucket_tfstate".to_string(), json!(STATE_BUCKET)),
            ]),
        )
        .stack(
            Path::new(ROOT).join("test/setup"),
            HashMap::from([("project_id".to_string(), json!("prj-test-setup"))]),
        )
    }

    /// Network, shared and project stacks of `case` with healthy outputs.
    pub fn with_case(self, case: &Case) -> Self {
        let plan = resolve_chain(case, &globals());
        self.stack(
            plan.network.dir,
            HashMap::from([("restricted_service_perimeter_name".to_string(), json!(PERIMETER))]),
        )
        .stack(plan.shared.dir, HashMap::from([("cloudbuild_sa".to_string(), json!(CLOUDBUILD_SA))]))
        .stack(plan.project.dir, project_outputs())
    }

    pub fn healthy(case: &Case) -> Self {
        Self::new().with_case(case)
    }

    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }

    /// Directories that saw two calls at once, in detection order.
    pub fn overlaps(&self) -> Vec<PathBuf> {
        self.overlaps.lock().unwrap().clone()
    }

    async fn occupy(&self, dir: &Path) {
        if !self.busy.lock().unwrap().insert(dir.to_path_buf()) {
            self.overlaps.lock().unwrap().push(dir.to_path_buf());
        }
        let delay = self.delays.get(dir).copied().unwrap_or(Duration::ZERO);
        tokio::time::sleep(delay).await;
        self.busy.lock().unwrap().remove(dir);
    }

    fn handle(&self, spec: &StackSpec) -> StackHandle {
        let outputs = self.outputs.get(&spec.dir).cloned().unwrap_or_default();
        StackHandle::new(spec.name.clone(), spec.dir.clone(), outputs)
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn apply(&self, spec: &StackSpec) -> Result<StackHandle, DriverError> {
        self.occupy(&spec.dir).await;
        if let Some(message) = self.failures.get(&spec.dir) {
            return Err(DriverError::ProvisionFailed {
                stack: spec.name.clone(),
                message: message.clone(),
            });
        }
        self.applied.lock().unwrap().push(spec.name.clone());
        Ok(self.handle(spec))
    }

    async fn outputs(&self, spec: &StackSpec) -> Result<StackHandle, DriverError> {
        self.occupy(&spec.dir).await;
        Ok(self.handle(spec))
    }

    async fn destroy(&self, spec: &StackSpec) -> Result<(), DriverError> {
        self.occupy(&spec.dir).await;
        if let Some(message) = self.destroy_failures.get(&spec.dir) {
            return Err(DriverError::TeardownFailed {
                stack: spec.name.clone(),
                message: message.clone(),
            });
        }
        self.destroyed.lock().unwrap().push(spec.name.clone());
        Ok(())
    }
}
