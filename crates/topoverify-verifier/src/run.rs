use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use topoverify_config::FoundationEnv;
use topoverify_domain::Case;
use topoverify_driver::{ControlPlane, PolicyLibrary, Provisioner, RetryPolicy, StackSpec};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain::{materialize, resolve_chain, Globals};
use crate::engine::{verify, VerifyContext};
use crate::error::{ConfigurationError, RunError};
use crate::report::{CaseOutcome, CaseReport, RunReport, Teardown};
use crate::resolver::get_organization_policy_id;
use crate::serial::PerDirProvisioner;

pub const BOOTSTRAP_DIR: &str = "0-bootstrap";
pub const DEFAULT_SETUP_DIR: &str = "test/setup";
pub const TERRAFORM_SA_OUTPUT: &str = "projects_step_terraform_service_account_email";
pub const STATE_BUCKET_OUTPUT: &str = "gcs_bucket_tfstate";
pub const SETUP_PROJECT_OUTPUT: &str = "project_id";

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub foundation_root: PathBuf,
    pub foundation: FoundationEnv,
    /// Matrix order; the report keeps it.
    pub cases: Vec<Case>,
    /// Cases in flight at once. `1` runs them one after another.
    pub concurrency: usize,
    pub case_timeout: Option<Duration>,
    /// Read existing project outputs instead of applying.
    pub verify_only: bool,
    /// Destroy each applied project stack once it has been verified.
    /// Ignored with `verify_only`.
    pub teardown: bool,
    pub policy_library: Option<PathBuf>,
    /// Stack whose `project_id` output the policy library validates against.
    /// Defaults to `{foundation_root}/test/setup`.
    pub setup_dir: Option<PathBuf>,
}

/// Resolve globals once, then verify every case over a bounded pool.
pub async fn run(
    req: RunRequest,
    control_plane: Arc<dyn ControlPlane>,
    provisioner: Arc<dyn Provisioner>,
) -> Result<RunReport, RunError> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(
        %run_id,
        cases = req.cases.len(),
        mode = %req.foundation.mode,
        control_plane = control_plane.name(),
        provisioner = provisioner.name(),
        "starting verification run"
    );

    let provisioner: Arc<dyn Provisioner> = Arc::new(PerDirProvisioner::new(provisioner));
    let globals = Arc::new(resolve_globals(&req, control_plane.as_ref(), provisioner.as_ref()).await?);

    let semaphore = Arc::new(Semaphore::new(req.concurrency.max(1)));
    let mut set = JoinSet::new();
    for (index, case) in req.cases.iter().cloned().enumerate() {
        let globals = globals.clone();
        let control_plane = control_plane.clone();
        let provisioner = provisioner.clone();
        let semaphore = semaphore.clone();
        let mode = CaseMode {
            apply: !req.verify_only,
            teardown: req.teardown && !req.verify_only,
            deadline: req.case_timeout,
        };
        set.spawn(async move {
            // The semaphore is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            let report = run_case(&case, &globals, control_plane.as_ref(), provisioner.as_ref(), mode).await;
            (index, report)
        });
    }

    let mut slots: Vec<Option<CaseReport>> = vec![None; req.cases.len()];
    while let Some(joined) = set.join_next().await {
        let (index, report) = joined.map_err(|e| RunError::Internal(format!("case task failed: {}", e)))?;
        slots[index] = Some(report);
    }

    let report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        mode: req.foundation.mode,
        verify_only: req.verify_only,
        cases: slots.into_iter().flatten().collect(),
    };
    info!(%run_id, passed = report.passed(), failed_cases = report.failed_cases(), "verification run finished");
    Ok(report)
}

/// Organization policy id, bootstrap outputs, and (with a policy library) the
/// setup project id. Any failure stops the run before a case starts.
pub async fn resolve_globals(
    req: &RunRequest,
    control_plane: &dyn ControlPlane,
    provisioner: &dyn Provisioner,
) -> Result<Globals, ConfigurationError> {
    let policy_id = get_organization_policy_id(control_plane, &req.foundation.org_id).await?;

    let bootstrap = provisioner
        .outputs(&StackSpec::new("bootstrap", req.foundation_root.join(BOOTSTRAP_DIR)))
        .await
        .map_err(|source| ConfigurationError::Stack { stack: "bootstrap", source })?;
    let read = |key: &str| {
        bootstrap
            .get_output(key)
            .map_err(|source| ConfigurationError::Stack { stack: "bootstrap", source })
    };
    let terraform_service_account = read(TERRAFORM_SA_OUTPUT)?;
    let state_bucket = read(STATE_BUCKET_OUTPUT)?;

    let policy_library = match &req.policy_library {
        Some(path) => {
            let setup_dir = req
                .setup_dir
                .clone()
                .unwrap_or_else(|| req.foundation_root.join(DEFAULT_SETUP_DIR));
            let project_id = provisioner
                .outputs(&StackSpec::new("setup", setup_dir))
                .await
                .and_then(|setup| setup.get_output(SETUP_PROJECT_OUTPUT))
                .map_err(|source| ConfigurationError::Stack { stack: "setup", source })?;
            Some(PolicyLibrary {
                path: path.clone(),
                project_id,
            })
        }
        None => None,
    };

    let retry = RetryPolicy::transient().map_err(ConfigurationError::Retry)?;
    info!(policy = %policy_id, principal = %terraform_service_account, "globals resolved");

    Ok(Globals {
        foundation_root: req.foundation_root.clone(),
        mode: req.foundation.mode,
        policy_id,
        terraform_service_account,
        state_bucket,
        policy_library,
        retry,
    })
}

#[derive(Debug, Clone, Copy)]
struct CaseMode {
    apply: bool,
    teardown: bool,
    deadline: Option<Duration>,
}

async fn run_case(
    case: &Case,
    globals: &Globals,
    control_plane: &dyn ControlPlane,
    provisioner: &dyn Provisioner,
    mode: CaseMode,
) -> CaseReport {
    let started = Instant::now();
    info!(case = %case.name, "case started");

    let pipeline = verify_case(case, globals, control_plane, provisioner, mode);
    let (outcome, teardown) = match mode.deadline {
        Some(limit) => match tokio::time::timeout(limit, pipeline).await {
            Ok(done) => done,
            Err(_) => {
                let after_ms = limit.as_millis() as u64;
                warn!(case = %case.name, after_ms, "case timed out");
                (CaseOutcome::TimedOut { after_ms }, None)
            }
        },
        None => pipeline.await,
    };

    CaseReport {
        case: case.name.clone(),
        environment: case.environment,
        outcome,
        teardown,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Materialize, verify, then (in teardown mode) destroy the project stack.
/// A chain that fails to materialize is left for the operator to inspect.
async fn verify_case(
    case: &Case,
    globals: &Globals,
    control_plane: &dyn ControlPlane,
    provisioner: &dyn Provisioner,
    mode: CaseMode,
) -> (CaseOutcome, Option<Teardown>) {
    let plan = resolve_chain(case, globals);
    let chain = match materialize(&plan, provisioner, mode.apply).await {
        Ok(chain) => chain,
        Err(e) => {
            warn!(case = %case.name, stage = %e.stage, error = %e.source, "provisioning failed");
            let outcome = CaseOutcome::ProvisioningFailed {
                stage: e.stage,
                message: e.source.to_string(),
            };
            return (outcome, None);
        }
    };

    let ctx = VerifyContext {
        perimeter: chain.perimeter,
        policy_id: globals.policy_id.clone(),
        shared_services_account: chain.shared_services_account,
    };
    let roles = verify(control_plane, &chain.project, case, &ctx).await;
    info!(
        case = %case.name,
        passed = roles.iter().all(|r| r.passed()),
        "case verified"
    );

    let teardown = if mode.teardown {
        Some(match provisioner.destroy(&plan.project).await {
            Ok(()) => Teardown::Destroyed,
            Err(e) => {
                warn!(case = %case.name, error = %e, "teardown failed");
                Teardown::Failed { message: e.to_string() }
            }
        })
    } else {
        None
    };
    (CaseOutcome::Verified { roles }, teardown)
}
