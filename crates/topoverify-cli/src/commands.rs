use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use topoverify_config::{build_cases, env::MODE_VAR, filter_cases, load_matrix, EnvSource, FoundationEnv, Matrix, ProcessEnv};
use topoverify_domain::{Case, TopologyMode};
use topoverify_driver::{ControlPlane, GcloudCli, GcpRestControlPlane, Provisioner, TerraformProvisioner};
use topoverify_verifier::RunRequest;
use tempfile::TempDir;
use tracing::info;

use crate::cli::{ControlPlaneArg, MatrixArgs, RunArgs};
use crate::output;

// ── Run ───────────────────────────────────────────────────────────────────────

/// `Ok(true)` when every case passed.
pub async fn run(args: RunArgs) -> Result<bool> {
    let foundation = FoundationEnv::load(&ProcessEnv).context("Failed to read foundation settings")?;
    let cases = select_cases(&args.matrix, foundation.mode)?;
    if cases.is_empty() {
        anyhow::bail!("no case matches --run {}", args.matrix.filter.as_deref().unwrap_or(""));
    }

    let control_plane: Arc<dyn ControlPlane> = match args.control_plane {
        ControlPlaneArg::Gcloud => {
            let mut cli = GcloudCli::new(args.impersonate.clone());
            cli.binary = args.gcloud.clone();
            Arc::new(cli)
        }
        ControlPlaneArg::Rest => Arc::new(
            GcpRestControlPlane::from_adc(args.impersonate.clone())
                .await
                .context("Failed to initialise GCP REST client")?,
        ),
    };

    // Held until the run ends; dropping it removes the generated files.
    let (scratch_dir, _scratch_guard) = scratch_dir(args.scratch_dir.clone())?;
    let mut terraform = TerraformProvisioner::new(&scratch_dir);
    terraform.binary = args.terraform.clone();
    terraform.gcloud = args.gcloud.clone();
    let provisioner: Arc<dyn Provisioner> = Arc::new(terraform);

    info!(cases = cases.len(), scratch = %scratch_dir.display(), "running cases");
    let req = RunRequest {
        foundation_root: args.matrix.foundation_root.clone(),
        foundation,
        cases,
        concurrency: args.concurrency,
        case_timeout: args.case_timeout.map(Duration::from_secs),
        verify_only: args.verify_only,
        teardown: args.teardown,
        policy_library: args.policy_library.clone(),
        setup_dir: args.setup_dir.clone(),
    };

    let report = topoverify_verifier::run(req, control_plane, provisioner)
        .await
        .context("Verification run could not start")?;
    println!("{}", output::render_report(&report, args.matrix.output)?);
    Ok(report.passed())
}

/// An explicit directory is kept; the default is a temp dir removed with its guard.
fn scratch_dir(explicit: Option<PathBuf>) -> Result<(PathBuf, Option<TempDir>)> {
    match explicit {
        Some(dir) => Ok((dir, None)),
        None => {
            let dir = tempfile::Builder::new()
                .prefix("topoverify-")
                .tempdir()
                .context("Failed to create scratch directory")?;
            Ok((dir.path().to_path_buf(), Some(dir)))
        }
    }
}

// ── Cases ─────────────────────────────────────────────────────────────────────

pub fn cases(args: MatrixArgs) -> Result<bool> {
    let raw_mode = ProcessEnv
        .value_from_env(MODE_VAR)
        .context("Failed to read topology mode")?;
    let cases = select_cases(&args, TopologyMode::from_foundation_value(&raw_mode))?;
    println!("{}", output::render_cases(&cases, args.output)?);
    Ok(true)
}

fn select_cases(args: &MatrixArgs, mode: TopologyMode) -> Result<Vec<Case>> {
    let matrix = match &args.matrix {
        Some(path) => load_matrix(path).with_context(|| format!("Failed to load matrix {}", path.display()))?,
        None => Matrix::default(),
    };
    let cases = build_cases(
        Path::new(&args.foundation_root),
        &matrix.business_units,
        &matrix.environments,
        mode,
    );
    filter_cases(cases, args.filter.as_deref()).context("Invalid --run pattern")
}
