use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "topoverify",
    about = "End-to-end verification of a multi-environment foundation topology",
    version
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision each case's project stack and verify the live resources.
    Run(RunArgs),

    /// List the cases a run would execute.
    Cases(MatrixArgs),
}

#[derive(Debug, Args)]
pub struct MatrixArgs {
    /// Only cases whose name matches this regex, e.g. `bu1_.*`.
    #[arg(long = "run", value_name = "REGEX")]
    pub filter: Option<String>,

    /// YAML file overriding the default business unit × environment matrix.
    #[arg(long, env = "TOPOVERIFY_MATRIX")]
    pub matrix: Option<PathBuf>,

    /// Root of the foundation checkout (contains `0-bootstrap`, `4-projects`, …).
    #[arg(long, env = "TOPOVERIFY_FOUNDATION_ROOT", default_value = ".")]
    pub foundation_root: PathBuf,

    #[arg(long, default_value = "text")]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub matrix: MatrixArgs,

    /// Cases verified at the same time.
    #[arg(long, env = "TOPOVERIFY_CONCURRENCY", default_value_t = 1)]
    pub concurrency: usize,

    /// Abort a case that takes longer than this many seconds.
    #[arg(long, value_name = "SECS")]
    pub case_timeout: Option<u64>,

    /// Read existing project stack outputs instead of applying.
    #[arg(long)]
    pub verify_only: bool,

    /// Destroy each project stack after it has been verified.
    #[arg(long, conflicts_with = "verify_only")]
    pub teardown: bool,

    /// Backend used for read-only cloud queries.
    #[arg(long, default_value = "gcloud")]
    pub control_plane: ControlPlaneArg,

    /// Service account the verification queries run as.
    #[arg(long, env = "TOPOVERIFY_IMPERSONATE")]
    pub impersonate: Option<String>,

    /// Policy library the project plan is vetted against before apply.
    #[arg(long, env = "TOPOVERIFY_POLICY_LIBRARY")]
    pub policy_library: Option<PathBuf>,

    /// Stack providing the project id for policy validation.
    #[arg(long, env = "TOPOVERIFY_SETUP_DIR")]
    pub setup_dir: Option<PathBuf>,

    /// Directory for generated var files and plans. Defaults to a fresh temp dir.
    #[arg(long, env = "TOPOVERIFY_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    #[arg(long, env = "TOPOVERIFY_TERRAFORM", default_value = "terraform")]
    pub terraform: String,

    #[arg(long, env = "TOPOVERIFY_GCLOUD", default_value = "gcloud")]
    pub gcloud: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ControlPlaneArg {
    Gcloud,
    Rest,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
