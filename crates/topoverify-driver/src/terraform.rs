use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::process::{self, ProcessOutput};
use crate::stack::{PolicyLibrary, Provisioner, StackHandle, StackSpec};

/// Terraform should never need more than 30 minutes for a single command.
const TIMEOUT_SECS: u64 = 1800;

// ── TerraformProvisioner ──────────────────────────────────────────────────────

/// Drives stacks by invoking the `terraform` binary in the stack directory.
///
/// Responsibilities:
/// - `terraform init` with the stack's `-backend-config` pairs
/// - Write the stack's variables to a generated `.tfvars.json` under `scratch_dir`
/// - Optionally vet the plan against a policy library with `gcloud beta terraform vet`
/// - `terraform apply`, retrying on the stack's transient error signatures
/// - Read `terraform output -json`
/// - `terraform destroy` on teardown, with the same retry policy
///
/// Impersonation reaches the provider through `GOOGLE_IMPERSONATE_SERVICE_ACCOUNT`
/// on the subprocess only.
pub struct TerraformProvisioner {
    /// `terraform` (or `tofu`) executable.
    pub binary: String,
    /// `gcloud` executable, used for policy validation.
    pub gcloud: String,
    /// Directory for generated var files and plans.
    pub scratch_dir: PathBuf,
    pub command_timeout: Duration,
}

impl TerraformProvisioner {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        TerraformProvisioner {
            binary: "terraform".into(),
            gcloud: "gcloud".into(),
            scratch_dir: scratch_dir.into(),
            command_timeout: Duration::from_secs(TIMEOUT_SECS),
        }
    }

    fn auth_env(spec: &StackSpec) -> HashMap<String, String> {
        let mut env = HashMap::from([
            // Disable interactive prompts and colour
            ("TF_IN_AUTOMATION".to_string(), "1".to_string()),
            ("TF_INPUT".to_string(), "0".to_string()),
        ]);
        if let Some(sa) = &spec.impersonate {
            env.insert("GOOGLE_IMPERSONATE_SERVICE_ACCOUNT".into(), sa.clone());
        }
        env
    }

    async fn run_tf(
        &self,
        spec: &StackSpec,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<ProcessOutput, DriverError> {
        info!(binary = %self.binary, ?args, stack = %spec.name, dir = %spec.dir.display(), "running IaC command");
        process::run(&self.binary, args, Some(&spec.dir), env, self.command_timeout)
            .await
            .map_err(|e| DriverError::ProvisionFailed {
                stack: spec.name.clone(),
                message: format!("terraform {}: {}", args.first().map(String::as_str).unwrap_or(""), e),
            })
    }

    /// Run a terraform sub-command and fail on a non-zero exit.
    async fn run_tf_ok(
        &self,
        spec: &StackSpec,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<ProcessOutput, DriverError> {
        let out = self.run_tf(spec, args, env).await?;
        if out.code != 0 {
            return Err(DriverError::ProvisionFailed {
                stack: spec.name.clone(),
                message: format!(
                    "terraform {} exited with code {}: {}",
                    args.first().map(String::as_str).unwrap_or(""),
                    out.code,
                    error_summary(&out.log)
                ),
            });
        }
        Ok(out)
    }

    async fn init(&self, spec: &StackSpec, env: &HashMap<String, String>) -> Result<(), DriverError> {
        let mut args = vec![
            "init".to_string(),
            "-reconfigure".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        for (k, v) in &spec.backend {
            args.push(format!("-backend-config={}={}", k, v));
        }
        self.run_tf_ok(spec, &args, env).await?;
        Ok(())
    }

    fn scratch_path(&self, spec: &StackSpec, suffix: &str) -> PathBuf {
        self.scratch_dir.join(format!("{}{}", slug(&spec.name), suffix))
    }

    async fn ensure_scratch_dir(&self) -> Result<(), DriverError> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| DriverError::Internal(format!("create scratch dir: {}", e)))
    }

    /// Write the stack's variables as JSON. `None` when there are none.
    async fn write_var_file(&self, spec: &StackSpec) -> Result<Option<PathBuf>, DriverError> {
        if spec.vars.is_empty() {
            return Ok(None);
        }
        self.ensure_scratch_dir().await?;
        let path = self.scratch_path(spec, ".tfvars.json");
        let body = serde_json::to_vec_pretty(&spec.vars)
            .map_err(|e| DriverError::Internal(format!("encode vars: {}", e)))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| DriverError::Internal(format!("write {}: {}", path.display(), e)))?;
        Ok(Some(path))
    }

    async fn var_args(&self, spec: &StackSpec) -> Result<Vec<String>, DriverError> {
        Ok(self
            .write_var_file(spec)
            .await?
            .map(|p| vec![format!("-var-file={}", p.display())])
            .unwrap_or_default())
    }

    /// Plan, render as JSON and run `gcloud beta terraform vet` against the library.
    async fn validate_policy(
        &self,
        spec: &StackSpec,
        env: &HashMap<String, String>,
        var_args: &[String],
        library: &PolicyLibrary,
    ) -> Result<(), DriverError> {
        self.ensure_scratch_dir().await?;
        let plan = self.scratch_path(spec, ".tfplan");
        let mut args = vec!["plan".to_string(), "-input=false".to_string(), "-no-color".to_string()];
        args.extend_from_slice(var_args);
        args.push(format!("-out={}", plan.display()));
        self.run_tf_ok(spec, &args, env).await?;

        let show = self
            .run_tf_ok(spec, &["show".to_string(), "-json".to_string(), plan.display().to_string()], env)
            .await?;
        let plan_json = self.scratch_path(spec, ".plan.json");
        tokio::fs::write(&plan_json, show.stdout.as_bytes())
            .await
            .map_err(|e| DriverError::Internal(format!("write {}: {}", plan_json.display(), e)))?;

        let mut vet_args = vec![
            "beta".to_string(),
            "terraform".to_string(),
            "vet".to_string(),
            plan_json.display().to_string(),
            format!("--policy-library={}", library.path.display()),
            format!("--project={}", library.project_id),
            "--format=json".to_string(),
        ];
        if let Some(sa) = &spec.impersonate {
            vet_args.push(format!("--impersonate-service-account={}", sa));
        }
        info!(stack = %spec.name, library = %library.path.display(), "validating plan against policy library");
        let vet = process::run(&self.gcloud, &vet_args, Some(&spec.dir), &HashMap::new(), self.command_timeout)
            .await
            .map_err(|e| DriverError::ProvisionFailed {
                stack: spec.name.clone(),
                message: format!("gcloud beta terraform vet: {}", e),
            })?;
        check_violations(&spec.name, &vet)
    }

    /// `apply` or `destroy`, retried while the failure matches a transient signature.
    async fn run_with_retry(
        &self,
        verb: &str,
        spec: &StackSpec,
        env: &HashMap<String, String>,
        var_args: &[String],
    ) -> Result<(), DriverError> {
        let mut args = vec![
            verb.to_string(),
            "-auto-approve".to_string(),
            "-input=false".to_string(),
            "-no-color".to_string(),
        ];
        args.extend_from_slice(var_args);

        let retries = spec.retry.as_ref().map_or(0, |r| r.max_retries);
        let mut attempt = 0u32;
        loop {
            let out = self.run_tf(spec, &args, env).await?;
            if out.code == 0 {
                return Ok(());
            }
            let transient = spec.retry.as_ref().and_then(|r| r.matched(&out.log).map(|d| (d, r.backoff)));
            match transient {
                Some((description, backoff)) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        stack = %spec.name, verb, attempt, retries, error = description,
                        "transient failure, retrying in {}s", backoff.as_secs()
                    );
                    tokio::time::sleep(backoff).await;
                }
                _ => {
                    return Err(DriverError::ProvisionFailed {
                        stack: spec.name.clone(),
                        message: format!(
                            "terraform {} exited with code {} after {} attempt(s): {}",
                            verb,
                            out.code,
                            attempt + 1,
                            error_summary(&out.log)
                        ),
                    });
                }
            }
        }
    }

    /// Run `terraform output -json` and keep each output's `value`.
    async fn read_outputs(
        &self,
        spec: &StackSpec,
        env: &HashMap<String, String>,
    ) -> Result<HashMap<String, Value>, DriverError> {
        let out = self
            .run_tf_ok(spec, &["output".to_string(), "-json".to_string(), "-no-color".to_string()], env)
            .await?;
        parse_outputs(&spec.name, &out.stdout)
    }
}

#[async_trait]
impl Provisioner for TerraformProvisioner {
    fn name(&self) -> &'static str {
        "terraform"
    }

    async fn apply(&self, spec: &StackSpec) -> Result<StackHandle, DriverError> {
        let env = Self::auth_env(spec);
        self.init(spec, &env).await?;
        let var_args = self.var_args(spec).await?;

        if let Some(library) = &spec.policy_library {
            self.validate_policy(spec, &env, &var_args, library).await?;
        }

        self.run_with_retry("apply", spec, &env, &var_args).await?;
        let outputs = self.read_outputs(spec, &env).await?;
        debug!(stack = %spec.name, count = outputs.len(), "stack applied");
        Ok(StackHandle::new(spec.name.clone(), spec.dir.clone(), outputs))
    }

    async fn outputs(&self, spec: &StackSpec) -> Result<StackHandle, DriverError> {
        let env = Self::auth_env(spec);
        self.init(spec, &env).await?;
        let outputs = self.read_outputs(spec, &env).await?;
        Ok(StackHandle::new(spec.name.clone(), spec.dir.clone(), outputs))
    }

    async fn destroy(&self, spec: &StackSpec) -> Result<(), DriverError> {
        let env = Self::auth_env(spec);
        let destroyed = async {
            self.init(spec, &env).await?;
            let var_args = self.var_args(spec).await?;
            self.run_with_retry("destroy", spec, &env, &var_args).await
        };
        destroyed.await.map_err(|e| match e {
            DriverError::ProvisionFailed { stack, message } => DriverError::TeardownFailed { stack, message },
            other => other,
        })?;
        info!(stack = %spec.name, "stack destroyed");
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_outputs(stack: &str, stdout: &str) -> Result<HashMap<String, Value>, DriverError> {
    let map: Value = serde_json::from_str(stdout.trim()).map_err(|e| DriverError::ProvisionFailed {
        stack: stack.to_string(),
        message: format!("parse terraform output: {}", e),
    })?;
    let Some(obj) = map.as_object() else {
        return Err(DriverError::ProvisionFailed {
            stack: stack.to_string(),
            message: "terraform output is not an object".into(),
        });
    };
    Ok(obj
        .iter()
        .map(|(k, v)| (k.clone(), v.get("value").cloned().unwrap_or(Value::Null)))
        .collect())
}

fn check_violations(stack: &str, vet: &ProcessOutput) -> Result<(), DriverError> {
    let parsed: Option<Vec<Value>> = serde_json::from_str(vet.stdout.trim()).ok();
    match parsed {
        Some(violations) if !violations.is_empty() => {
            let summary = violations
                .iter()
                .map(|v| {
                    let name = v["constraint"].as_str().unwrap_or("unknown constraint");
                    let msg = v["message"].as_str().unwrap_or("");
                    format!("{} ({})", name, msg)
                })
                .collect::<Vec<_>>()
                .join("; ");
            Err(DriverError::PolicyViolations {
                stack: stack.to_string(),
                count: violations.len(),
                summary,
            })
        }
        Some(_) if vet.code == 0 => Ok(()),
        None if vet.code == 0 && vet.stdout.trim().is_empty() => Ok(()),
        _ => Err(DriverError::ProvisionFailed {
            stack: stack.to_string(),
            message: format!(
                "gcloud beta terraform vet exited with code {}: {}",
                vet.code,
                error_summary(&vet.log)
            ),
        }),
    }
}

/// The first `Error` line of a log, or its last non-empty line.
fn error_summary(log: &str) -> String {
    log.lines()
        .find(|l| l.contains("Error"))
        .or_else(|| log.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("no output")
        .trim()
        .to_string()
}

/// File-name-safe form of a stack name.
fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn parse_outputs_keeps_values() {
        let stdout = r#"{
            "project_id": {"sensitive": false, "type": "string", "value": "prj-d-bu1-floating"},
            "numbers": {"sensitive": false, "type": ["list","number"], "value": [1, 2]}
        }"#;
        let out = parse_outputs("s", stdout).unwrap();
        assert_eq!(out["project_id"], json!("prj-d-bu1-floating"));
        assert_eq!(out["numbers"], json!([1, 2]));
    }

    #[test]
    fn parse_outputs_rejects_garbage() {
        assert!(parse_outputs("s", "not json").is_err());
        assert!(parse_outputs("s", "[]").is_err());
    }

    #[test]
    fn error_summary_prefers_error_lines() {
        assert_eq!(error_summary("a\nError: boom\nb\n"), "Error: boom");
        assert_eq!(error_summary("a\nlast\n\n"), "last");
        assert_eq!(error_summary(""), "no output");
    }

    #[test]
    fn slug_replaces_separators() {
        assert_eq!(slug("bu1_development/project"), "bu1_development_project");
    }

    #[test]
    fn violations_are_reported() {
        let vet = ProcessOutput {
            code: 2,
            stdout: json!([{"constraint": "GCPAlwaysViolatesConstraintV1.always_violates_all", "message": "nope"}]).to_string(),
            ..Default::default()
        };
        let err = check_violations("s", &vet).unwrap_err();
        assert!(matches!(err, DriverError::PolicyViolations { count: 1, .. }));
        assert!(err.to_string().contains("always_violates_all"));
    }

    #[test]
    fn empty_violations_pass() {
        let vet = ProcessOutput { code: 0, stdout: "[]".into(), ..Default::default() };
        assert!(check_violations("s", &vet).is_ok());
    }

    #[test]
    fn impersonation_only_on_subprocess_env() {
        let mut spec = StackSpec::new("s", "/d");
        spec.impersonate = Some("tf@prj.iam.gserviceaccount.com".into());
        let env = TerraformProvisioner::auth_env(&spec);
        assert_eq!(env["GOOGLE_IMPERSONATE_SERVICE_ACCOUNT"], "tf@prj.iam.gserviceaccount.com");
        assert_eq!(env["TF_IN_AUTOMATION"], "1");
    }

    // ── Fake terraform binary ─────────────────────────────────────────────────

    #[cfg(unix)]
    fn write_script(path: &Path, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        std::fs::write(path, script).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Logs every invocation to `calls.log`. `destroy` exits with the code in
    /// `destroy.exit`, 0 when the file is absent.
    #[cfg(unix)]
    fn fake_terraform(dir: &Path, apply_failures: u32, failure_line: &str) -> PathBuf {
        let calls = dir.join("calls.log");
        let counter = dir.join("apply.count");
        let destroy_exit = dir.join("destroy.exit");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> "{calls}"
case "$1" in
  init) echo "Terraform has been successfully initialized!"; exit 0 ;;
  plan)
    for a in "$@"; do
      case "$a" in -out=*) echo "binary plan" > "${{a#-out=}}" ;; esac
    done
    exit 0 ;;
  show) echo '{{"format_version":"1.2","planned_values":{{}}}}'; exit 0 ;;
  apply)
    n=$(cat "{counter}" 2>/dev/null || echo 0)
    n=$((n+1))
    echo $n > "{counter}"
    if [ $n -le {apply_failures} ]; then
      echo "{failure_line}" >&2
      exit 1
    fi
    echo "Apply complete! Resources: 1 added, 0 changed, 0 destroyed."
    exit 0 ;;
  destroy)
    code=$(cat "{destroy_exit}" 2>/dev/null || echo 0)
    if [ "$code" -ne 0 ]; then echo "Error: deleting project: Error 400: lien" >&2; fi
    exit $code ;;
  output)
    echo '{{"floating_project":{{"sensitive":false,"type":"string","value":"prj-d-bu1-floating"}}}}'
    exit 0 ;;
esac
exit 3
"#,
            calls = calls.display(),
            counter = counter.display(),
            destroy_exit = destroy_exit.display(),
        );
        let path = dir.join("terraform");
        write_script(&path, &script);
        path
    }

    /// A `gcloud` that logs its arguments beside terraform's and prints `violations`.
    #[cfg(unix)]
    fn fake_gcloud(dir: &Path, violations: &str, code: i32) -> PathBuf {
        let script = format!(
            "#!/bin/sh\necho \"gcloud $@\" >> \"{calls}\"\ncat <<'JSON'\n{violations}\nJSON\nexit {code}\n",
            calls = dir.join("calls.log").display(),
        );
        let path = dir.join("gcloud");
        write_script(&path, &script);
        path
    }

    #[cfg(unix)]
    fn policy_spec(dir: &Path) -> StackSpec {
        let mut spec = spec(dir, 0);
        spec.policy_library = Some(PolicyLibrary {
            path: dir.join("policy-library"),
            project_id: "prj-test-setup".into(),
        });
        spec
    }

    /// First word of each logged call, with `gcloud` calls kept whole up to `vet`.
    #[cfg(unix)]
    fn verbs(dir: &Path) -> Vec<String> {
        calls(dir)
            .iter()
            .map(|c| {
                if c.starts_with("gcloud") {
                    c.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
                } else {
                    c.split_whitespace().next().unwrap_or("").to_string()
                }
            })
            .collect()
    }

    #[cfg(unix)]
    fn provisioner(dir: &Path, binary: PathBuf) -> TerraformProvisioner {
        let mut p = TerraformProvisioner::new(dir.join("scratch"));
        p.binary = binary.display().to_string();
        p
    }

    #[cfg(unix)]
    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    #[cfg(unix)]
    fn spec(dir: &Path, retries: u32) -> StackSpec {
        let mut spec = StackSpec::new("bu1_development/project", dir)
            .var("backend_bucket", "bkt-tfstate")
            .backend("bucket", "bkt-tfstate");
        spec.retry = Some(RetryPolicy::new(crate::retry::TRANSIENT_ERRORS, retries, Duration::ZERO).unwrap());
        spec
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn apply_passes_backend_and_var_file_then_reads_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 0, "");
        let handle = provisioner(dir.path(), tf).apply(&spec(dir.path(), 1)).await.unwrap();

        assert_eq!(handle.get_output("floating_project").unwrap(), "prj-d-bu1-floating");
        let calls = calls(dir.path());
        assert_eq!(calls.len(), 3);
        assert!(calls[0].starts_with("init") && calls[0].contains("-backend-config=bucket=bkt-tfstate"));
        assert!(calls[1].starts_with("apply") && calls[1].contains("-var-file="));

        let vars = std::fs::read_to_string(dir.path().join("scratch/bu1_development_project.tfvars.json")).unwrap();
        let vars: Value = serde_json::from_str(&vars).unwrap();
        assert_eq!(vars["backend_bucket"], "bkt-tfstate");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn transient_apply_failure_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 1, "Error: Error waiting for Creating CryptoKey: Error code 13, message: Internal error encountered.");
        provisioner(dir.path(), tf).apply(&spec(dir.path(), 1)).await.unwrap();

        let applies = calls(dir.path()).iter().filter(|c| c.starts_with("apply")).count();
        assert_eq!(applies, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn retries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 5, "Error: Error code 14, message: The service is currently unavailable.");
        let err = provisioner(dir.path(), tf).apply(&spec(dir.path(), 1)).await.unwrap_err();

        assert!(err.to_string().contains("after 2 attempt(s)"), "{err}");
        let applies = calls(dir.path()).iter().filter(|c| c.starts_with("apply")).count();
        assert_eq!(applies, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_transient_apply_failure_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 1, "Error: Invalid reference");
        let err = provisioner(dir.path(), tf).apply(&spec(dir.path(), 1)).await.unwrap_err();

        assert!(matches!(err, DriverError::ProvisionFailed { .. }));
        assert!(err.to_string().contains("Invalid reference"));
        let applies = calls(dir.path()).iter().filter(|c| c.starts_with("apply")).count();
        assert_eq!(applies, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn outputs_does_not_apply() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 0, "");
        let handle = provisioner(dir.path(), tf).outputs(&StackSpec::new("bu1/shared", dir.path())).await.unwrap();

        assert_eq!(handle.name, "bu1/shared");
        assert!(calls(dir.path()).iter().all(|c| !c.starts_with("apply")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_binary_is_a_provision_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = provisioner(dir.path(), dir.path().join("does-not-exist"));
        let err = p.outputs(&StackSpec::new("s", dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("spawn failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn policy_library_vets_the_plan_before_apply() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 0, "");
        let mut p = provisioner(dir.path(), tf);
        p.gcloud = fake_gcloud(dir.path(), "[]", 0).display().to_string();

        p.apply(&policy_spec(dir.path())).await.unwrap();

        assert_eq!(
            verbs(dir.path()),
            vec!["init", "plan", "show", "gcloud beta terraform vet", "apply", "output"]
        );
        let calls = calls(dir.path());
        let plan = dir.path().join("scratch/bu1_development_project.tfplan");
        let plan_json = dir.path().join("scratch/bu1_development_project.plan.json");
        assert!(calls[1].contains(&format!("-out={}", plan.display())));
        assert!(calls[1].contains("-var-file="));
        assert!(calls[2].ends_with(&plan.display().to_string()));
        assert!(calls[3].contains(&plan_json.display().to_string()));
        assert!(calls[3].contains(&format!("--policy-library={}", dir.path().join("policy-library").display())));
        assert!(calls[3].contains("--project=prj-test-setup"));

        let rendered: Value = serde_json::from_str(&std::fs::read_to_string(plan_json).unwrap()).unwrap();
        assert_eq!(rendered["format_version"], "1.2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn policy_violations_abort_before_apply() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 0, "");
        let mut p = provisioner(dir.path(), tf);
        let violations = r#"[{"constraint":"GCPAlwaysViolatesConstraintV1.always_violates_all","message":"denied"}]"#;
        p.gcloud = fake_gcloud(dir.path(), violations, 2).display().to_string();

        let err = p.apply(&policy_spec(dir.path())).await.unwrap_err();

        assert!(matches!(err, DriverError::PolicyViolations { count: 1, .. }), "{err}");
        assert!(err.to_string().contains("always_violates_all (denied)"));
        let verbs = verbs(dir.path());
        assert!(verbs.iter().all(|v| v != "apply"), "{verbs:?}");
        assert_eq!(verbs.last().map(String::as_str), Some("gcloud beta terraform vet"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn destroy_reinitialises_and_passes_var_file() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 0, "");
        provisioner(dir.path(), tf).destroy(&spec(dir.path(), 1)).await.unwrap();

        let calls = calls(dir.path());
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("init") && calls[0].contains("-backend-config=bucket=bkt-tfstate"));
        assert!(calls[1].starts_with("destroy -auto-approve") && calls[1].contains("-var-file="));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_destroy_is_a_teardown_error() {
        let dir = tempfile::tempdir().unwrap();
        let tf = fake_terraform(dir.path(), 0, "");
        std::fs::write(dir.path().join("destroy.exit"), "1").unwrap();

        let err = provisioner(dir.path(), tf).destroy(&spec(dir.path(), 1)).await.unwrap_err();

        match err {
            DriverError::TeardownFailed { stack, message } => {
                assert_eq!(stack, "bu1_development/project");
                assert!(message.contains("Error 400: lien"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        let destroys = calls(dir.path()).iter().filter(|c| c.starts_with("destroy")).count();
        assert_eq!(destroys, 1);
    }
}
