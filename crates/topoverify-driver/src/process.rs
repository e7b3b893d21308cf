use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProcessOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
    /// stdout and stderr interleaved in arrival order.
    pub log: String,
}

#[derive(Debug)]
pub(crate) enum ProcessError {
    Spawn(String),
    TimedOut(Duration),
    Wait(String),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Spawn(m) => write!(f, "spawn failed: {}", m),
            ProcessError::TimedOut(d) => write!(f, "timed out after {} seconds", d.as_secs()),
            ProcessError::Wait(m) => write!(f, "wait failed: {}", m),
        }
    }
}

enum Stream {
    Out,
    Err,
}

/// Run `binary args…`, capturing both streams line by line.
///
/// Every line is mirrored to tracing under `topoverify::iac`. The child is
/// killed when `timeout` elapses or when the returned future is dropped.
pub(crate) async fn run(
    binary: &str,
    args: &[String],
    cwd: Option<&Path>,
    env: &HashMap<String, String>,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .envs(env);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ProcessError::Spawn(format!("{}: {}", binary, e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProcessError::Spawn("stdout not piped".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ProcessError::Spawn("stderr not piped".into()))?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(Stream, String)>();

    let tx1 = tx.clone();
    let stdout_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx1.send((Stream::Out, line));
        }
    });

    let tx2 = tx.clone();
    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = tx2.send((Stream::Err, line));
        }
    });

    drop(tx); // rx finishes once both readers are done

    let mut out = ProcessOutput::default();
    let collect = async {
        while let Some((stream, line)) = rx.recv().await {
            debug!(target: "topoverify::iac", "{}", line);
            let buf = match stream {
                Stream::Out => &mut out.stdout,
                Stream::Err => &mut out.stderr,
            };
            buf.push_str(&line);
            buf.push('\n');
            out.log.push_str(&line);
            out.log.push('\n');
        }
    };
    let timed_out = tokio::time::timeout(timeout, collect).await.is_err();

    if timed_out {
        // Readers only see EOF once the child is gone.
        let _ = child.kill().await;
        stdout_task.abort();
        stderr_task.abort();
        return Err(ProcessError::TimedOut(timeout));
    }

    stdout_task.await.ok();
    stderr_task.await.ok();

    let status = child
        .wait()
        .await
        .map_err(|e| ProcessError::Wait(format!("{}: {}", binary, e)))?;

    out.code = status.code().unwrap_or(-1);
    if out.code != 0 {
        warn!(binary, code = out.code, "command exited non-zero");
    }
    Ok(out)
}
