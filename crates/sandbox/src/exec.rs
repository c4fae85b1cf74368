//! Bounded process execution shared by script and system-command dispatch.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    nix::{
        sys::signal::{Signal, killpg},
        unistd::Pid,
    },
    tokio::{
        io::{AsyncRead, AsyncReadExt},
        process::{Child, Command},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// How long to keep collecting output after the child is gone. Background
/// grandchildren can hold the pipes open indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Options controlling a bounded execution.
#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub timeout: Duration,
    /// Per-stream cap; anything beyond is dropped with a truncation marker.
    pub max_output_bytes: usize,
    pub working_dir: Option<PathBuf>,
    /// Added on top of the inherited process environment.
    pub env: Vec<(String, String)>,
}

impl Default for ExecOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output_bytes: 64 * 1024,
            working_dir: None,
            env: Vec::new(),
        }
    }
}

/// Outcome of a bounded execution.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Killed because the caller's cancellation token fired.
    pub cancelled: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

enum Outcome {
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
}

/// Run `program args…` with a deadline and captured output.
///
/// The child runs in its own process group so the whole group can be killed
/// on timeout or cancellation. Spawn failures are the only error; timeouts
/// and non-zero exits are reported through [`ExecResult`].
pub async fn run_bounded(
    program: &Path,
    args: &[String],
    opts: &ExecOpts,
    cancel: Option<&CancellationToken>,
) -> Result<ExecResult> {
    let program_name = program.display().to_string();
    debug!(
        program = %program_name,
        ?args,
        timeout_ms = opts.timeout.as_millis() as u64,
        "run_bounded"
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(opts.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .process_group(0);
    if let Some(ref dir) = opts.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| Error::Spawn {
        program: program_name.clone(),
        source,
    })?;

    let limit = opts.max_output_bytes;
    let stdout_task = tokio::spawn(read_capped(child.stdout.take(), limit));
    let stderr_task = tokio::spawn(read_capped(child.stderr.take(), limit));

    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    let outcome = tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|source| Error::Wait { program: program_name.clone(), source })?;
            Outcome::Exited(status.code())
        },
        () = tokio::time::sleep(opts.timeout) => Outcome::TimedOut,
        () = cancelled => Outcome::Cancelled,
    };

    if !matches!(outcome, Outcome::Exited(_)) {
        kill_group(&mut child, &program_name).await;
    }

    let stdout = collect(stdout_task).await;
    let stderr = collect(stderr_task).await;

    let result = match outcome {
        Outcome::Exited(exit_code) => ExecResult {
            stdout,
            stderr,
            exit_code,
            ..ExecResult::default()
        },
        Outcome::TimedOut => {
            warn!(program = %program_name, timeout_ms = opts.timeout.as_millis() as u64, "execution timed out");
            ExecResult {
                stdout,
                stderr,
                timed_out: true,
                ..ExecResult::default()
            }
        },
        Outcome::Cancelled => {
            warn!(program = %program_name, "execution cancelled");
            ExecResult {
                stdout,
                stderr,
                cancelled: true,
                ..ExecResult::default()
            }
        },
    };

    debug!(
        program = %program_name,
        exit_code = ?result.exit_code,
        stdout_len = result.stdout.len(),
        stderr_len = result.stderr.len(),
        "execution finished"
    );
    Ok(result)
}

/// SIGKILL the child's process group, then reap the child itself.
async fn kill_group(child: &mut Child, program_name: &str) {
    if let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok())
        && let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL)
    {
        debug!(program = program_name, error = %e, "killpg failed");
    }
    if let Err(e) = child.kill().await {
        debug!(program = program_name, error = %e, "child already gone");
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, limit: usize) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    // Read one byte past the cap to know whether truncation happened.
    let mut capped = reader.take(limit as u64 + 1);
    if let Err(e) = capped.read_to_end(&mut buf).await {
        debug!(error = %e, "output read failed");
    }
    let truncated = buf.len() > limit;
    buf.truncate(limit);

    let mut text = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        text.push_str("\n... [output truncated]");
    }
    text
}

async fn collect(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(error = %e, "output reader task failed");
            String::new()
        },
        Err(_) => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, std::time::Instant};

    fn sh(script: &str) -> (PathBuf, Vec<String>) {
        (PathBuf::from("/bin/sh"), vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let (prog, args) = sh("echo hello; echo oops >&2; exit 3");
        let result = run_bounded(&prog, &args, &ExecOpts::default(), None)
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.stderr.trim(), "oops");
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn timeout_kills_the_process_group() {
        let (prog, args) = sh("sleep 5; echo never");
        let opts = ExecOpts {
            timeout: Duration::from_millis(200),
            ..ExecOpts::default()
        };
        let started = Instant::now();
        let result = run_bounded(&prog, &args, &opts, None).await.unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(!result.stdout.contains("never"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn cancellation_stops_execution() {
        let (prog, args) = sh("sleep 5");
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let result = run_bounded(&prog, &args, &ExecOpts::default(), Some(&token))
            .await
            .unwrap();
        assert!(result.cancelled);
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn env_and_working_dir_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let (prog, args) = sh("pwd; echo $CHATBRIDGE_PROBE");
        let opts = ExecOpts {
            working_dir: Some(dir.path().to_path_buf()),
            env: vec![("CHATBRIDGE_PROBE".into(), "probe-value".into())],
            ..ExecOpts::default()
        };
        let result = run_bounded(&prog, &args, &opts, None).await.unwrap();
        let lines: Vec<_> = result.stdout.lines().collect();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(Path::new(lines[0]).canonicalize().unwrap(), expected);
        assert_eq!(lines[1], "probe-value");
    }

    #[tokio::test]
    async fn output_is_truncated_at_cap() {
        let (prog, args) = sh("printf 'abcdefghij'");
        let opts = ExecOpts {
            max_output_bytes: 4,
            ..ExecOpts::default()
        };
        let result = run_bounded(&prog, &args, &opts, None).await.unwrap();
        assert!(result.stdout.starts_with("abcd"));
        assert!(result.stdout.ends_with("[output truncated]"));
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let err = run_bounded(
            Path::new("/nonexistent/definitely-not-here"),
            &[],
            &ExecOpts::default(),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
