//! Command executor: runs one lifecycle operation for one stack as an
//! external `docker compose` invocation and records the outcome.
//!
//! The executor is a capability seam: the coordinator is written against
//! [`StackExecutor`] so tests drive it with a scripted double instead of
//! real external tooling. A nonzero exit from compose is a reportable
//! failure, never a process-fatal condition; a timeout kills the child and
//! is recorded as its own outcome.

use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::report::{Outcome, StackResult};
use crate::types::{Operation, StackDefinition};

/// Executes the lifecycle operation for one stack and reports the result.
pub trait StackExecutor: Send + Sync {
    fn execute(
        &self,
        stack: StackDefinition,
        operation: Operation,
    ) -> impl Future<Output = StackResult> + Send;
}

// ---------------------------------------------------------------------------
// ComposeExecutor
// ---------------------------------------------------------------------------

/// The real executor: shells out to `docker compose` with the stack's
/// compose file and env file, bounded by a per-invocation timeout.
#[derive(Debug, Clone)]
pub struct ComposeExecutor {
    docker_bin: String,
    timeout: Duration,
}

impl ComposeExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            docker_bin: "docker".into(),
            timeout,
        }
    }
}

impl StackExecutor for ComposeExecutor {
    fn execute(
        &self,
        stack: StackDefinition,
        operation: Operation,
    ) -> impl Future<Output = StackResult> + Send {
        async move {
            tracing::info!(stack = %stack.name, op = %operation, "running compose");
            let mut cmd = Command::new(&self.docker_bin);
            cmd.args(compose_args(&stack, operation));
            cmd.current_dir(&stack.dir);

            let started = Instant::now();
            let outcome = match run_with_timeout(&mut cmd, self.timeout).await {
                Ok(Some(out)) if out.success => Outcome::Succeeded,
                Ok(Some(out)) => Outcome::Failed {
                    detail: failure_detail(out.code, &out.stderr),
                },
                Ok(None) => {
                    tracing::warn!(stack = %stack.name, op = %operation, "compose timed out");
                    Outcome::TimedOut {
                        limit_secs: self.timeout.as_secs(),
                    }
                }
                Err(e) => Outcome::Failed {
                    detail: format!("failed to run {}: {e}", self.docker_bin),
                },
            };

            if let Outcome::Failed { detail } = &outcome {
                tracing::warn!(stack = %stack.name, op = %operation, %detail, "compose failed");
            }
            StackResult::new(stack.name, operation, outcome, started.elapsed())
        }
    }
}

/// Argument vector for one compose invocation (everything after `docker`).
fn compose_args(stack: &StackDefinition, operation: Operation) -> Vec<String> {
    let mut args = vec![
        "compose".to_string(),
        "-f".into(),
        stack.compose_file.display().to_string(),
    ];
    if let Some(env) = &stack.env_file {
        args.push("--env-file".into());
        args.push(env.display().to_string());
    }
    match operation {
        Operation::Up => args.extend(["up".into(), "-d".into(), "--remove-orphans".into()]),
        Operation::Down => args.extend(["down".into(), "--remove-orphans".into()]),
        Operation::Pull => args.push("pull".into()),
        Operation::Restart => args.push("restart".into()),
    }
    args
}

fn failure_detail(code: Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    };
    let tail = tail_lines(stderr, 10);
    if tail.is_empty() {
        status
    } else {
        format!("{status}: {tail}")
    }
}

/// Last `max` non-empty lines of captured stderr, for failure details.
fn tail_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max);
    lines[start..].join("\n")
}

// ---------------------------------------------------------------------------
// Subprocess plumbing
// ---------------------------------------------------------------------------

pub(crate) struct CapturedOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command to completion with captured output, bounded by `limit`.
///
/// Returns `Ok(None)` on timeout; `kill_on_drop` ensures the child is
/// terminated when the output future is dropped.
pub(crate) async fn run_with_timeout(
    cmd: &mut Command,
    limit: Duration,
) -> std::io::Result<Option<CapturedOutput>> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(limit, cmd.output()).await {
        Err(_) => Ok(None),
        Ok(result) => {
            let out = result?;
            Ok(Some(CapturedOutput {
                success: out.status.success(),
                code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            }))
        }
    }
}
