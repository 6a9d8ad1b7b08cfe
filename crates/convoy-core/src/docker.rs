//! Docker CLI capability and fleet preflight.
//!
//! Non-compose docker invocations (daemon check, network provisioning,
//! image queries for pruning) go through the [`DockerCli`] trait so they can
//! be scripted in tests without a docker engine.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{ConvoyError, Result};
use crate::exec::run_with_timeout;

/// Run `docker <args>` and return stdout on success.
pub trait DockerCli: Send + Sync {
    fn run(&self, args: Vec<String>) -> impl Future<Output = Result<String>> + Send;
}

pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

// ---------------------------------------------------------------------------
// SystemDocker
// ---------------------------------------------------------------------------

/// The real docker binary, located via `PATH` at construction time.
#[derive(Debug, Clone)]
pub struct SystemDocker {
    bin: PathBuf,
    timeout: Duration,
}

impl SystemDocker {
    /// Auxiliary docker commands (info, network ls, rmi) are quick; anything
    /// slower than this indicates a wedged daemon.
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn locate() -> Result<Self> {
        let bin = which::which("docker").map_err(|_| {
            ConvoyError::DaemonUnavailable("docker binary not found on PATH".into())
        })?;
        Ok(Self {
            bin,
            timeout: Self::DEFAULT_TIMEOUT,
        })
    }
}

impl DockerCli for SystemDocker {
    fn run(&self, args: Vec<String>) -> impl Future<Output = Result<String>> + Send {
        async move {
            let command = format!("docker {}", args.join(" "));
            tracing::debug!(%command, "running docker");
            let mut cmd = Command::new(&self.bin);
            cmd.args(&args);
            match run_with_timeout(&mut cmd, self.timeout).await? {
                None => Err(ConvoyError::Docker {
                    command,
                    detail: format!("timed out after {}s", self.timeout.as_secs()),
                }),
                Some(out) if out.success => Ok(out.stdout),
                Some(out) => Err(ConvoyError::Docker {
                    command,
                    detail: out.stderr.trim().to_string(),
                }),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Preflight
// ---------------------------------------------------------------------------

/// Verify the daemon answers before any stack is attempted.
/// Failure here is a configuration-class error (exit 2), not a stack failure.
pub async fn daemon_ready<D: DockerCli>(cli: &D) -> Result<String> {
    let version = cli
        .run(argv(&["info", "--format", "{{.ServerVersion}}"]))
        .await
        .map_err(|e| ConvoyError::DaemonUnavailable(e.to_string()))?;
    let version = version.trim().to_string();
    tracing::debug!(%version, "docker daemon is up");
    Ok(version)
}

/// Create any declared external networks that don't exist yet.
/// Returns the names actually created.
///
/// Runs during preflight, before any stack is dispatched, so failures are
/// configuration-class (exit 2) like [`daemon_ready`].
pub async fn ensure_networks<D: DockerCli>(
    cli: &D,
    names: &BTreeSet<String>,
) -> Result<Vec<String>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let existing: BTreeSet<String> = cli
        .run(argv(&["network", "ls", "--format", "{{.Name}}"]))
        .await
        .map_err(|e| ConvoyError::Preflight(format!("cannot list networks: {e}")))?
        .lines()
        .map(str::to_string)
        .collect();

    let mut created = Vec::new();
    for name in names {
        if existing.contains(name) {
            tracing::debug!(network = %name, "external network already exists");
            continue;
        }
        cli.run(argv(&["network", "create", "--driver", "bridge", name]))
            .await
            .map_err(|e| ConvoyError::Preflight(format!("cannot create network '{name}': {e}")))?;
        tracing::info!(network = %name, "created external network");
        created.push(name.clone());
    }
    Ok(created)
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Scripted docker: responses keyed by the full joined argument string.
    /// Unscripted commands succeed with empty output; `fail_on` entries
    /// return a `Docker` error.
    #[derive(Default)]
    pub(crate) struct ScriptedDocker {
        outputs: HashMap<String, String>,
        failures: HashSet<String>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl ScriptedDocker {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on(mut self, command: &str, stdout: &str) -> Self {
            self.outputs.insert(command.into(), stdout.into());
            self
        }

        pub(crate) fn fail_on(mut self, command: &str) -> Self {
            self.failures.insert(command.into());
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DockerCli for ScriptedDocker {
        fn run(&self, args: Vec<String>) -> impl Future<Output = Result<String>> + Send {
            let key = args.join(" ");
            self.calls.lock().unwrap().push(key.clone());
            let result = if self.failures.contains(&key) {
                Err(ConvoyError::Docker {
                    command: format!("docker {key}"),
                    detail: "scripted failure".into(),
                })
            } else {
                Ok(self.outputs.get(&key).cloned().unwrap_or_default())
            };
            async move { result }
        }
    }
}
