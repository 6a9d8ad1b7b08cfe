use std::path::PathBuf;
use thiserror::Error;

/// One structural problem found while loading the fleet manifest.
///
/// Validation is exhaustive: the registry collects every issue it finds and
/// reports them together, so one pass over the error output fixes the fleet.
#[derive(Debug, Clone, Error)]
#[error("{stack}: {problem}")]
pub struct ManifestIssue {
    pub stack: String,
    pub problem: String,
}

impl ManifestIssue {
    pub fn new(stack: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            problem: problem.into(),
        }
    }
}

fn bullet_list(items: &[impl std::fmt::Display]) -> String {
    items
        .iter()
        .map(|i| format!("  - {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum ConvoyError {
    #[error("cannot read fleet definitions at {}", .path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed fleet manifest {}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid fleet manifest ({} issue(s)):\n{}", .issues.len(), bullet_list(.issues))]
    Manifest { issues: Vec<ManifestIssue> },

    #[error("dependency cycle: {}", .stacks.join(" -> "))]
    DependencyCycle { stacks: Vec<String> },

    #[error("unknown stack(s): {}", .names.join(", "))]
    UnknownStacks { names: Vec<String> },

    #[error("no stacks selected; pass --project NAME or --all")]
    NothingSelected,

    #[error("docker daemon unavailable: {0}")]
    DaemonUnavailable(String),

    #[error("preflight failed: {0}")]
    Preflight(String),

    #[error("docker command `{command}` failed: {detail}")]
    Docker { command: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConvoyError {
    /// Errors that occur before any stack is attempted.
    ///
    /// The CLI maps these to exit code 2 (configuration/validation failure),
    /// as opposed to exit code 1 (one or more stacks failed during a run).
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ConvoyError::ManifestRead { .. }
                | ConvoyError::ManifestParse { .. }
                | ConvoyError::Manifest { .. }
                | ConvoyError::DependencyCycle { .. }
                | ConvoyError::UnknownStacks { .. }
                | ConvoyError::NothingSelected
                | ConvoyError::DaemonUnavailable(_)
                | ConvoyError::Preflight(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConvoyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_error_lists_every_issue() {
        let err = ConvoyError::Manifest {
            issues: vec![
                ManifestIssue::new("db", "compose file not found: db/compose.yaml"),
                ManifestIssue::new("app", "depends on unknown stack 'cache'"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 issue(s)"));
        assert!(msg.contains("db: compose file not found"));
        assert!(msg.contains("app: depends on unknown stack 'cache'"));
    }

    #[test]
    fn config_error_classification() {
        assert!(ConvoyError::NothingSelected.is_config_error());
        assert!(ConvoyError::DependencyCycle {
            stacks: vec!["a".into(), "a".into()]
        }
        .is_config_error());
        assert!(ConvoyError::Preflight("cannot create network 'homelab'".into())
            .is_config_error());
        assert!(ConvoyError::ManifestRead {
            path: PathBuf::from("/fleet/convoy.yaml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .is_config_error());
        assert!(!ConvoyError::Docker {
            command: "docker rmi x".into(),
            detail: "conflict".into()
        }
        .is_config_error());
    }
}
