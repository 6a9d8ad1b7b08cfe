use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// StackDefinition
// ---------------------------------------------------------------------------

/// One independently deployable unit: a compose file, an optional env file,
/// and the stacks that must be up before it.
///
/// Definitions are resolved to absolute paths by the registry and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    pub name: String,
    /// Project directory; compose commands run with this as the working dir.
    pub dir: PathBuf,
    pub compose_file: PathBuf,
    pub env_file: Option<PathBuf>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// External docker networks this stack expects to exist before `up`.
    #[serde(default)]
    pub external_networks: Vec<String>,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A lifecycle operation applied to a stack's containers/images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Up,
    Down,
    Pull,
    Restart,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Up => "up",
            Operation::Down => "down",
            Operation::Pull => "pull",
            Operation::Restart => "restart",
        }
    }

    /// Teardown operations run the execution plan in reverse: a stack comes
    /// down before anything it depends on.
    pub fn is_teardown(&self) -> bool {
        matches!(self, Operation::Down)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
