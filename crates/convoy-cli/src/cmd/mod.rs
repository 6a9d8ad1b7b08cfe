pub mod lifecycle;
pub mod ls;
pub mod prune;

use clap::Args;
use convoy_core::ConvoyError;

/// Stack selection shared by lifecycle and prune commands.
///
/// Selection is explicit: operating on the whole fleet requires `--all`, so a
/// bare `convoy down` can never take out every stack by accident.
#[derive(Debug, Clone, Args)]
pub struct SelectArgs {
    /// Stack to operate on (repeatable); dependencies are included automatically
    #[arg(long = "project", short = 'p', value_name = "NAME")]
    pub projects: Vec<String>,

    /// Operate on every stack in the fleet
    #[arg(long)]
    pub all: bool,
}

impl SelectArgs {
    /// `None` means the whole fleet; an empty selection is a configuration
    /// error (exit code 2).
    pub fn resolve(&self) -> convoy_core::Result<Option<Vec<String>>> {
        if self.all {
            Ok(None)
        } else if self.projects.is_empty() {
            Err(ConvoyError::NothingSelected)
        } else {
            Ok(Some(self.projects.clone()))
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Maximum stacks run simultaneously within a wave
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub parallelism: usize,

    /// Keep running independent stacks after a failure
    #[arg(long)]
    pub continue_on_error: bool,

    /// Per-stack timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 600)]
    pub timeout: u64,

    /// Print the wave plan without touching docker
    #[arg(long)]
    pub dry_run: bool,
}
