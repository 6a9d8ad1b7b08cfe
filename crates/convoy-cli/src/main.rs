mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use convoy_core::{ConvoyError, Operation};
use std::path::PathBuf;

use cmd::{RunArgs, SelectArgs};

#[derive(Parser)]
#[command(
    name = "convoy",
    about = "Bulk lifecycle orchestrator for a compose-managed homelab fleet",
    version,
    propagate_version = true
)]
struct Cli {
    /// Fleet root (default: auto-detect from convoy.yaml)
    #[arg(long, global = true, env = "CONVOY_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring stacks up, dependencies first
    Up {
        #[command(flatten)]
        args: RunArgs,

        /// Prune superseded images after a fully successful cycle
        #[arg(long)]
        prune: bool,
    },

    /// Tear stacks down, dependents first
    Down {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Pull updated images for stacks
    Pull {
        #[command(flatten)]
        args: RunArgs,

        /// Prune superseded images after a fully successful cycle
        #[arg(long)]
        prune: bool,
    },

    /// Restart stacks' containers
    Restart {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Remove unused images (whole fleet or per stack)
    Prune {
        #[command(flatten)]
        select: SelectArgs,
    },

    /// List the fleet's stacks
    Ls,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Ls => tracing::Level::WARN,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Up { args, prune } => {
            cmd::lifecycle::run(&root, Operation::Up, args, prune, cli.json).await
        }
        Commands::Down { args } => {
            cmd::lifecycle::run(&root, Operation::Down, args, false, cli.json).await
        }
        Commands::Pull { args, prune } => {
            cmd::lifecycle::run(&root, Operation::Pull, args, prune, cli.json).await
        }
        Commands::Restart { args } => {
            cmd::lifecycle::run(&root, Operation::Restart, args, false, cli.json).await
        }
        Commands::Prune { select } => cmd::prune::run(&root, select, cli.json).await,
        Commands::Ls => cmd::ls::run(&root, cli.json),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

/// Exit 2 for configuration/validation failures raised before any stack ran;
/// exit 1 for anything that went wrong mid-run.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.chain().find_map(|c| c.downcast_ref::<ConvoyError>()) {
        Some(e) if e.is_config_error() => 2,
        Some(_) => 1,
        // Anything without a ConvoyError in the chain arose while loading,
        // before execution started.
        None => 2,
    }
}
