//! `convoy-core` — fleet model and orchestration engine for the `convoy` CLI.
//!
//! The pipeline, leaves first:
//!
//! ```text
//! Registry        ← convoy.yaml (or directory convention) → StackDefinitions
//!     │
//!     ▼
//! ExecutionPlan   ← Kahn wave decomposition over dependency edges
//!     │
//!     ▼
//! coordinator     ← waves as barriers, bounded parallelism inside a wave
//!     │               └─ StackExecutor: `docker compose` per stack
//!     ▼
//! RunReport       ← per-stack outcomes, fleet summary, exit code
//! ```
//!
//! Pruning and docker preflight (daemon check, external networks) sit beside
//! the pipeline behind the [`docker::DockerCli`] capability.

pub mod coordinator;
pub mod docker;
pub mod error;
pub mod exec;
pub mod manifest;
pub mod plan;
pub mod prune;
pub mod report;
pub mod types;

pub use coordinator::RunOptions;
pub use error::{ConvoyError, ManifestIssue, Result};
pub use exec::{ComposeExecutor, StackExecutor};
pub use manifest::Registry;
pub use plan::ExecutionPlan;
pub use prune::{PruneReport, PruneScope};
pub use report::{Outcome, RunReport, SkipReason, StackResult};
pub use types::{Operation, StackDefinition};
