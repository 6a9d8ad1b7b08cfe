//! Prune controller: post-cycle cleanup of unused images.
//!
//! Hard invariant: an image backing a currently running container is never
//! removed, for any scope. Fleet scope delegates to `docker image prune`,
//! which the engine guarantees never deletes referenced images; stack scope
//! issues raw `docker rmi` and therefore enforces the guard explicitly
//! against the running set reported by `docker ps`.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::docker::{argv, DockerCli};
use crate::error::Result;
use crate::types::StackDefinition;

#[derive(Debug, Clone)]
pub enum PruneScope {
    /// Every unused image on the host.
    Fleet,
    /// Only superseded versions of the given stacks' service images.
    Stacks(Vec<StackDefinition>),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub removed: Vec<String>,
    /// Candidates left alone because a running container still uses them
    /// (or the engine refused to delete them).
    pub protected: Vec<String>,
}

pub async fn prune<D: DockerCli>(cli: &D, scope: &PruneScope) -> Result<PruneReport> {
    match scope {
        PruneScope::Fleet => prune_fleet(cli).await,
        PruneScope::Stacks(stacks) => prune_stacks(cli, stacks).await,
    }
}

async fn prune_fleet<D: DockerCli>(cli: &D) -> Result<PruneReport> {
    tracing::info!("pruning unused images fleet-wide");
    let out = cli.run(argv(&["image", "prune", "-a", "-f"])).await?;
    let removed = out
        .lines()
        .filter_map(|l| {
            l.strip_prefix("untagged: ")
                .or_else(|| l.strip_prefix("deleted: "))
        })
        .map(str::to_string)
        .collect();
    Ok(PruneReport {
        removed,
        protected: Vec::new(),
    })
}

/// Remove local images that share a repository with a stack's service images
/// but sit at a different tag — the versions a `pull` cycle superseded.
async fn prune_stacks<D: DockerCli>(cli: &D, stacks: &[StackDefinition]) -> Result<PruneReport> {
    let running: BTreeSet<String> = cli
        .run(argv(&["ps", "--format", "{{.Image}}"]))
        .await?
        .lines()
        .map(str::to_string)
        .collect();

    let local: Vec<String> = cli
        .run(argv(&["images", "--format", "{{.Repository}}:{{.Tag}}"]))
        .await?
        .lines()
        .map(str::to_string)
        .collect();

    // Current service images across the selected stacks, straight from the
    // compose files — these are what the stacks run now and must stay.
    let mut current = BTreeSet::new();
    let mut repositories = BTreeSet::new();
    for stack in stacks {
        let mut args = argv(&["compose", "-f"]);
        args.push(stack.compose_file.display().to_string());
        if let Some(env) = &stack.env_file {
            args.push("--env-file".into());
            args.push(env.display().to_string());
        }
        args.extend(argv(&["config", "--images"]));
        for image in cli.run(args).await?.lines() {
            let image = image.trim();
            if image.is_empty() {
                continue;
            }
            current.insert(image.to_string());
            repositories.insert(repository_of(image).to_string());
        }
    }

    let mut report = PruneReport::default();
    for image in local {
        if !repositories.contains(repository_of(&image)) || current.contains(&image) {
            continue;
        }
        if running.contains(&image) {
            tracing::debug!(%image, "kept: backs a running container");
            report.protected.push(image);
            continue;
        }
        match cli.run(argv(&["rmi", &image])).await {
            Ok(_) => {
                tracing::info!(%image, "removed superseded image");
                report.removed.push(image);
            }
            Err(e) => {
                // The engine refuses images still referenced by a container.
                tracing::warn!(%image, error = %e, "could not remove image");
                report.protected.push(image);
            }
        }
    }
    Ok(report)
}

/// The repository part of `repo[:tag]`, tolerating registry ports
/// (`host:5000/app:v1`).
fn repository_of(image: &str) -> &str {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => repo,
        _ => image,
    }
}
