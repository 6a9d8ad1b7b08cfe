use anyhow::Context;
use std::path::Path;

use convoy_core::{docker, docker::SystemDocker, prune, ConvoyError, PruneScope, Registry};

use crate::cmd::SelectArgs;
use crate::output::print_json;

/// Standalone prune: whole fleet with `--all`, or scoped to named stacks.
pub async fn run(root: &Path, select: SelectArgs, json: bool) -> anyhow::Result<i32> {
    let scope = match select.resolve()? {
        None => PruneScope::Fleet,
        Some(names) => {
            let registry = Registry::load(root).context("failed to load fleet")?;
            let unknown: Vec<String> = names
                .iter()
                .filter(|n| !registry.contains(n))
                .cloned()
                .collect();
            if !unknown.is_empty() {
                return Err(ConvoyError::UnknownStacks { names: unknown }.into());
            }
            let stacks = names
                .iter()
                .filter_map(|n| registry.get(n).cloned())
                .collect();
            PruneScope::Stacks(stacks)
        }
    };

    let engine = SystemDocker::locate()?;
    docker::daemon_ready(&engine).await?;
    let report = prune::prune(&engine, &scope).await?;

    if json {
        print_json(&report)?;
    } else {
        for image in &report.removed {
            println!("removed {image}");
        }
        for image in &report.protected {
            println!("kept    {image} (in use)");
        }
        println!(
            "pruned {} image(s), {} kept",
            report.removed.len(),
            report.protected.len()
        );
    }
    Ok(0)
}
