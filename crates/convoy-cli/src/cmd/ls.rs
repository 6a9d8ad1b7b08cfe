use anyhow::Context;
use std::path::Path;

use convoy_core::Registry;

use crate::output::{print_json, print_table};

/// List the fleet's stacks with their dependency and network declarations.
pub fn run(root: &Path, json: bool) -> anyhow::Result<i32> {
    let registry = Registry::load(root).context("failed to load fleet")?;

    if json {
        let stacks: Vec<_> = registry.stacks().collect();
        print_json(&stacks)?;
        return Ok(0);
    }

    if registry.is_empty() {
        println!("No stacks found under {}.", root.display());
        return Ok(0);
    }

    let rows: Vec<Vec<String>> = registry
        .stacks()
        .map(|s| {
            vec![
                s.name.clone(),
                s.depends_on.join(", "),
                s.external_networks.join(", "),
                s.compose_file.display().to_string(),
            ]
        })
        .collect();
    print_table(&["NAME", "DEPENDS ON", "NETWORKS", "COMPOSE FILE"], &rows);
    Ok(0)
}
