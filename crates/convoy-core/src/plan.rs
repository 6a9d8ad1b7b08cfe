//! Dependency scheduler: turns the registry (or a target subset of it) into
//! an ordered sequence of waves.
//!
//! A wave is a name-sorted set of stacks with no dependency edges between
//! them, safe to run concurrently. Waves are strictly ordered: every stack's
//! dependencies sit in an earlier wave. Decomposition is Kahn's algorithm —
//! repeatedly extract the zero-in-degree set — so any cycle is detected
//! before a single external command runs.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConvoyError, Result};
use crate::manifest::Registry;
use crate::types::StackDefinition;

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    waves: Vec<Vec<StackDefinition>>,
}

impl ExecutionPlan {
    /// Build a startup-oriented plan for the whole fleet (`targets = None`)
    /// or for the named stacks plus their transitive dependencies.
    pub fn build(registry: &Registry, targets: Option<&[String]>) -> Result<Self> {
        let selected = select(registry, targets)?;

        // In-degree = number of dependencies inside the selected set.
        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for name in &selected {
            let def = registry.get(name).ok_or_else(|| ConvoyError::UnknownStacks {
                names: vec![name.clone()],
            })?;
            let deps: Vec<&str> = def
                .depends_on
                .iter()
                .map(String::as_str)
                .filter(|d| selected.contains(*d))
                .collect();
            indegree.insert(def.name.as_str(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(def.name.as_str());
            }
        }

        let mut waves: Vec<Vec<StackDefinition>> = Vec::new();
        let mut remaining: BTreeSet<&str> = indegree.keys().copied().collect();

        while !remaining.is_empty() {
            // BTreeSet iteration gives the deterministic name tie-break.
            let ready: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|n| indegree[n] == 0)
                .collect();

            if ready.is_empty() {
                let stacks = find_cycle(registry, &remaining);
                return Err(ConvoyError::DependencyCycle { stacks });
            }

            for name in &ready {
                remaining.remove(name);
                for dependent in dependents.get(name).into_iter().flatten() {
                    if let Some(d) = indegree.get_mut(dependent) {
                        *d -= 1;
                    }
                }
            }

            waves.push(
                ready
                    .iter()
                    .filter_map(|n| registry.get(n).cloned())
                    .collect(),
            );
        }

        tracing::debug!(
            waves = waves.len(),
            stacks = waves.iter().map(Vec::len).sum::<usize>(),
            "built execution plan"
        );
        Ok(Self { waves })
    }

    /// The teardown orientation: same waves, opposite order, so every stack
    /// comes down before anything it depends on.
    pub fn reversed(&self) -> Self {
        let mut waves = self.waves.clone();
        waves.reverse();
        Self { waves }
    }

    pub fn waves(&self) -> &[Vec<StackDefinition>] {
        &self.waves
    }

    /// Wave structure as plain names, for display and `--dry-run` output.
    pub fn wave_names(&self) -> Vec<Vec<String>> {
        self.waves
            .iter()
            .map(|w| w.iter().map(|s| s.name.clone()).collect())
            .collect()
    }

    pub fn stacks(&self) -> impl Iterator<Item = &StackDefinition> {
        self.waves.iter().flatten()
    }

    pub fn stack_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

/// Resolve the target set: whole fleet, or the named stacks plus the
/// transitive closure of their dependencies.
fn select(registry: &Registry, targets: Option<&[String]>) -> Result<BTreeSet<String>> {
    let Some(targets) = targets else {
        return Ok(registry.names().into_iter().collect());
    };

    let unknown: Vec<String> = targets
        .iter()
        .filter(|t| !registry.contains(t))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ConvoyError::UnknownStacks { names: unknown });
    }

    let mut selected = BTreeSet::new();
    let mut pending: Vec<String> = targets.to_vec();
    while let Some(name) = pending.pop() {
        if !selected.insert(name.clone()) {
            continue;
        }
        if let Some(def) = registry.get(&name) {
            pending.extend(def.depends_on.iter().cloned());
        }
    }
    Ok(selected)
}

/// Recover one concrete cycle from the residual graph so the error names the
/// stacks involved rather than everything left over.
fn find_cycle(registry: &Registry, remaining: &BTreeSet<&str>) -> Vec<String> {
    // Every residual node has at least one dependency inside the residual
    // set, so following first such edges must revisit a node.
    let Some(start) = remaining.iter().next() else {
        return Vec::new();
    };
    let mut path: Vec<&str> = Vec::new();
    let mut cur = *start;
    loop {
        if let Some(pos) = path.iter().position(|n| *n == cur) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(cur.to_string());
            return cycle;
        }
        path.push(cur);
        let next = registry
            .get(cur)
            .and_then(|d| d.depends_on.iter().find(|dep| remaining.contains(dep.as_str())));
        match next {
            Some(dep) => cur = dep.as_str(),
            None => return path.iter().map(|s| s.to_string()).collect(),
        }
    }
}
