//! Project registry: loads and validates the fleet's stack definitions.
//!
//! Two sources are supported:
//! - `convoy.yaml` at the fleet root, listing stacks with optional overrides
//!   and dependency declarations.
//! - Directory convention: with no manifest, every immediate subdirectory
//!   containing a compose file becomes a stack named after the directory.
//!
//! Validation is exhaustive — every structural problem is collected into one
//! `ConvoyError::Manifest` instead of failing on the first.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ConvoyError, ManifestIssue, Result};
use crate::types::StackDefinition;

pub const MANIFEST_NAMES: [&str; 2] = ["convoy.yaml", "convoy.yml"];

/// Compose file names probed when an entry doesn't name one explicitly.
const COMPOSE_NAMES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yml",
    "docker-compose.yaml",
];

// ---------------------------------------------------------------------------
// Manifest file shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    stacks: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestEntry {
    name: String,
    /// Stack directory relative to the fleet root (default: the stack name).
    dir: Option<PathBuf>,
    compose_file: Option<PathBuf>,
    env_file: Option<PathBuf>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    external_networks: Vec<String>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The validated set of stack definitions for one fleet root.
///
/// Read-only shared data for the lifetime of one invocation; the scheduler
/// and coordinator borrow from it but never mutate it.
#[derive(Debug)]
pub struct Registry {
    stacks: BTreeMap<String, StackDefinition>,
}

impl Registry {
    /// Load the fleet from `root`: manifest if present, discovery otherwise.
    pub fn load(root: &Path) -> Result<Self> {
        match manifest_path(root) {
            Some(path) => Self::from_manifest(root, &path),
            None => Self::discover(root),
        }
    }

    fn from_manifest(root: &Path, path: &Path) -> Result<Self> {
        tracing::debug!(manifest = %path.display(), "loading fleet manifest");
        let text = std::fs::read_to_string(path).map_err(|e| ConvoyError::ManifestRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ManifestFile =
            serde_yaml::from_str(&text).map_err(|e| ConvoyError::ManifestParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut issues = Vec::new();
        let mut defs = Vec::with_capacity(file.stacks.len());

        for entry in file.stacks {
            let dir = root.join(entry.dir.unwrap_or_else(|| PathBuf::from(&entry.name)));

            let compose_file = match entry.compose_file {
                Some(rel) => {
                    let p = dir.join(rel);
                    if !p.is_file() {
                        issues.push(ManifestIssue::new(
                            &entry.name,
                            format!("compose file not found: {}", p.display()),
                        ));
                    }
                    p
                }
                None => match probe_compose(&dir) {
                    Some(p) => p,
                    None => {
                        issues.push(ManifestIssue::new(
                            &entry.name,
                            format!("no compose file found in {}", dir.display()),
                        ));
                        dir.join(COMPOSE_NAMES[0])
                    }
                },
            };

            let env_file = match entry.env_file {
                Some(rel) => {
                    let p = dir.join(rel);
                    if !p.is_file() {
                        issues.push(ManifestIssue::new(
                            &entry.name,
                            format!("env file not found: {}", p.display()),
                        ));
                    }
                    Some(p)
                }
                None => {
                    let p = dir.join(".env");
                    p.is_file().then_some(p)
                }
            };

            defs.push(StackDefinition {
                name: entry.name,
                dir,
                compose_file,
                env_file,
                depends_on: entry.depends_on,
                external_networks: entry.external_networks,
            });
        }

        issues.extend(structural_issues(&defs));
        if !issues.is_empty() {
            return Err(ConvoyError::Manifest { issues });
        }

        let stacks = defs.into_iter().map(|d| (d.name.clone(), d)).collect();
        Ok(Self { stacks })
    }

    /// Directory-convention fallback: each immediate subdirectory with a
    /// compose file is a stack; `.env` is picked up when present.
    pub fn discover(root: &Path) -> Result<Self> {
        let unreadable = |e: std::io::Error| ConvoyError::ManifestRead {
            path: root.to_path_buf(),
            source: e,
        };
        let mut stacks = BTreeMap::new();
        for dent in std::fs::read_dir(root).map_err(unreadable)? {
            let dent = dent.map_err(unreadable)?;
            let dir = dent.path();
            if !dir.is_dir() {
                continue;
            }
            let name = match dent.file_name().into_string() {
                Ok(n) if !n.starts_with('.') => n,
                _ => continue,
            };
            let Some(compose_file) = probe_compose(&dir) else {
                continue;
            };
            let env = dir.join(".env");
            let env_file = env.is_file().then_some(env);
            stacks.insert(
                name.clone(),
                StackDefinition {
                    name,
                    dir,
                    compose_file,
                    env_file,
                    depends_on: Vec::new(),
                    external_networks: Vec::new(),
                },
            );
        }
        tracing::debug!(count = stacks.len(), "discovered stacks by convention");
        Ok(Self { stacks })
    }

    /// Build a registry from in-memory definitions, applying only the
    /// structural half of validation (duplicate names, unknown dependencies).
    pub fn from_stacks(defs: Vec<StackDefinition>) -> Result<Self> {
        let issues = structural_issues(&defs);
        if !issues.is_empty() {
            return Err(ConvoyError::Manifest { issues });
        }
        let stacks = defs.into_iter().map(|d| (d.name.clone(), d)).collect();
        Ok(Self { stacks })
    }

    pub fn get(&self, name: &str) -> Option<&StackDefinition> {
        self.stacks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stacks.contains_key(name)
    }

    /// All stacks, ordered by name.
    pub fn stacks(&self) -> impl Iterator<Item = &StackDefinition> {
        self.stacks.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.stacks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

fn manifest_path(root: &Path) -> Option<PathBuf> {
    MANIFEST_NAMES
        .iter()
        .map(|n| root.join(n))
        .find(|p| p.is_file())
}

fn probe_compose(dir: &Path) -> Option<PathBuf> {
    COMPOSE_NAMES
        .iter()
        .map(|n| dir.join(n))
        .find(|p| p.is_file())
}

fn structural_issues(defs: &[StackDefinition]) -> Vec<ManifestIssue> {
    let mut issues = Vec::new();

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    for def in defs {
        *seen.entry(def.name.as_str()).or_insert(0) += 1;
    }
    for (name, count) in &seen {
        if *count > 1 {
            issues.push(ManifestIssue::new(
                *name,
                format!("duplicate stack name ({count} entries)"),
            ));
        }
    }

    for def in defs {
        for dep in &def.depends_on {
            if !seen.contains_key(dep.as_str()) {
                issues.push(ManifestIssue::new(
                    &def.name,
                    format!("depends on unknown stack '{dep}'"),
                ));
            }
        }
    }

    issues
}
