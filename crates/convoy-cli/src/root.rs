use convoy_core::manifest::MANIFEST_NAMES;
use std::path::{Path, PathBuf};

/// Resolve the fleet root directory.
///
/// Priority:
/// 1. `--root` flag / `CONVOY_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for a `convoy.yaml`
/// 3. Fall back to `cwd` (directory-convention discovery)
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut dir = cwd.clone();
    loop {
        if MANIFEST_NAMES.iter().any(|n| dir.join(n).is_file()) {
            return dir;
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => break,
        }
    }

    cwd
}
