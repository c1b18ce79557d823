//! Enables `import site` in the embeddable runtime's `._pth` file.
//!
//! The Windows embeddable distribution ships `pythonXY._pth` with the site
//! import commented out, which keeps pip-installed packages invisible. Other
//! builds have no such file and need nothing.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use tracing::{debug, info, warn};

const DISABLED_MARKER: &str = "#import site";
const ENABLED_MARKER: &str = "import site";

/// Result of [`patch_runtime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The marker was rewritten.
    Enabled(PathBuf),
    /// The file exists and site import was already on.
    AlreadyEnabled(PathBuf),
    /// No `._pth` file in the runtime root.
    NotPresent,
}

/// Rewrites the disabled marker to the enabled form.
///
/// Only the first occurrence is touched. Content without the marker is
/// returned borrowed and unchanged.
pub fn enable_site_import(content: &str) -> Cow<'_, str> {
    if content.contains(DISABLED_MARKER) {
        Cow::Owned(content.replacen(DISABLED_MARKER, ENABLED_MARKER, 1))
    } else {
        Cow::Borrowed(content)
    }
}

/// Finds the `python*._pth` file directly under `root`.
pub fn find_pth_file(root: &Path) -> Option<PathBuf> {
    let pattern = format!(
        "{}{}python*._pth",
        glob::Pattern::escape(&root.to_string_lossy()),
        std::path::MAIN_SEPARATOR
    );

    let entries = match glob(&pattern) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Invalid ._pth glob pattern '{}': {}", pattern, err);
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Patches the runtime's `._pth` file in place, if there is one.
pub fn patch_runtime(root: &Path) -> Result<PatchOutcome> {
    let Some(pth_path) = find_pth_file(root) else {
        debug!("No ._pth file under {}", root.display());
        return Ok(PatchOutcome::NotPresent);
    };

    let content = fs::read_to_string(&pth_path)
        .with_context(|| format!("Failed to read {}", pth_path.display()))?;

    match enable_site_import(&content) {
        Cow::Borrowed(_) => {
            debug!("Site import already enabled in {}", pth_path.display());
            Ok(PatchOutcome::AlreadyEnabled(pth_path))
        }
        Cow::Owned(patched) => {
            fs::write(&pth_path, patched)
                .with_context(|| format!("Failed to write {}", pth_path.display()))?;
            info!("Enabled import site in {}", pth_path.display());
            Ok(PatchOutcome::Enabled(pth_path))
        }
    }
}
