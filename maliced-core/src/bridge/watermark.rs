//! Watermark lookup.
//!
//! User-provided watermarks shadow the bundled ones of the same name.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::AppPaths;
use crate::error::BridgeError;

const EXTENSIONS: &[&str] = &["png", "svg"];

/// A selectable watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkEntry {
    /// File stem, stored in settings.
    pub value: String,
    /// Stem with underscores shown as spaces.
    pub display_name: String,
    pub path: PathBuf,
}

/// Where watermarks are looked up.
#[derive(Debug, Clone)]
pub struct WatermarkCatalog {
    user_dir: PathBuf,
    bundled_dir: PathBuf,
}

impl WatermarkCatalog {
    pub fn new(user_dir: impl Into<PathBuf>, bundled_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir: user_dir.into(),
            bundled_dir: bundled_dir.into(),
        }
    }

    pub fn from_paths(paths: &AppPaths) -> Self {
        Self::new(paths.user_watermark_dir(), paths.bundled_watermark_dir())
    }

    /// Resolves a watermark name to a file.
    ///
    /// An existing absolute path is returned as is. A name with a `.png` or
    /// `.svg` extension is looked up verbatim; a bare name tries `.png`, then
    /// `.svg`. Each candidate is tried in the user directory first.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, BridgeError> {
        let as_path = Path::new(name);
        if as_path.is_absolute() && as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }

        let candidates: Vec<String> = if has_watermark_extension(name) {
            vec![name.to_string()]
        } else {
            EXTENSIONS.iter().map(|ext| format!("{}.{}", name, ext)).collect()
        };

        for file_name in &candidates {
            for dir in [&self.user_dir, &self.bundled_dir] {
                let path = dir.join(file_name);
                if path.is_file() {
                    debug!("Resolved watermark {} to {}", name, path.display());
                    return Ok(path);
                }
            }
        }

        Err(BridgeError::WatermarkNotFound(name.to_string()))
    }

    /// Lists the bundled watermarks, sorted by name.
    pub fn list(&self) -> Result<Vec<WatermarkEntry>, BridgeError> {
        if !self.bundled_dir.is_dir() {
            warn!(
                "Watermark directory does not exist: {}",
                self.bundled_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.bundled_dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_file() || !has_watermark_extension(file_name) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            entries.push(WatermarkEntry {
                value: stem.to_string(),
                display_name: stem.replace('_', " "),
                path: path.clone(),
            });
        }

        entries.sort_by(|a, b| a.value.cmp(&b.value));
        Ok(entries)
    }
}

fn has_watermark_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
}
