//! Application path resolution.
//!
//! Two roots matter:
//!
//! - the install root, next to the running executable; it holds the Python
//!   runtime, the backend scripts and the bundled watermarks,
//! - the user data directory, which holds settings, user watermarks and
//!   processed output:
//!   - Linux: `~/.local/share/maliced/`
//!   - macOS: `~/Library/Application Support/maliced/`
//!   - Windows: `C:\Users\<User>\AppData\Roaming\maliced\`
//!
//! Both can be overridden through environment variables, which is how tests
//! and portable installs relocate them.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::python::RuntimeLayout;

/// Overrides the install root.
pub const APP_ROOT_ENV: &str = "MALICED_APP_ROOT";

/// Overrides the user data directory.
pub const DATA_DIR_ENV: &str = "MALICED_DATA_DIR";

const APP_DIR_NAME: &str = "maliced";
const SETTINGS_FILE: &str = "user-settings.json";

/// Resolved application directories.
///
/// Computed once at startup; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    app_root: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new(app_root: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Resolves both roots from the environment and the executable location.
    ///
    /// The working directory never influences the result.
    pub fn resolve() -> Result<Self> {
        let app_root = match std::env::var_os(APP_ROOT_ENV) {
            Some(root) => PathBuf::from(root),
            None => {
                let exe = std::env::current_exe().context("Failed to locate the executable")?;
                exe.parent()
                    .map(Path::to_path_buf)
                    .context("Executable has no parent directory")?
            }
        };

        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|d| d.join(APP_DIR_NAME))
                .unwrap_or_else(|| app_root.join("user_data")),
        };

        let paths = Self::new(app_root, data_dir);
        debug!(
            "App root: {}, data dir: {}",
            paths.app_root.display(),
            paths.data_dir.display()
        );
        Ok(paths)
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `{app}/python`
    pub fn runtime_root(&self) -> PathBuf {
        self.app_root.join("python")
    }

    /// Layout of the runtime for the OS this binary runs on.
    pub fn runtime_layout(&self) -> RuntimeLayout {
        RuntimeLayout::native(self.runtime_root())
    }

    /// `{app}/backend`
    pub fn backend_dir(&self) -> PathBuf {
        self.app_root.join("backend")
    }

    pub fn process_script(&self) -> PathBuf {
        self.backend_dir().join("process.py")
    }

    pub fn metadata_script(&self) -> PathBuf {
        self.backend_dir().join("get_metadata.py")
    }

    /// `{app}/watermark`
    pub fn bundled_watermark_dir(&self) -> PathBuf {
        self.app_root.join("watermark")
    }

    /// `{data}/watermark`
    pub fn user_watermark_dir(&self) -> PathBuf {
        self.data_dir.join("watermark")
    }

    /// `{data}/user-settings.json`
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// `{data}/output`
    pub fn default_output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    /// Staging directory for images handed to the backend.
    pub fn input_dir(&self) -> PathBuf {
        self.data_dir.join("input")
    }

    /// Output directory honoring a user-configured override.
    ///
    /// Relative overrides are resolved against the data directory.
    pub fn output_dir(&self, configured: Option<&str>) -> PathBuf {
        match configured.map(str::trim).filter(|s| !s.is_empty()) {
            Some(dir) => self.data_dir.join(dir),
            None => self.default_output_dir(),
        }
    }

    /// Creates the writable directories.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs_exist(&self) -> Result<()> {
        for dir in [
            self.data_dir.clone(),
            self.user_watermark_dir(),
            self.default_output_dir(),
            self.input_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}
