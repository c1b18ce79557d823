//! Filesystem layout of the self-contained Python runtime.
//!
//! - Windows (embeddable zip): `{root}/python.exe`, scripts in `{root}/Scripts/`
//! - Linux/macOS (standalone build): `{root}/bin/python3`, scripts in `{root}/bin/`

use std::path::{Path, PathBuf};

use super::platform::Os;

/// Absolute paths of a runtime installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    /// Directory holding the whole runtime.
    pub root: PathBuf,
    /// The interpreter.
    pub executable: PathBuf,
    /// Where pip drops its console scripts.
    pub scripts_dir: PathBuf,
    windows: bool,
}

impl RuntimeLayout {
    /// Layout for a runtime rooted at `root` on `os`.
    pub fn for_os(root: impl Into<PathBuf>, os: &Os) -> Self {
        let root = root.into();
        let windows = os.is_windows();
        let (executable, scripts_dir) = if windows {
            (root.join("python.exe"), root.join("Scripts"))
        } else {
            (root.join("bin").join("python3"), root.join("bin"))
        };

        Self {
            root,
            executable,
            scripts_dir,
            windows,
        }
    }

    /// Layout for the OS this binary runs on.
    pub fn native(root: impl Into<PathBuf>) -> Self {
        Self::for_os(root, &Os::parse(std::env::consts::OS))
    }

    /// The pip console script inside the scripts directory.
    pub fn pip_executable(&self) -> PathBuf {
        let name = if self.windows { "pip.exe" } else { "pip" };
        self.scripts_dir.join(name)
    }

    /// Whether the interpreter file is present.
    ///
    /// This is an existence check only; a damaged interpreter still counts.
    pub fn is_installed(&self) -> bool {
        self.executable.is_file()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
