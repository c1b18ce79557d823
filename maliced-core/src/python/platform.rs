//! Platform detection and the runtime download table.
//!
//! The table maps an (OS, architecture) pair to the archive holding a
//! self-contained CPython build. It is plain data so callers and tests can
//! substitute their own.

use std::fmt;

use crate::error::ProvisionError;

// ============================================================================
// Operating System / Architecture
// ============================================================================

/// Operating system family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Os {
    Windows,
    Linux,
    Macos,
    Other(String),
}

impl Os {
    /// Parses both Rust (`windows`, `macos`) and Node-style (`win32`,
    /// `darwin`) spellings.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "windows" | "win32" => Self::Windows,
            "linux" => Self::Linux,
            "macos" | "darwin" => Self::Macos,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Other(name) => name,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows)
    }
}

/// CPU architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arch {
    X64,
    X86,
    Arm64,
    Other(String),
}

impl Arch {
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "x86_64" | "x64" | "amd64" => Self::X64,
            "x86" | "ia32" | "i686" => Self::X86,
            "aarch64" | "arm64" => Self::Arm64,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::X64 => "x86_64",
            Self::X86 => "x86",
            Self::Arm64 => "aarch64",
            Self::Other(name) => name,
        }
    }
}

/// An (OS, architecture) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Parses OS and architecture names.
    pub fn from_names(os: &str, arch: &str) -> Self {
        Self::new(Os::parse(os), Arch::parse(arch))
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self::from_names(std::env::consts::OS, std::env::consts::ARCH)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

// ============================================================================
// Archive Format
// ============================================================================

/// Archive format of a runtime download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// ZIP archive (.zip)
    Zip,
    /// Gzip-compressed tar archive (.tar.gz, .tgz)
    TarGz,
}

impl ArchiveFormat {
    /// Infers the archive format from a URL or filename.
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// File extension used for the temporary download.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

// ============================================================================
// Download Table
// ============================================================================

/// A runtime archive for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDownload {
    pub url: String,
    pub format: ArchiveFormat,
    /// Expected SHA256 hash (lowercase hex), or None to skip verification.
    pub sha256: Option<String>,
}

impl RuntimeDownload {
    /// Creates an entry, inferring the format from the URL.
    ///
    /// Falls back to zip when the URL has no recognizable extension.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let format = ArchiveFormat::from_url(&url).unwrap_or(ArchiveFormat::Zip);
        Self {
            url,
            format,
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }
}

/// Static mapping of platforms to runtime archives.
#[derive(Debug, Clone, Default)]
pub struct DownloadTable {
    entries: Vec<(Platform, RuntimeDownload)>,
}

const CPYTHON_VERSION: &str = "3.12.10";
const STANDALONE_RELEASE: &str = "20250409";

impl DownloadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the entry for `platform`.
    pub fn with(mut self, platform: Platform, download: RuntimeDownload) -> Self {
        self.entries.retain(|(p, _)| p != &platform);
        self.entries.push((platform, download));
        self
    }

    /// Built-in table: the embeddable CPython zip on Windows, the
    /// python-build-standalone `install_only` tarballs elsewhere.
    pub fn builtin() -> Self {
        let embed = |suffix: &str| {
            RuntimeDownload::new(format!(
                "https://www.python.org/ftp/python/{v}/python-{v}-embed-{suffix}.zip",
                v = CPYTHON_VERSION
            ))
        };
        let standalone = |triple: &str| {
            RuntimeDownload::new(format!(
                "https://github.com/astral-sh/python-build-standalone/releases/download/{r}/cpython-{v}+{r}-{triple}-install_only.tar.gz",
                r = STANDALONE_RELEASE,
                v = CPYTHON_VERSION
            ))
        };

        Self::new()
            .with(Platform::new(Os::Windows, Arch::X64), embed("amd64"))
            .with(Platform::new(Os::Windows, Arch::X86), embed("win32"))
            .with(Platform::new(Os::Windows, Arch::Arm64), embed("arm64"))
            .with(
                Platform::new(Os::Linux, Arch::X64),
                standalone("x86_64-unknown-linux-gnu"),
            )
            .with(
                Platform::new(Os::Linux, Arch::Arm64),
                standalone("aarch64-unknown-linux-gnu"),
            )
            .with(
                Platform::new(Os::Macos, Arch::X64),
                standalone("x86_64-apple-darwin"),
            )
            .with(
                Platform::new(Os::Macos, Arch::Arm64),
                standalone("aarch64-apple-darwin"),
            )
    }

    /// Looks up the archive for `platform`.
    ///
    /// There is no fallback: an unknown pair is an error.
    pub fn resolve(&self, platform: &Platform) -> Result<&RuntimeDownload, ProvisionError> {
        self.entries
            .iter()
            .find(|(p, _)| p == platform)
            .map(|(_, d)| d)
            .ok_or_else(|| ProvisionError::UnsupportedPlatform {
                os: platform.os.as_str().to_string(),
                arch: platform.arch.as_str().to_string(),
            })
    }

    pub fn platforms(&self) -> impl Iterator<Item = &Platform> {
        self.entries.iter().map(|(p, _)| p)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
