//! Error types surfaced by the provisioner and the invocation bridge.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a provisioning run.
///
/// Everything except [`ProvisionError::UnsupportedPlatform`] can be retried by
/// invoking provisioning again once the underlying cause (usually network
/// connectivity) is fixed.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Unsupported platform: {os} ({arch})")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Failed to download {url}: {source:#}")]
    DownloadFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to extract {}: {source:#}", archive.display())]
    ExtractFailed {
        archive: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Setup failed during {step}: {source:#}")]
    SetupFailed {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ProvisionError {
    pub(crate) fn setup(step: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::SetupFailed {
            step,
            source: source.into(),
        }
    }

    /// Whether re-running provisioning can succeed without a code change.
    pub fn is_user_retryable(&self) -> bool {
        !matches!(self, Self::UnsupportedPlatform { .. })
    }
}

/// Failure of a call through the invocation bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Python runtime not found at {}. Run setup first.", .0.display())]
    RuntimeMissing(PathBuf),

    #[error("File does not exist: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File is not readable: {}", .0.display())]
    Unreadable(PathBuf),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Watermark not found: {0} (tried .png, .svg)")]
    WatermarkNotFound(String),

    #[error("Python process exited with code {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("Failed to parse metadata output: {0}")]
    InvalidMetadata(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode processing options: {0}")]
    Encode(#[source] serde_json::Error),
}
