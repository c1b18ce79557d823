//! First-run provisioning of the Python runtime and its libraries.
//!
//! A run is one strictly sequential procedure:
//!
//! 1. optionally wipe the runtime root (`force`),
//! 2. download and extract the runtime archive unless the interpreter is
//!    already present,
//! 3. reconcile libraries: enable site imports, bootstrap pip, install each
//!    required library in order.
//!
//! Download and extraction failures abort the run. Pip bootstrap and
//! per-library failures are recorded in the [`ProvisionReport`] and the run
//! carries on, since an earlier installation may already satisfy them.
//!
//! Two concurrent runs against the same root race on the same files; callers
//! must serialize them (see [`crate::host::SetupService`]).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, error, info, warn};

use super::downloader::{DownloadProgress, Fetcher, HttpFetcher};
use super::extractor::{extract_archive, hoist_nested_root};
use super::layout::RuntimeLayout;
use super::platform::{ArchiveFormat, DownloadTable, Platform};
use super::runner::{CommandRunner, StepOutcome, TokioCommandRunner};
use super::site_config::{patch_runtime, PatchOutcome};
use crate::error::ProvisionError;
use crate::progress::{band, ProgressReporter, ProgressSink};

/// Libraries the backend scripts import.
pub const DEFAULT_LIBRARIES: &[&str] = &["pillow", "numpy", "scipy", "piexif"];

/// Where pip's bootstrap script is fetched from.
pub const GET_PIP_URL: &str = "https://bootstrap.pypa.io/get-pip.py";

const BOOTSTRAP_SCRIPT: &str = "get-pip.py";
const NO_WARN_SCRIPT_LOCATION: &str = "--no-warn-script-location";

// Progress checkpoints.
const P_START: u8 = 5;
const P_DOWNLOADED: u8 = 20;
const P_EXTRACTED: u8 = 30;
const P_PATCH_START: u8 = 10;
const P_PATCHED: u8 = 20;
const P_BOOTSTRAP_FETCHED: u8 = 30;
const P_LIBRARIES_START: u8 = 40;
const P_LIBRARIES_END: u8 = 90;

// ============================================================================
// Configuration
// ============================================================================

/// Immutable inputs of the provisioner.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Platform to archive mapping.
    pub downloads: DownloadTable,
    /// Libraries to install, in order.
    pub libraries: Vec<String>,
    /// URL of pip's bootstrap script.
    pub bootstrap_url: String,
    /// Platform to provision for.
    pub platform: Platform,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            downloads: DownloadTable::builtin(),
            libraries: DEFAULT_LIBRARIES.iter().map(|s| s.to_string()).collect(),
            bootstrap_url: GET_PIP_URL.to_string(),
            platform: Platform::current(),
        }
    }
}

/// Caller intent for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisioningRequest {
    /// Delete any existing runtime before provisioning.
    pub force: bool,
}

impl ProvisioningRequest {
    pub fn check() -> Self {
        Self { force: false }
    }

    pub fn reinstall() -> Self {
        Self { force: true }
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// The interpreter was already present; nothing was downloaded.
    pub fast_path: bool,
    pub site_patch: PatchOutcome,
    pub bootstrap: StepOutcome,
    /// One entry per configured library, in install order.
    pub libraries: Vec<StepOutcome>,
}

impl ProvisionReport {
    pub fn failed_libraries(&self) -> impl Iterator<Item = &StepOutcome> {
        self.libraries.iter().filter(|outcome| !outcome.ok)
    }

    pub fn all_ok(&self) -> bool {
        self.bootstrap.ok && self.libraries.iter().all(|outcome| outcome.ok)
    }
}

// ============================================================================
// Provisioner
// ============================================================================

/// Installs and repairs the runtime under one root directory.
pub struct Provisioner {
    layout: RuntimeLayout,
    config: ProvisionerConfig,
    fetcher: Arc<dyn Fetcher>,
    runner: Arc<dyn CommandRunner>,
}

impl Provisioner {
    pub fn new(
        root: impl Into<PathBuf>,
        config: ProvisionerConfig,
        fetcher: Arc<dyn Fetcher>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let layout = RuntimeLayout::for_os(root, &config.platform.os);
        Self {
            layout,
            config,
            fetcher,
            runner,
        }
    }

    /// Provisioner using the network and real subprocesses.
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self::new(
            root,
            ProvisionerConfig::default(),
            Arc::new(HttpFetcher::new()),
            Arc::new(TokioCommandRunner),
        )
    }

    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Ensures the runtime and every configured library are installed.
    ///
    /// On success `on_progress` has received 100 as its last value.
    pub async fn provision(
        &self,
        request: ProvisioningRequest,
        on_progress: Option<&ProgressSink>,
    ) -> Result<ProvisionReport, ProvisionError> {
        let progress = ProgressReporter::new(on_progress);
        let root = self.layout.root().to_path_buf();

        info!(
            "Provisioning Python runtime at {} (force: {})",
            root.display(),
            request.force
        );

        if request.force {
            self.remove_runtime().await?;
        }

        let fast_path = !request.force && self.layout.is_installed();
        if fast_path {
            info!("Python is already set up, verifying libraries");
            progress.report(P_START);
        } else {
            self.install_runtime(&progress).await?;
        }

        let mut report = self.reconcile_libraries(&progress).await?;
        report.fast_path = fast_path;

        progress.report(P_LIBRARIES_END);
        progress.finish();

        let failed: Vec<&str> = report.failed_libraries().map(|o| o.name.as_str()).collect();
        if failed.is_empty() {
            info!("Python setup complete");
        } else {
            warn!("Python setup complete, but some libraries failed: {:?}", failed);
        }

        Ok(report)
    }

    async fn remove_runtime(&self) -> Result<(), ProvisionError> {
        let root = self.layout.root();
        if !root.exists() {
            return Ok(());
        }

        tokio::fs::remove_dir_all(root)
            .await
            .with_context(|| format!("Failed to remove {}", root.display()))
            .map_err(|e| ProvisionError::setup("runtime removal", e))?;

        info!("Removed existing runtime at {}", root.display());
        Ok(())
    }

    // ========================================================================
    // Runtime download + extraction
    // ========================================================================

    async fn install_runtime(&self, progress: &ProgressReporter<'_>) -> Result<(), ProvisionError> {
        // Resolved before touching the filesystem or the network.
        let download = self.config.downloads.resolve(&self.config.platform)?;
        let root = self.layout.root().to_path_buf();

        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create {}", root.display()))
            .map_err(|e| ProvisionError::setup("runtime directory creation", e))?;

        progress.report(P_START);

        let archive = root.join(format!("runtime-download.{}", download.format.extension()));
        info!("Downloading Python runtime from {}", download.url);

        let on_chunk = |p: DownloadProgress| {
            if let Some(total) = p.total_bytes {
                progress.report(band(P_START, P_DOWNLOADED, p.bytes_downloaded, total));
            }
        };

        let fetched = self
            .fetcher
            .download(&download.url, &archive, download.sha256.as_deref(), &on_chunk)
            .await;
        if let Err(source) = fetched {
            discard(&archive).await;
            error!("Runtime download failed: {:#}", source);
            return Err(ProvisionError::DownloadFailed {
                url: download.url.clone(),
                source,
            });
        }

        info!("Extracting Python runtime");
        progress.report(P_DOWNLOADED);

        let extracted = self.extract(&archive, download.format).await;
        discard(&archive).await;
        extracted.map_err(|source| ProvisionError::ExtractFailed {
            archive: archive.clone(),
            source,
        })?;

        progress.report(P_EXTRACTED);
        Ok(())
    }

    async fn extract(
        &self,
        archive: &Path,
        format: ArchiveFormat,
    ) -> anyhow::Result<()> {
        let root = self.layout.root().to_path_buf();
        let executable = self.layout.executable.clone();
        let exec_relpath = executable
            .strip_prefix(&root)
            .context("Runtime executable is outside the runtime root")?
            .to_path_buf();
        let archive = archive.to_path_buf();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            extract_archive(&archive, &root, format)?;
            hoist_nested_root(&root, &exec_relpath)?;
            if !executable.is_file() {
                anyhow::bail!(
                    "Archive did not contain the interpreter at {}",
                    exec_relpath.display()
                );
            }
            Ok(())
        })
        .await
        .context("Extraction task panicked")?
    }

    // ========================================================================
    // Library reconciliation
    // ========================================================================

    async fn reconcile_libraries(
        &self,
        progress: &ProgressReporter<'_>,
    ) -> Result<ProvisionReport, ProvisionError> {
        info!("Setting up Python libraries...");
        progress.report(P_PATCH_START);

        let root = self.layout.root().to_path_buf();
        let site_patch = tokio::task::spawn_blocking(move || patch_runtime(&root))
            .await
            .context("Site patch task panicked")
            .and_then(|r| r)
            .map_err(|e| ProvisionError::setup("site import patch", e))?;

        progress.report(P_PATCHED);

        let script = self.layout.root().join(BOOTSTRAP_SCRIPT);
        info!("Downloading pip installer...");
        if let Err(e) = self
            .fetcher
            .download(&self.config.bootstrap_url, &script, None, &|_| {})
            .await
        {
            discard(&script).await;
            return Err(ProvisionError::setup("pip installer download", e));
        }

        progress.report(P_BOOTSTRAP_FETCHED);

        info!("Installing pip...");
        let bootstrap = self
            .run_step(
                "pip",
                &self.layout.executable,
                vec![script.into_os_string(), NO_WARN_SCRIPT_LOCATION.into()],
            )
            .await;
        if !bootstrap.ok {
            // An earlier pip installation may still work.
            warn!("pip installation failed ({}), continuing", bootstrap.detail);
        }

        progress.report(P_LIBRARIES_START);

        let total = self.config.libraries.len() as u64;
        let mut libraries = Vec::with_capacity(self.config.libraries.len());
        for (index, library) in self.config.libraries.iter().enumerate() {
            info!("Installing {}...", library);

            let (program, args) = self.pip_command(library);
            let outcome = self.run_step(library, &program, args).await;
            if outcome.ok {
                info!("{} installed successfully", library);
            } else {
                error!("{} installation failed: {}", library, outcome.detail);
            }
            libraries.push(outcome);

            progress.report(band(
                P_LIBRARIES_START,
                P_LIBRARIES_END,
                index as u64 + 1,
                total,
            ));
        }

        Ok(ProvisionReport {
            fast_path: false,
            site_patch,
            bootstrap,
            libraries,
        })
    }

    /// Prefers the pip console script, falls back to `python -m pip`.
    fn pip_command(&self, library: &str) -> (PathBuf, Vec<OsString>) {
        let pip = self.layout.pip_executable();
        if pip.is_file() {
            (
                pip,
                vec!["install".into(), library.into(), NO_WARN_SCRIPT_LOCATION.into()],
            )
        } else {
            debug!("{} not found, using python -m pip", pip.display());
            (
                self.layout.executable.clone(),
                vec![
                    "-m".into(),
                    "pip".into(),
                    "install".into(),
                    library.into(),
                    NO_WARN_SCRIPT_LOCATION.into(),
                ],
            )
        }
    }

    async fn run_step(&self, name: &str, program: &Path, args: Vec<OsString>) -> StepOutcome {
        let label = format!("{} install", name);
        match self.runner.run(&label, program, &args).await {
            Ok(output) => StepOutcome::from_output(name, &output),
            Err(e) => StepOutcome::failed(
                name,
                format!("failed to start {}: {}", program.display(), e),
            ),
        }
    }
}

/// Best-effort removal of a temporary file.
async fn discard(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to clean up {}: {}", path.display(), e);
    }
}
