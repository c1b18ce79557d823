//! Host-side orchestration of provisioning runs.
//!
//! [`SetupService`] is what the UI talks to. It keeps at most one
//! provisioning run in flight, forwards progress over a channel and records
//! the setup flag in the settings file after a successful run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{AppPaths, Settings};
use crate::python::{ProvisionReport, Provisioner, ProvisioningRequest, RuntimeLayout};

/// Name of the progress push channel, used to tag progress log lines.
pub const PROGRESS_CHANNEL: &str = "python-setup-progress";

/// Appended to retryable failure messages.
pub const RETRY_HINT: &str =
    "Check your internet connection and retry from Python Setup > Check Python Setup.";

/// What the UI gets back from a setup run.
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub success: bool,
    pub message: String,
    /// Per-step details; None when provisioning did not complete.
    pub report: Option<ProvisionReport>,
}

impl SetupOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            report: None,
        }
    }
}

/// Whether setup must run at application start.
///
/// True when setup never completed, or when the interpreter has gone missing
/// since.
pub fn needs_startup_setup(settings: &Settings, layout: &RuntimeLayout) -> bool {
    !settings.has_completed_setup || !layout.is_installed()
}

/// Serializes provisioning runs and persists their success.
pub struct SetupService {
    provisioner: Arc<Provisioner>,
    settings_path: PathBuf,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a run ends, including when its future is
/// dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SetupService {
    pub fn new(provisioner: Arc<Provisioner>, settings_path: impl Into<PathBuf>) -> Self {
        Self {
            provisioner,
            settings_path: settings_path.into(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Service provisioning into `{app}/python` over the network.
    pub fn from_paths(paths: &AppPaths) -> Self {
        Self::new(
            Arc::new(Provisioner::with_defaults(paths.runtime_root())),
            paths.settings_path(),
        )
    }

    pub fn layout(&self) -> &RuntimeLayout {
        self.provisioner.layout()
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs provisioning once.
    ///
    /// A call made while another run is in flight fails immediately without
    /// touching the runtime. Progress values are sent on `progress` as they
    /// are reported; a closed receiver is ignored.
    pub async fn run(&self, force: bool, progress: Option<mpsc::UnboundedSender<u8>>) -> SetupOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Python setup requested while a run is in progress");
            return SetupOutcome::failure("Python setup is already running.");
        }
        let _guard = InFlight(&self.in_flight);

        info!("Starting Python setup (force: {})", force);

        let sink = move |percent: u8| {
            debug!(channel = PROGRESS_CHANNEL, percent, "Setup progress");
            if let Some(tx) = &progress {
                let _ = tx.send(percent);
            }
        };

        let request = ProvisioningRequest { force };
        match self.provisioner.provision(request, Some(&sink)).await {
            Ok(report) => {
                self.record_success();
                SetupOutcome {
                    success: true,
                    message: success_message(&report),
                    report: Some(report),
                }
            }
            Err(e) => {
                error!("Python setup failed: {}", e);
                let message = if e.is_user_retryable() {
                    format!("{}\n\n{}", e, RETRY_HINT)
                } else {
                    e.to_string()
                };
                SetupOutcome::failure(message)
            }
        }
    }

    fn record_success(&self) {
        let mut settings = Settings::load_from(&self.settings_path);
        settings.mark_setup_complete();
        if let Err(e) = settings.save_to(&self.settings_path) {
            // Only costs a fast-path re-check at the next start.
            warn!("Failed to record setup completion: {:#}", e);
        }
    }
}

fn success_message(report: &ProvisionReport) -> String {
    let failed: Vec<&str> = report
        .failed_libraries()
        .map(|outcome| outcome.name.as_str())
        .collect();
    if failed.is_empty() {
        "Python setup complete.".to_string()
    } else {
        format!(
            "Python setup complete, but these libraries failed to install: {}",
            failed.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::{
        Arch, CommandOutput, CommandRunner, DownloadProgress, DownloadTable, Fetcher, Os,
        Platform, ProvisionerConfig, RuntimeDownload,
    };
    use async_trait::async_trait;
    use std::ffi::OsString;
    use std::path::Path;
    use tempfile::TempDir;

    struct StaticFetcher;

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn download(
            &self,
            _url: &str,
            dest: &Path,
            _expected_sha256: Option<&str>,
            progress_cb: &(dyn Fn(DownloadProgress) + Send + Sync),
        ) -> anyhow::Result<u64> {
            std::fs::write(dest, b"# script")?;
            progress_cb(DownloadProgress::new(8, Some(8)));
            Ok(8)
        }
    }

    struct ExitRunner(i32);

    #[async_trait]
    impl CommandRunner for ExitRunner {
        async fn run(
            &self,
            _label: &str,
            _program: &Path,
            _args: &[OsString],
        ) -> std::io::Result<CommandOutput> {
            Ok(CommandOutput {
                code: Some(self.0),
                ..Default::default()
            })
        }
    }

    fn service(temp: &TempDir, platform: Platform, exit_code: i32) -> SetupService {
        let config = ProvisionerConfig {
            downloads: DownloadTable::new().with(
                Platform::new(Os::Windows, Arch::X64),
                RuntimeDownload::new("https://www.python.org/ftp/python/x/embed.zip"),
            ),
            platform,
            ..ProvisionerConfig::default()
        };
        let provisioner = Provisioner::new(
            temp.path().join("python"),
            config,
            Arc::new(StaticFetcher),
            Arc::new(ExitRunner(exit_code)),
        );
        SetupService::new(Arc::new(provisioner), temp.path().join("user-settings.json"))
    }

    fn install_interpreter(service: &SetupService) {
        let exe = &service.layout().executable;
        std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
        std::fs::write(exe, b"MZ").unwrap();
    }

    #[test]
    fn test_needs_startup_setup() {
        let temp = TempDir::new().unwrap();
        let layout = RuntimeLayout::for_os(temp.path(), &Os::Windows);
        let mut settings = Settings::default();

        assert!(needs_startup_setup(&settings, &layout));

        settings.mark_setup_complete();
        assert!(needs_startup_setup(&settings, &layout));

        std::fs::write(&layout.executable, b"MZ").unwrap();
        assert!(!needs_startup_setup(&settings, &layout));
    }

    #[tokio::test]
    async fn test_successful_run_records_flag_and_streams_progress() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, Platform::new(Os::Windows, Arch::X64), 0);
        install_interpreter(&service);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = service.run(false, Some(tx)).await;

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.message, "Python setup complete.");
        assert!(outcome.report.unwrap().fast_path);
        assert!(!service.is_running());

        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push(p);
        }
        assert_eq!(seen.first(), Some(&5));
        assert_eq!(seen.last(), Some(&100));

        let settings = Settings::load_from(&temp.path().join("user-settings.json"));
        assert!(settings.has_completed_setup);
    }

    #[tokio::test]
    async fn test_library_failures_named_in_message() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, Platform::new(Os::Windows, Arch::X64), 1);
        install_interpreter(&service);

        let outcome = service.run(false, None).await;

        assert!(outcome.success);
        assert!(outcome.message.contains("pillow, numpy, scipy, piexif"));
    }

    #[tokio::test]
    async fn test_failed_run_leaves_flag_unset() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, Platform::from_names("linux", "mips"), 0);

        let outcome = service.run(false, None).await;

        assert!(!outcome.success);
        assert!(outcome.message.contains("Unsupported platform"));
        assert!(!outcome.message.contains(RETRY_HINT));
        assert!(outcome.report.is_none());
        assert!(!temp.path().join("user-settings.json").exists());
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp, Platform::new(Os::Windows, Arch::X64), 0);
        install_interpreter(&service);
        service.in_flight.store(true, Ordering::SeqCst);

        let outcome = service.run(false, None).await;

        assert!(!outcome.success);
        assert!(outcome.message.contains("already running"));
        assert!(!temp.path().join("user-settings.json").exists());
        assert!(!temp.path().join("python").join("get-pip.py").exists());
    }
}
