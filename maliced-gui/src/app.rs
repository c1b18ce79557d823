//! Main application state and update loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eframe::egui;
use serde_json::{Map, Value};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use maliced_core::bridge::IMAGE_EXTENSIONS;
use maliced_core::{
    needs_startup_setup, validate_image_path, AppPaths, Bridge, ProcessOutcome,
    ProcessingOptions, SetupOutcome, SetupService, Settings, WatermarkCatalog, WatermarkEntry,
};

use crate::ui;
use crate::ui::preview::{self, Preview};

type Pending<T> = Option<oneshot::Receiver<T>>;

// =============================================================================
// State Types
// =============================================================================

/// Image picked for processing.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub path: PathBuf,
    /// Names the output file; differs from `path` for dropped data.
    pub original_name: String,
}

/// Python setup dialog state.
#[derive(Debug, Clone)]
pub enum SetupState {
    /// Nothing ran yet in this session.
    Idle,
    Running { force: bool, progress: u8 },
    Finished(SetupOutcome),
}

// =============================================================================
// Application State
// =============================================================================

/// Main application state.
pub struct MalicedApp {
    /// Tokio runtime for async operations.
    pub runtime: Runtime,

    pub paths: AppPaths,

    /// User settings.
    pub settings: Settings,

    // -------------------------------------------------------------------------
    // Python Setup
    // -------------------------------------------------------------------------
    setup: Arc<SetupService>,

    pub setup_state: SetupState,

    pub show_setup_dialog: bool,

    /// Whether the current run was started automatically at launch.
    pub startup_setup: bool,

    setup_progress_rx: Option<mpsc::UnboundedReceiver<u8>>,

    setup_result_rx: Pending<SetupOutcome>,

    // -------------------------------------------------------------------------
    // Image State
    // -------------------------------------------------------------------------
    pub watermarks: Vec<WatermarkEntry>,

    pub selected_image: Option<SelectedImage>,

    pub input_preview: Option<Preview>,

    pub output_preview: Option<Preview>,

    pub last_result: Option<Result<ProcessOutcome, String>>,

    pub metadata: Option<Result<Map<String, Value>, String>>,

    process_result_rx: Pending<Result<ProcessOutcome, String>>,

    metadata_result_rx: Pending<Result<Map<String, Value>, String>>,

    image_pick_rx: Pending<Option<PathBuf>>,

    output_dir_pick_rx: Pending<Option<PathBuf>>,

    // -------------------------------------------------------------------------
    // UI State
    // -------------------------------------------------------------------------
    /// Status message.
    pub status_message: Option<(String, chrono::DateTime<chrono::Utc>)>,
}

impl MalicedApp {
    /// Create a new application instance.
    pub fn new(cc: &eframe::CreationContext<'_>, runtime: Runtime, paths: AppPaths) -> Self {
        info!("Initializing MalicedApp");

        let settings = Settings::load_from(&paths.settings_path());
        debug!(?settings, "Loaded settings");

        let setup = Arc::new(SetupService::from_paths(&paths));

        let watermarks = WatermarkCatalog::from_paths(&paths)
            .list()
            .unwrap_or_else(|e| {
                warn!("Failed to list watermarks: {}", e);
                Vec::new()
            });

        let mut style = (*cc.egui_ctx.style()).clone();
        style.spacing.item_spacing = egui::vec2(8.0, 6.0);
        cc.egui_ctx.set_style(style);

        let mut app = Self {
            runtime,
            paths,
            settings,
            setup,
            setup_state: SetupState::Idle,
            show_setup_dialog: false,
            startup_setup: false,
            setup_progress_rx: None,
            setup_result_rx: None,
            watermarks,
            selected_image: None,
            input_preview: None,
            output_preview: None,
            last_result: None,
            metadata: None,
            process_result_rx: None,
            metadata_result_rx: None,
            image_pick_rx: None,
            output_dir_pick_rx: None,
            status_message: None,
        };

        if needs_startup_setup(&app.settings, app.setup.layout()) {
            info!("Python runtime not set up, starting setup");
            app.startup_setup = true;
            app.start_setup(false);
        }

        app
    }

    // =========================================================================
    // Python Setup
    // =========================================================================

    pub fn setup_in_progress(&self) -> bool {
        self.setup_result_rx.is_some() || self.setup.is_running()
    }

    pub fn python_ready(&self) -> bool {
        self.setup.layout().is_installed()
    }

    /// Start a setup run in the background.
    pub fn start_setup(&mut self, force: bool) {
        if self.setup_in_progress() {
            self.set_status("Python setup is already running");
            return;
        }

        info!("Starting Python setup (force: {})", force);
        self.show_setup_dialog = true;
        self.setup_state = SetupState::Running { force, progress: 0 };

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel();
        self.setup_progress_rx = Some(progress_rx);
        self.setup_result_rx = Some(rx);

        let setup = Arc::clone(&self.setup);
        self.runtime.spawn(async move {
            let outcome = setup.run(force, Some(progress_tx)).await;
            let _ = tx.send(outcome);
        });
    }

    /// Drain progress updates.
    fn check_setup_progress(&mut self) {
        let Some(rx) = self.setup_progress_rx.as_mut() else {
            return;
        };
        while let Ok(percent) = rx.try_recv() {
            if let SetupState::Running { progress, .. } = &mut self.setup_state {
                *progress = percent;
            }
        }
    }

    /// Check for setup completion.
    fn check_setup_completion(&mut self) {
        if let Some(mut rx) = self.setup_result_rx.take() {
            match rx.try_recv() {
                Ok(outcome) => {
                    self.check_setup_progress();
                    self.setup_progress_rx = None;

                    if outcome.success {
                        info!("Python setup finished: {}", outcome.message);
                        // Written to disk by the service; keep ours in sync.
                        self.settings.mark_setup_complete();
                        self.set_status("Python setup complete");
                    } else {
                        error!("Python setup failed: {}", outcome.message);
                        self.set_status("Python setup failed");
                    }
                    self.show_setup_dialog = true;
                    self.startup_setup = false;
                    self.setup_state = SetupState::Finished(outcome);
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    // Still waiting
                    self.setup_result_rx = Some(rx);
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    warn!("Setup channel closed unexpectedly");
                    self.setup_progress_rx = None;
                    self.setup_state = SetupState::Idle;
                }
            }
        }
    }

    /// Relaunch the executable and close this window.
    pub fn restart(&mut self, ctx: &egui::Context) {
        let spawned = std::env::current_exe().and_then(|exe| {
            info!("Restarting {}", exe.display());
            std::process::Command::new(exe)
                .args(std::env::args_os().skip(1))
                .spawn()
        });

        match spawned {
            Ok(_) => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
            Err(e) => {
                error!("Failed to restart: {}", e);
                self.set_status(&format!("Failed to restart: {}", e));
            }
        }
    }

    // =========================================================================
    // Image Selection
    // =========================================================================

    /// Open an image picker asynchronously.
    pub fn open_image_dialog(&mut self) {
        if self.image_pick_rx.is_some() {
            return;
        }

        let (tx, rx) = oneshot::channel();
        self.image_pick_rx = Some(rx);

        self.runtime.spawn(async move {
            let file = rfd::AsyncFileDialog::new()
                .add_filter("Images", IMAGE_EXTENSIONS)
                .pick_file()
                .await
                .map(|f| f.path().to_path_buf());
            let _ = tx.send(file);
        });
    }

    fn check_image_selection(&mut self, ctx: &egui::Context) {
        if let Some(mut rx) = self.image_pick_rx.take() {
            match rx.try_recv() {
                Ok(Some(path)) => self.select_image(ctx, path, None),
                Ok(None) => {
                    debug!("Image selection cancelled");
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.image_pick_rx = Some(rx);
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    warn!("Image selection channel closed unexpectedly");
                }
            }
        }
    }

    /// Select `path` for processing if it is a supported image.
    pub fn select_image(
        &mut self,
        ctx: &egui::Context,
        path: PathBuf,
        original_name: Option<String>,
    ) {
        match validate_image_path(&path) {
            Ok(path) => {
                let original_name = original_name.unwrap_or_else(|| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                });
                info!("Selected image: {}", path.display());
                self.set_status(&format!("Selected {}", original_name));
                self.input_preview = self.load_preview(ctx, &path, "input");
                self.output_preview = None;
                self.selected_image = Some(SelectedImage {
                    path,
                    original_name,
                });
                self.last_result = None;
                self.metadata = None;
            }
            Err(e) => {
                warn!("Rejected image {}: {}", path.display(), e);
                self.set_status(&e.to_string());
            }
        }
    }

    /// Handle files dropped onto the window.
    pub fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped_files: Vec<_> = ctx.input(|i| i.raw.dropped_files.clone());

        // Only one image is processed at a time.
        let Some(file) = dropped_files.into_iter().next() else {
            return;
        };

        if let Some(path) = file.path {
            self.select_image(ctx, path, None);
        } else if let Some(bytes) = file.bytes {
            // Dropped from another app (bytes only, no path)
            match self.stage_dropped_bytes(&file.name, &bytes) {
                Ok(staged) => self.select_image(ctx, staged, Some(file.name.clone())),
                Err(e) => {
                    warn!("Failed to store dropped data: {}", e);
                    self.set_status(&format!("Failed to load image: {}", e));
                }
            }
        }
    }

    fn stage_dropped_bytes(&self, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let ext = std::path::Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = self.paths.input_dir();
        std::fs::create_dir_all(&dir)?;
        let staged = dir.join(format!("dropped_input.{}", ext));
        std::fs::write(&staged, bytes)?;
        Ok(staged)
    }

    /// Decode a thumbnail; the app keeps working without one.
    fn load_preview(&self, ctx: &egui::Context, path: &Path, name: &str) -> Option<Preview> {
        match preview::load_preview(path, ctx, name) {
            Ok(preview) => Some(preview),
            Err(e) => {
                warn!("No preview for {}: {:#}", path.display(), e);
                None
            }
        }
    }

    // =========================================================================
    // Processing
    // =========================================================================

    fn bridge(&self) -> Bridge {
        let output_dir = self.paths.output_dir(self.settings.output_dir.as_deref());
        Bridge::with_defaults(self.paths.clone()).with_output_dir(output_dir)
    }

    pub fn is_processing(&self) -> bool {
        self.process_result_rx.is_some()
    }

    pub fn is_loading_metadata(&self) -> bool {
        self.metadata_result_rx.is_some()
    }

    /// Run the backend on the selected image.
    pub fn process_image(&mut self) {
        if self.is_processing() {
            return;
        }
        let Some(image) = self.selected_image.clone() else {
            self.set_status("Select an image first");
            return;
        };

        let watermark = if self.settings.watermark_enabled {
            match WatermarkCatalog::from_paths(&self.paths).resolve(&self.settings.watermark_path)
            {
                Ok(path) => Some(path),
                Err(e) => {
                    self.set_status(&e.to_string());
                    return;
                }
            }
        } else {
            None
        };
        let options = ProcessingOptions::from_settings(&self.settings, watermark.as_deref());

        info!("Processing {}", image.path.display());
        self.set_status("Processing...");
        self.last_result = None;
        self.output_preview = None;

        let (tx, rx) = oneshot::channel();
        self.process_result_rx = Some(rx);

        let bridge = self.bridge();
        self.runtime.spawn(async move {
            let result = bridge
                .process_image(&image.path, Some(&image.original_name), &options)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(result);
        });
    }

    fn check_process_completion(&mut self, ctx: &egui::Context) {
        if let Some(mut rx) = self.process_result_rx.take() {
            match rx.try_recv() {
                Ok(result) => {
                    match &result {
                        Ok(outcome) => {
                            info!("Wrote {}", outcome.output_path.display());
                            self.output_preview =
                                self.load_preview(ctx, &outcome.output_path, "output");
                            self.set_status("Image processed");
                        }
                        Err(e) => {
                            error!("Processing failed: {}", e);
                            self.set_status("Processing failed");
                        }
                    }
                    self.last_result = Some(result);
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.process_result_rx = Some(rx);
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    warn!("Processing channel closed unexpectedly");
                }
            }
        }
    }

    /// Read metadata of the selected image.
    pub fn load_metadata(&mut self) {
        if self.is_loading_metadata() {
            return;
        }
        let Some(image) = self.selected_image.clone() else {
            return;
        };

        let (tx, rx) = oneshot::channel();
        self.metadata_result_rx = Some(rx);

        let bridge = self.bridge();
        self.runtime.spawn(async move {
            let result = bridge
                .extract_metadata(&image.path)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(result);
        });
    }

    fn check_metadata_completion(&mut self) {
        if let Some(mut rx) = self.metadata_result_rx.take() {
            match rx.try_recv() {
                Ok(result) => {
                    if let Err(e) = &result {
                        warn!("Metadata extraction failed: {}", e);
                    }
                    self.metadata = Some(result);
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.metadata_result_rx = Some(rx);
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    warn!("Metadata channel closed unexpectedly");
                }
            }
        }
    }

    // =========================================================================
    // Output Folder
    // =========================================================================

    /// Open a folder selection dialog asynchronously.
    pub fn open_output_dir_dialog(&mut self) {
        if self.output_dir_pick_rx.is_some() {
            return;
        }

        let (tx, rx) = oneshot::channel();
        self.output_dir_pick_rx = Some(rx);

        self.runtime.spawn(async move {
            let folder = rfd::AsyncFileDialog::new()
                .pick_folder()
                .await
                .map(|f| f.path().to_path_buf());
            let _ = tx.send(folder);
        });
    }

    fn check_output_dir_selection(&mut self) {
        if let Some(mut rx) = self.output_dir_pick_rx.take() {
            match rx.try_recv() {
                Ok(Some(folder)) => {
                    info!("Output folder: {}", folder.display());
                    self.settings.output_dir = Some(folder.to_string_lossy().into_owned());
                    self.save_settings();
                }
                Ok(None) => {
                    debug!("Folder selection cancelled");
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.output_dir_pick_rx = Some(rx);
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    warn!("Folder selection channel closed unexpectedly");
                }
            }
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.paths.output_dir(self.settings.output_dir.as_deref())
    }

    /// Opens the output folder in the system file manager.
    pub fn open_output_folder(&mut self) {
        let dir = self.output_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Failed to create {}: {}", dir.display(), e);
        }
        if let Err(e) = opener::open(&dir) {
            warn!("Failed to open {}: {}", dir.display(), e);
            self.set_status(&format!("Could not open output folder: {}", e));
        }
    }

    /// Selects the output file in the system file manager, falling back to its folder.
    pub fn reveal_output(&mut self, outcome: &ProcessOutcome) {
        let path = &outcome.output_path;
        debug!("Revealing {}", path.display());
        if let Err(e) = opener::reveal(path) {
            warn!("Failed to reveal {}: {}", path.display(), e);
            if let Err(e) = opener::open(outcome.output_folder()) {
                self.set_status(&format!("Could not open output folder: {}", e));
            }
        }
    }

    // =========================================================================
    // Settings / Status
    // =========================================================================

    /// Save settings to disk.
    pub fn save_settings(&mut self) {
        self.settings.validate();
        if let Err(e) = self.settings.save_to(&self.paths.settings_path()) {
            error!("Failed to save settings: {:#}", e);
            self.set_status("Failed to save settings");
        }
    }

    /// Restore default options.
    pub fn reset_settings(&mut self) {
        self.settings.reset();
        self.save_settings();
        self.set_status("Settings reset to defaults");
    }

    /// Set a status message.
    pub fn set_status(&mut self, msg: &str) {
        self.status_message = Some((msg.to_string(), chrono::Utc::now()));
    }

    /// Clear old status messages.
    pub fn clear_old_status(&mut self) {
        if let Some((_, time)) = &self.status_message {
            if chrono::Utc::now() - *time > chrono::Duration::seconds(5) {
                self.status_message = None;
            }
        }
    }
}

impl eframe::App for MalicedApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Check for async completions
        self.check_setup_progress();
        self.check_setup_completion();
        self.check_image_selection(ctx);
        self.check_output_dir_selection();
        self.check_process_completion(ctx);
        self.check_metadata_completion();

        self.handle_dropped_files(ctx);
        self.clear_old_status();

        egui::TopBottomPanel::top("menu_panel").show(ctx, |ui| {
            ui::menu::render(self, ui, ctx);
        });

        egui::TopBottomPanel::bottom("status_panel")
            .max_height(24.0)
            .show(ctx, |ui| {
                ui::status::render(self, ui);
            });

        egui::SidePanel::left("options_panel")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| {
                ui::options::render(self, ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui::main_panel::render(self, ui);
        });

        if self.show_setup_dialog {
            ui::setup::render(self, ctx);
        }

        // Keep polling while background work is pending
        if self.setup_result_rx.is_some()
            || self.image_pick_rx.is_some()
            || self.output_dir_pick_rx.is_some()
            || self.process_result_rx.is_some()
            || self.metadata_result_rx.is_some()
        {
            ctx.request_repaint();
        }
    }
}
