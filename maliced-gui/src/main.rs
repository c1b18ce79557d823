//! Maliced GUI Application
//!
//! Protects images against AI scraping with a native desktop interface.

mod app;
mod ui;

use eframe::egui;
use maliced_core::AppPaths;

fn main() -> eframe::Result<()> {
    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if let Ok(directive) = "maliced=debug".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Maliced v{}", maliced_core::VERSION);

    let paths = match AppPaths::resolve() {
        Ok(paths) => paths,
        Err(e) => {
            tracing::error!("Failed to resolve application paths: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = paths.ensure_dirs_exist() {
        tracing::warn!("Failed to create data directories: {:#}", e);
    }

    // Create tokio runtime for async operations
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    let _guard = runtime.enter();

    // Window configuration
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_min_inner_size([800.0, 600.0])
            .with_drag_and_drop(true)
            .with_title("Maliced"),
        renderer: eframe::Renderer::Glow,
        ..Default::default()
    };

    // Run the application
    eframe::run_native(
        "Maliced",
        options,
        Box::new(|cc| Ok(Box::new(app::MalicedApp::new(cc, runtime, paths)))),
    )
}
