//! Maliced Core Library
//!
//! This crate provides the core functionality for Maliced, a desktop tool
//! that perturbs images against AI scraping by running a bundled Python
//! backend. It includes:
//!
//! - First-run provisioning of a self-contained Python runtime
//! - Progress reporting for long-running setup
//! - Configuration management (paths, user settings)
//! - The invocation bridge to the backend scripts
//! - Host-side setup orchestration with a re-entrancy guard

pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod progress;
pub mod python;

// Re-exports for convenience
pub use config::{AppPaths, MetadataMode, Settings};
pub use error::{BridgeError, ProvisionError};
pub use progress::{ProgressReporter, ProgressSink};

// Re-export provisioning
pub use python::{
    ProvisionReport, Provisioner, ProvisionerConfig, ProvisioningRequest, RuntimeLayout,
    StepOutcome,
};

// Re-export the bridge
pub use bridge::{
    validate_image_path, Bridge, ProcessOutcome, ProcessingOptions, WatermarkCatalog,
    WatermarkEntry,
};

// Re-export host orchestration
pub use host::{needs_startup_setup, SetupOutcome, SetupService, PROGRESS_CHANNEL};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
