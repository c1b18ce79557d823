//! Self-contained Python runtime provisioning.
//!
//! The application ships without Python. On first launch this module
//! downloads a portable CPython build into an app-private directory, makes
//! pip usable inside it and installs the libraries the backend scripts need.
//!
//! # Architecture
//!
//! - `platform`: OS/architecture detection and the download table
//! - `layout`: Paths of the interpreter and scripts inside the runtime root
//! - `downloader`: Async streaming download with progress and URL validation
//! - `extractor`: Archive extraction (zip, tar.gz)
//! - `site_config`: Enables `import site` in embeddable builds
//! - `runner`: Subprocess execution with logged output
//! - `provisioner`: The end-to-end provisioning procedure
//!
//! # Example
//!
//! ```ignore
//! use maliced_core::python::{Provisioner, ProvisioningRequest};
//!
//! let provisioner = Provisioner::with_defaults(app_root.join("python"));
//! let report = provisioner
//!     .provision(ProvisioningRequest::check(), Some(&|p| println!("{}%", p)))
//!     .await?;
//! ```

pub mod downloader;
pub mod extractor;
pub mod layout;
pub mod platform;
pub mod provisioner;
pub mod runner;
pub mod site_config;

// Re-export commonly used types
pub use downloader::{DownloadProgress, Fetcher, HttpFetcher};
pub use layout::RuntimeLayout;
pub use platform::{Arch, ArchiveFormat, DownloadTable, Os, Platform, RuntimeDownload};
pub use provisioner::{
    ProvisionReport, Provisioner, ProvisionerConfig, ProvisioningRequest, DEFAULT_LIBRARIES,
    GET_PIP_URL,
};
pub use runner::{CommandOutput, CommandRunner, StepOutcome, TokioCommandRunner};
pub use site_config::PatchOutcome;
