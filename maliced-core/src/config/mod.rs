//! Configuration module for Maliced.
//!
//! Resolves application directories and manages the user settings file.

mod paths;
mod settings;

pub use paths::{AppPaths, APP_ROOT_ENV, DATA_DIR_ENV};
pub use settings::{
    MetadataMode, Settings, DEFAULT_WATERMARK, FAKE_METADATA_TYPES, LOGO_POSITIONS,
    MAX_NOISE_LEVEL, NOISE_TYPES, OUTPUT_FORMATS, RESIZE_OPTIONS,
};
