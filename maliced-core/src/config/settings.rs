//! User settings for Maliced.
//!
//! Settings are persisted as pretty-printed camelCase JSON in
//! `user-settings.json`. Keys this version does not know about are kept and
//! written back untouched.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

// =============================================================================
// Metadata Mode
// =============================================================================

/// What to do with the image's existing metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    /// Leave metadata as it is
    #[default]
    NotProcessing,
    /// Strip all metadata
    Remove,
    /// Replace metadata with generated values
    Fake,
}

impl MetadataMode {
    pub fn all() -> &'static [MetadataMode] {
        &[Self::NotProcessing, Self::Remove, Self::Fake]
    }

    /// Derives the mode from the two booleans older versions stored.
    fn from_legacy(remove: bool, add_fake: bool) -> Self {
        if remove {
            Self::Remove
        } else if add_fake {
            Self::Fake
        } else {
            Self::NotProcessing
        }
    }
}

impl std::fmt::Display for MetadataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotProcessing => write!(f, "Keep"),
            Self::Remove => write!(f, "Remove"),
            Self::Fake => write!(f, "Fake"),
        }
    }
}

// =============================================================================
// Defaults
// =============================================================================

pub const MAX_NOISE_LEVEL: u8 = 7;
pub const DEFAULT_WATERMARK: &str = "no_ai";
pub const OUTPUT_FORMATS: &[&str] = &["png", "jpg", "webp"];
pub const NOISE_TYPES: &[&str] = &["gaussian", "dct", "shot", "speckle", "himalayan_shot"];
pub const RESIZE_OPTIONS: &[&str] = &["original", "small", "medium", "default"];
pub const FAKE_METADATA_TYPES: &[&str] = &["random", "paint", "old_camera", "screenshot"];
pub const LOGO_POSITIONS: &[&str] = &[
    "random",
    "top-left",
    "top-right",
    "bottom-left",
    "bottom-right",
];

fn default_noise_types() -> Vec<String> {
    vec!["gaussian".to_string(), "dct".to_string()]
}

// =============================================================================
// Application Settings
// =============================================================================

/// Application settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Set once a provisioning run has succeeded.
    pub has_completed_setup: bool,

    /// Output directory; None means the default under the data directory.
    pub output_dir: Option<String>,

    /// Noise strength, 0 to [`MAX_NOISE_LEVEL`].
    #[serde(deserialize_with = "lenient_u8")]
    pub noise_level: u8,

    pub noise_types: Vec<String>,

    pub metadata_mode: MetadataMode,

    pub fake_metadata_type: String,

    #[serde(rename = "addNoAIFlag")]
    pub add_no_ai_flag: bool,

    pub watermark_enabled: bool,

    /// Watermark name or absolute path.
    pub watermark_path: String,

    pub invert_watermark: bool,

    pub enable_outline: bool,

    /// Watermark size in percent of the image.
    #[serde(deserialize_with = "lenient_u8")]
    pub watermark_size: u8,

    /// Watermark opacity, 0 to 100.
    #[serde(deserialize_with = "lenient_u8")]
    pub watermark_opacity: u8,

    pub logo_position: String,

    pub resize: String,

    pub output_format: String,

    /// Keys written by other versions.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            has_completed_setup: false,
            output_dir: None,
            noise_level: 3,
            noise_types: default_noise_types(),
            metadata_mode: MetadataMode::default(),
            fake_metadata_type: "random".to_string(),
            add_no_ai_flag: false,
            watermark_enabled: false,
            watermark_path: DEFAULT_WATERMARK.to_string(),
            invert_watermark: false,
            enable_outline: true,
            watermark_size: 75,
            watermark_opacity: 75,
            logo_position: "bottom-right".to_string(),
            resize: "original".to_string(),
            output_format: "png".to_string(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, using defaults for missing values.
    ///
    /// A missing file yields defaults silently; an unreadable or corrupted
    /// one yields defaults with a warning.
    pub fn load_from(path: &Path) -> Self {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to read settings, using defaults");
                return Self::default();
            }
        };

        match Self::from_json(&json) {
            Ok(mut settings) => {
                settings.validate();
                settings
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse settings, using defaults");
                Self::default()
            }
        }
    }

    /// Parses settings JSON, migrating legacy metadata keys.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(json).context("Settings file is not JSON")?;
        if let Value::Object(map) = &mut value {
            migrate_legacy_metadata(map);
        }
        serde_json::from_value(value).context("Settings file has an invalid shape")
    }

    /// Save settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        Ok(())
    }

    /// Validate and clamp settings to valid ranges.
    pub fn validate(&mut self) {
        self.noise_level = self.noise_level.min(MAX_NOISE_LEVEL);
        self.watermark_opacity = self.watermark_opacity.min(100);
        self.watermark_size = self.watermark_size.clamp(1, 100);

        self.output_format = self.output_format.to_lowercase();
        if self.output_format == "jpeg" {
            self.output_format = "jpg".to_string();
        }
        if !OUTPUT_FORMATS.contains(&self.output_format.as_str()) {
            self.output_format = "png".to_string();
        }

        if self.watermark_path.is_empty() {
            self.watermark_path = DEFAULT_WATERMARK.to_string();
        }
    }

    /// Records a successful provisioning run.
    pub fn mark_setup_complete(&mut self) {
        self.has_completed_setup = true;
    }

    /// Restores defaults, keeping the setup flag and unknown keys.
    pub fn reset(&mut self) {
        let has_completed_setup = self.has_completed_setup;
        let extra = std::mem::take(&mut self.extra);
        *self = Self {
            has_completed_setup,
            extra,
            ..Self::default()
        };
    }
}

/// Replaces `removeMetadata`/`addFakeMetadata` with `metadataMode`.
fn migrate_legacy_metadata(map: &mut Map<String, Value>) {
    let remove = map.remove("removeMetadata");
    let add_fake = map.remove("addFakeMetadata");
    if remove.is_none() && add_fake.is_none() {
        return;
    }

    let truthy = |v: Option<Value>| v.and_then(|v| v.as_bool()).unwrap_or(false);
    let mode = MetadataMode::from_legacy(truthy(remove), truthy(add_fake));
    tracing::info!(?mode, "Migrated legacy metadata settings");

    if let Ok(value) = serde_json::to_value(mode) {
        map.insert("metadataMode".to_string(), value);
    }
}

/// Accepts numbers and numeric strings; older versions stored slider values
/// as strings.
fn lenient_u8<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .map(|n| n.round().clamp(0.0, f64::from(u8::MAX)) as u8)
        .ok_or_else(|| D::Error::custom(format!("expected a number, got {}", value)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // -------------------------------------------------------------------------
    // Metadata Mode Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_metadata_mode_default() {
        assert_eq!(MetadataMode::default(), MetadataMode::NotProcessing);
        assert_eq!(MetadataMode::all().len(), 3);
    }

    #[test]
    fn test_metadata_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&MetadataMode::NotProcessing).unwrap(),
            "\"not_processing\""
        );
        let parsed: MetadataMode = serde_json::from_str("\"fake\"").unwrap();
        assert_eq!(parsed, MetadataMode::Fake);
    }

    // -------------------------------------------------------------------------
    // Settings Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert!(!settings.has_completed_setup);
        assert_eq!(settings.noise_level, 3);
        assert_eq!(settings.noise_types, vec!["gaussian", "dct"]);
        assert_eq!(settings.metadata_mode, MetadataMode::NotProcessing);
        assert_eq!(settings.watermark_path, "no_ai");
        assert_eq!(settings.watermark_opacity, 75);
        assert_eq!(settings.logo_position, "bottom-right");
        assert_eq!(settings.output_format, "png");
        assert!(settings.extra.is_empty());
    }

    #[test]
    fn test_settings_json_keys() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["hasCompletedSetup"], false);
        assert_eq!(json["addNoAIFlag"], false);
        assert_eq!(json["metadataMode"], "not_processing");
        assert_eq!(json["watermarkOpacity"], 75);
    }

    #[test]
    fn test_settings_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("user-settings.json");

        let mut original = Settings::default();
        original.noise_level = 6;
        original.metadata_mode = MetadataMode::Remove;
        original.watermark_enabled = true;
        original.output_dir = Some("exports".to_string());
        original.mark_setup_complete();

        original.save_to(&path).unwrap();
        let loaded = Settings::load_from(&path);

        assert_eq!(loaded, original);
        assert!(loaded.has_completed_setup);
    }

    #[test]
    fn test_settings_load_returns_defaults_when_missing() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(&temp.path().join("user-settings.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_load_returns_defaults_on_invalid_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("user-settings.json");
        std::fs::write(&path, "not valid json {{").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings = Settings::from_json(r#"{ "hasCompletedSetup": true }"#).unwrap();
        assert!(settings.has_completed_setup);
        assert_eq!(settings.noise_level, 3);
        assert_eq!(settings.output_format, "png");
    }

    #[test]
    fn test_legacy_metadata_migration() {
        let remove = Settings::from_json(r#"{ "removeMetadata": true, "addFakeMetadata": true }"#)
            .unwrap();
        assert_eq!(remove.metadata_mode, MetadataMode::Remove);

        let fake = Settings::from_json(r#"{ "removeMetadata": false, "addFakeMetadata": true }"#)
            .unwrap();
        assert_eq!(fake.metadata_mode, MetadataMode::Fake);

        let neither = Settings::from_json(r#"{ "removeMetadata": false, "metadataMode": "fake" }"#)
            .unwrap();
        assert_eq!(neither.metadata_mode, MetadataMode::NotProcessing);

        assert!(!remove.extra.contains_key("removeMetadata"));
        assert!(!remove.extra.contains_key("addFakeMetadata"));
    }

    #[test]
    fn test_unknown_keys_survive_save() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("user-settings.json");
        std::fs::write(
            &path,
            r#"{ "logoFile": "logo.png", "outlineColor": { "r": 255, "g": 0, "b": 0 } }"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.extra["logoFile"], "logo.png");

        settings.save_to(&path).unwrap();
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["logoFile"], "logo.png");
        assert_eq!(raw["outlineColor"]["r"], 255);
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        let settings =
            Settings::from_json(r#"{ "noiseLevel": "5", "watermarkOpacity": 60.4 }"#).unwrap();
        assert_eq!(settings.noise_level, 5);
        assert_eq!(settings.watermark_opacity, 60);

        assert!(Settings::from_json(r#"{ "noiseLevel": [1] }"#).is_err());
    }

    #[test]
    fn test_settings_validate_clamps() {
        let mut settings = Settings::default();
        settings.noise_level = 12;
        settings.watermark_opacity = 200;
        settings.watermark_size = 0;
        settings.output_format = "JPEG".to_string();
        settings.watermark_path.clear();

        settings.validate();

        assert_eq!(settings.noise_level, MAX_NOISE_LEVEL);
        assert_eq!(settings.watermark_opacity, 100);
        assert_eq!(settings.watermark_size, 1);
        assert_eq!(settings.output_format, "jpg");
        assert_eq!(settings.watermark_path, DEFAULT_WATERMARK);

        settings.output_format = "bmp".to_string();
        settings.validate();
        assert_eq!(settings.output_format, "png");
    }

    #[test]
    fn test_reset_keeps_setup_flag() {
        let mut settings = Settings::default();
        settings.mark_setup_complete();
        settings.noise_level = 7;
        settings
            .extra
            .insert("logoFile".to_string(), Value::from("logo.png"));

        settings.reset();

        assert!(settings.has_completed_setup);
        assert_eq!(settings.noise_level, 3);
        assert!(settings.extra.contains_key("logoFile"));
    }
}
