//! The JSON options object handed to `process.py`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{MetadataMode, Settings, MAX_NOISE_LEVEL};
use crate::error::BridgeError;

/// Options for one processing call.
///
/// Serialized with snake_case keys, one JSON object passed as the last
/// command-line argument of the backend script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    pub apply_watermark: bool,
    /// Resolved watermark file; None when no watermark is applied.
    pub watermark_path: Option<String>,
    /// 0.0 to 1.0
    pub watermark_opacity: f64,
    pub invert_watermark: bool,
    pub enable_outline: bool,
    /// Percent of the image.
    pub watermark_size: u8,
    pub resize: String,
    /// 0.0 to 1.0
    pub noise_level: f64,
    pub noise_types: Vec<String>,
    pub logo_position: String,
    pub remove_metadata: bool,
    pub add_fake_metadata: bool,
    pub fake_metadata_type: String,
    pub add_no_ai_flag: bool,
    pub output_format: String,
}

impl ProcessingOptions {
    /// Builds options from user settings.
    ///
    /// `watermark` is the already resolved watermark file; it is only used
    /// when the watermark is enabled.
    pub fn from_settings(settings: &Settings, watermark: Option<&Path>) -> Self {
        let apply_watermark = settings.watermark_enabled && watermark.is_some();
        let watermark_path = watermark
            .filter(|_| apply_watermark)
            .map(|p| p.to_string_lossy().into_owned());

        Self {
            apply_watermark,
            watermark_path,
            watermark_opacity: f64::from(settings.watermark_opacity.min(100)) / 100.0,
            invert_watermark: settings.invert_watermark,
            enable_outline: settings.enable_outline,
            watermark_size: settings.watermark_size,
            resize: settings.resize.clone(),
            noise_level: f64::from(settings.noise_level.min(MAX_NOISE_LEVEL))
                / f64::from(MAX_NOISE_LEVEL),
            noise_types: settings.noise_types.clone(),
            logo_position: settings.logo_position.clone(),
            remove_metadata: settings.metadata_mode == MetadataMode::Remove,
            add_fake_metadata: settings.metadata_mode == MetadataMode::Fake,
            fake_metadata_type: settings.fake_metadata_type.clone(),
            add_no_ai_flag: settings.add_no_ai_flag,
            output_format: settings.output_format.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(BridgeError::Encode)
    }
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), None)
    }
}

/// Name of the processed file: `maliced-<stem>.<format>`.
pub fn output_file_name(original: &str, format: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    let format = if format.is_empty() { "png" } else { format };
    format!("maliced-{}.{}", stem, format)
}

/// Output path for `original` inside `output_dir`.
pub fn output_path(output_dir: &Path, original: &str, format: &str) -> PathBuf {
    output_dir.join(output_file_name(original, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_has_contract_keys() {
        let json: serde_json::Value =
            serde_json::from_str(&ProcessingOptions::default().to_json().unwrap()).unwrap();
        let object = json.as_object().unwrap();

        for key in [
            "apply_watermark",
            "watermark_path",
            "watermark_opacity",
            "invert_watermark",
            "resize",
            "noise_level",
            "noise_types",
            "logo_position",
            "remove_metadata",
            "add_fake_metadata",
            "fake_metadata_type",
            "add_no_ai_flag",
            "output_format",
        ] {
            assert!(object.contains_key(key), "missing key {}", key);
        }
        assert!(json["watermark_path"].is_null());
    }

    #[test]
    fn test_from_settings_scales_ranges() {
        let mut settings = Settings::default();
        settings.noise_level = 7;
        settings.watermark_opacity = 50;
        settings.metadata_mode = MetadataMode::Fake;

        let options = ProcessingOptions::from_settings(&settings, None);

        assert!((options.noise_level - 1.0).abs() < f64::EPSILON);
        assert!((options.watermark_opacity - 0.5).abs() < f64::EPSILON);
        assert!(!options.remove_metadata);
        assert!(options.add_fake_metadata);
    }

    #[test]
    fn test_watermark_requires_enabled_and_path() {
        let mut settings = Settings::default();
        let mark = Path::new("/opt/maliced/watermark/no_ai.png");

        let disabled = ProcessingOptions::from_settings(&settings, Some(mark));
        assert!(!disabled.apply_watermark);
        assert_eq!(disabled.watermark_path, None);

        settings.watermark_enabled = true;
        let enabled = ProcessingOptions::from_settings(&settings, Some(mark));
        assert!(enabled.apply_watermark);
        assert_eq!(
            enabled.watermark_path.as_deref(),
            Some("/opt/maliced/watermark/no_ai.png")
        );

        let unresolved = ProcessingOptions::from_settings(&settings, None);
        assert!(!unresolved.apply_watermark);
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("cat.jpeg", "png"), "maliced-cat.png");
        assert_eq!(output_file_name("my.photo.webp", "jpg"), "maliced-my.photo.jpg");
        assert_eq!(output_file_name("noext", ""), "maliced-noext.png");
        assert_eq!(output_file_name("", "webp"), "maliced-image.webp");
        assert_eq!(
            output_path(Path::new("/out"), "a.png", "png"),
            Path::new("/out/maliced-a.png")
        );
    }
}
