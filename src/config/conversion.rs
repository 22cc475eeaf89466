//! Conversion settings shared by the coordinator and every conversion unit

use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::error::{Result, FastConvertError};

/// Default WebP quality, matching the reasonable-size preset used for uploads
pub const DEFAULT_QUALITY: f32 = 80.0;

/// Suffix appended to the stored original to name the derivative
pub const DEFAULT_SUFFIX: &str = "webp";

/// Default upload directory, relative to the working directory
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Input formats the conversion unit is willing to decode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl InputFormat {
    /// Get MIME type for this format
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// Map a sniffed MIME type back to an input format
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

impl From<InputFormat> for image::ImageFormat {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Png => image::ImageFormat::Png,
            InputFormat::Jpeg => image::ImageFormat::Jpeg,
            InputFormat::Gif => image::ImageFormat::Gif,
            InputFormat::Webp => image::ImageFormat::WebP,
        }
    }
}

/// Everything a batch needs to know about where and how to convert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Directory receiving originals and derivatives
    pub upload_dir: PathBuf,

    /// Lossy WebP quality (1-100)
    pub quality: f32,

    /// Extension appended to the original filename for the derivative
    pub suffix: String,

    /// Formats accepted by content sniffing
    pub input_formats: Vec<InputFormat>,

    /// Cap on units running at once (None = one per file)
    pub max_concurrent: Option<usize>,

    /// Skip remaining steps of pending units once one unit fails
    pub fail_fast: bool,
}

impl ConversionConfig {
    /// Create a configuration with the default upload directory and codec settings
    pub fn new() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            quality: DEFAULT_QUALITY,
            suffix: DEFAULT_SUFFIX.to_string(),
            input_formats: vec![InputFormat::Png, InputFormat::Jpeg],
            max_concurrent: None,
            fail_fast: false,
        }
    }

    /// Set the upload directory
    pub fn upload_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Set quality
    pub fn quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// Set accepted input formats
    pub fn input_formats(mut self, formats: Vec<InputFormat>) -> Self {
        self.input_formats = formats;
        self
    }

    /// Limit how many units run the pipeline at once
    pub fn max_concurrent(mut self, limit: usize) -> Self {
        self.max_concurrent = Some(limit);
        self
    }

    /// Enable cooperative cancellation after the first failure
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    /// Whether a sniffed format is accepted for decoding
    pub fn accepts(&self, format: InputFormat) -> bool {
        self.input_formats.contains(&format)
    }

    /// Validate conversion settings
    pub fn validate(&self) -> Result<()> {
        if !(1.0..=100.0).contains(&self.quality) {
            return Err(FastConvertError::config(
                format!("Quality must be between 1 and 100, got {}", self.quality)
            ));
        }

        let suffix = self.suffix.trim_start_matches('.');
        if suffix.is_empty() || suffix.contains(['/', '\\']) {
            return Err(FastConvertError::config(
                format!("Invalid derivative suffix: {:?}", self.suffix)
            ));
        }

        if self.input_formats.is_empty() {
            return Err(FastConvertError::config(
                "At least one input format must be enabled"
            ));
        }

        if self.max_concurrent == Some(0) {
            return Err(FastConvertError::config(
                "max_concurrent must be greater than 0"
            ));
        }

        if self.upload_dir.as_os_str().is_empty() {
            return Err(FastConvertError::config("Upload directory must not be empty"));
        }

        Ok(())
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::default();
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.quality, 80.0);
        assert_eq!(config.suffix, "webp");
        assert!(config.accepts(InputFormat::Png));
        assert!(config.accepts(InputFormat::Jpeg));
        assert!(!config.accepts(InputFormat::Gif));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ConversionConfig::new()
            .upload_dir("/tmp/out")
            .quality(65.0)
            .max_concurrent(4)
            .fail_fast(true);

        assert_eq!(config.upload_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.quality, 65.0);
        assert_eq!(config.max_concurrent, Some(4));
        assert!(config.fail_fast);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(ConversionConfig::new().quality(0.0).validate().is_err());
        assert!(ConversionConfig::new().quality(101.0).validate().is_err());
        assert!(ConversionConfig::new().input_formats(vec![]).validate().is_err());
        assert!(ConversionConfig::new().max_concurrent(0).validate().is_err());

        let mut config = ConversionConfig::new();
        config.suffix = "../x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(InputFormat::from_mime_type("image/png"), Some(InputFormat::Png));
        assert_eq!(InputFormat::from_mime_type("image/jpeg"), Some(InputFormat::Jpeg));
        assert_eq!(InputFormat::from_mime_type("application/pdf"), None);
        assert_eq!(InputFormat::Webp.mime_type(), "image/webp");
    }
}
