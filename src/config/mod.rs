//! Application Configuration
//!
//! Capture, decode and validation settings stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Capture device settings
    pub capture: CaptureSettings,
    /// Region of interest limits
    pub region: RegionSettings,
    /// Image preprocessing before recognition
    pub preprocess: PreprocessSettings,
    /// Optional recognition geometry to collect
    pub recognition: RecognitionSettings,
    /// Decode worker settings
    pub worker: WorkerSettings,
    /// Continuous-mode completion policy
    pub validation: ValidationSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Decode continuously instead of waiting for the shutter
    pub continuous: bool,
    /// Mirror frames horizontally before recognition
    pub reverse_image: bool,
    /// Let the device focus automatically
    pub auto_focus: bool,
    /// Prefer one-shot auto focus over continuous focus modes
    pub disable_continuous_focus: bool,
    /// Turn the torch on while previewing
    pub torch: bool,
    /// Re-focus interval for focus modes that need explicit triggering
    pub focus_interval_ms: u64,
    /// Smallest acceptable preview size in pixels
    pub min_preview_pixels: u32,
    /// Largest acceptable preview size in pixels
    pub max_preview_pixels: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            continuous: true,
            reverse_image: false,
            auto_focus: true,
            disable_continuous_focus: true,
            torch: true,
            focus_interval_ms: 2000,
            min_preview_pixels: 470 * 320,
            max_preview_pixels: 1280 * 720,
        }
    }
}

impl CaptureSettings {
    pub fn focus_interval(&self) -> Duration {
        Duration::from_millis(self.focus_interval_ms)
    }
}

/// Region of interest limits, in visible-preview units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    /// Minimum width of the default region
    pub min_width: i32,
    /// Minimum height of the default region
    pub min_height: i32,
    /// Minimum height an adjustment may shrink the region to
    pub min_adjusted_height: i32,
    /// Gap kept between the region and the visible bounds when growing
    pub edge_margin: i32,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            min_width: 50,
            min_height: 20,
            min_adjusted_height: 50,
            edge_margin: 4,
        }
    }
}

/// Preprocessing applied to the cropped luminance image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Apply adaptive binarization
    pub binarize: bool,
    /// Otsu tile width in pixels
    pub tile_width: u32,
    /// Otsu tile height in pixels
    pub tile_height: u32,
    /// Horizontal threshold smoothing, in tiles
    pub smooth_x: u32,
    /// Vertical threshold smoothing, in tiles
    pub smooth_y: u32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            binarize: true,
            tile_width: 32,
            tile_height: 32,
            smooth_x: 2,
            smooth_y: 2,
        }
    }
}

/// Which optional bounding-box sets to request from the recognizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    pub region_boxes: bool,
    pub textline_boxes: bool,
    pub strip_boxes: bool,
}

/// Decode worker settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// How long shutdown waits for the worker loop to exit
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 500,
        }
    }
}

impl WorkerSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Heuristic deciding when a continuous result is worth validating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Minimum mean confidence (0-100)
    pub min_mean_confidence: u8,
    /// Minimum number of recognized lines
    pub min_lines: usize,
    /// Maximum number of recognized lines
    pub max_lines: usize,
    /// Lines must be strictly longer than this to be kept
    pub line_length_threshold: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_mean_confidence: 50,
            min_lines: 2,
            max_lines: 3,
            line_length_threshold: 10,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Get the configuration directory
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("pro", "flynn", "mrz-capture")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Load the given file, or `config.toml` in the config directory, falling back to defaults.
///
/// Also returns the file that was read, if any. Nothing is logged here since
/// the subscriber is usually configured from the result.
pub fn load_or_default(path: Option<&Path>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = path {
        return Ok((load_config(path)?, Some(path.to_path_buf())));
    }

    if let Ok(dir) = config_dir() {
        let path = dir.join("config.toml");
        if path.exists() {
            return Ok((load_config(&path)?, Some(path)));
        }
    }

    Ok((AppConfig::default(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert!(config.capture.continuous);
        assert!(!config.capture.reverse_image);
        assert_eq!(config.capture.max_preview_pixels, 921_600);

        assert_eq!(config.region.min_width, 50);
        assert_eq!(config.region.min_height, 20);
        assert_eq!(config.region.edge_margin, 4);

        assert_eq!(config.worker.shutdown_timeout(), Duration::from_millis(500));

        assert_eq!(config.validation.min_mean_confidence, 50);
        assert_eq!(config.validation.min_lines, 2);
        assert_eq!(config.validation.max_lines, 3);
        assert_eq!(config.validation.line_length_threshold, 10);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [capture]
            continuous = false

            [validation]
            min_mean_confidence = 70
            "#,
        )
        .unwrap();

        assert!(!parsed.capture.continuous);
        assert!(parsed.capture.auto_focus);
        assert_eq!(parsed.validation.min_mean_confidence, 70);
        assert_eq!(parsed.validation.max_lines, 3);
        assert_eq!(parsed.preprocess, PreprocessSettings::default());
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.capture.reverse_image = true;
        config.worker.shutdown_timeout_ms = 250;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();

        let loaded = load_config(temp_file.path()).unwrap();
        assert!(loaded.capture.reverse_image);
        assert_eq!(loaded.worker.shutdown_timeout_ms, 250);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_prefers_explicit_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[worker]\nshutdown_timeout_ms = 100").unwrap();

        let (config, source) = load_or_default(Some(temp_file.path())).unwrap();
        assert_eq!(config.worker.shutdown_timeout_ms, 100);
        assert_eq!(source.as_deref(), Some(temp_file.path()));
    }
}
