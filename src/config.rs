//! Configuration management for cleye-stream
//!
//! Loads and saves the capture configuration, device identity, sensor
//! parameters and stream tuning as TOML.

use crate::errors::CameraError;
use crate::parameters::RuntimeParameters;
use crate::types::{CaptureConfig, DeviceIdentity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleyeConfig {
    pub camera: CameraSection,
    #[serde(default)]
    pub parameters: RuntimeParameters,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Which device to open and how
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraSection {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    #[serde(flatten)]
    pub capture: CaptureConfig,
}

/// Capture loop and fan-out tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// How long a single frame pull may block, in milliseconds
    pub pull_timeout_ms: u64,
    /// Frames buffered per subscriber before the slowest one starts missing frames
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pull_timeout_ms: 500,
            channel_capacity: 16,
        }
    }
}

impl StreamConfig {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }
}

impl CleyeConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("Failed to read config file: {}", e)))?;

        let config: CleyeConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(CameraError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("cleye.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        validate_capture(&self.camera.capture)?;

        if self.stream.pull_timeout_ms == 0 {
            return Err("Pull timeout must be at least 1 ms".to_string());
        }
        if self.stream.channel_capacity == 0 {
            return Err("Channel capacity must be at least 1".to_string());
        }

        Ok(())
    }
}

pub(crate) fn validate_capture(capture: &CaptureConfig) -> Result<(), String> {
    if !capture.frame_rate.is_finite() || capture.frame_rate <= 0.0 {
        return Err(format!(
            "Frame rate must be positive, got {}",
            capture.frame_rate
        ));
    }
    Ok(())
}
