//! Capture configuration and frame types shared by the engine and publisher.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Pixel layout the driver is asked to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    MonoProcessed,
    ColorProcessed,
    MonoRaw,
    ColorRaw,
    BayerRaw,
}

impl ColorMode {
    /// Color modes deliver padded BGRA and need normalization to BGR.
    pub fn is_color(self) -> bool {
        matches!(self, Self::ColorProcessed | Self::ColorRaw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MonoProcessed => "mono_processed",
            Self::ColorProcessed => "color_processed",
            Self::MonoRaw => "mono_raw",
            Self::ColorRaw => "color_raw",
            Self::BayerRaw => "bayer_raw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "mono_processed" => Some(Self::MonoProcessed),
            "color_processed" => Some(Self::ColorProcessed),
            "mono_raw" => Some(Self::MonoRaw),
            "color_raw" => Some(Self::ColorRaw),
            "bayer_raw" => Some(Self::BayerRaw),
            _ => None,
        }
    }
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::ColorRaw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// 320x240
    Qvga,
    /// 640x480
    Vga,
}

impl Resolution {
    /// Nominal sensor dimensions; the backend's reported dimensions win at load time.
    pub fn nominal_size(self) -> (u32, u32) {
        match self {
            Self::Qvga => (320, 240),
            Self::Vga => (640, 480),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "qvga" => Some(Self::Qvga),
            "vga" => Some(Self::Vga),
            _ => None,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Vga
    }
}

/// Which physical camera to open. An explicit GUID takes precedence over the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub camera_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_guid: Option<Uuid>,
}

impl DeviceIdentity {
    pub fn index(camera_index: usize) -> Self {
        Self {
            camera_index,
            camera_guid: None,
        }
    }

    pub fn guid(guid: Uuid) -> Self {
        Self {
            camera_index: 0,
            camera_guid: Some(guid),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.camera_guid {
            Some(guid) => write!(f, "camera {}", guid),
            None => write!(f, "camera index {}", self.camera_index),
        }
    }
}

/// Session-level capture settings. Fixed while a device is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub color_mode: ColorMode,
    pub resolution: Resolution,
    pub frame_rate: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            color_mode: ColorMode::ColorRaw,
            resolution: Resolution::Vga,
            frame_rate: 60.0,
        }
    }
}

impl CaptureConfig {
    pub fn new(color_mode: ColorMode, resolution: Resolution, frame_rate: f32) -> Self {
        Self {
            color_mode,
            resolution,
            frame_rate,
        }
    }
}

/// Layout of an emitted frame after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Gray8,
    Bayer8,
    Bgra8,
    Bgr8,
}

impl PixelFormat {
    pub fn channels(self) -> u8 {
        match self {
            Self::Gray8 | Self::Bayer8 => 1,
            Self::Bgr8 => 3,
            Self::Bgra8 => 4,
        }
    }
}

/// An immutable normalized snapshot. Cloning shares the payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
}

impl Frame {
    pub fn channels(&self) -> u8 {
        self.format.channels()
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels() as usize
    }
}
