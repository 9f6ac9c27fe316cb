//! The device driver seen as an opaque capability.
//!
//! Implementations wrap the vendor multicam driver (or a test double). The
//! engine is the only owner of a [`DeviceHandle`]; backends hand one out from
//! [`DeviceBackend::open`] and get it back in [`DeviceBackend::close`].

use crate::types::{ColorMode, Resolution};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Opaque token for an open camera. Not `Clone`/`Copy`: exactly one owner.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceHandle(u64);

impl DeviceHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Driver parameter enumeration, in driver order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraParameter {
    AutoGain,
    Gain,
    AutoExposure,
    Exposure,
    AutoWhiteBalance,
    WhiteBalanceRed,
    WhiteBalanceGreen,
    WhiteBalanceBlue,
    HFlip,
    VFlip,
    HKeystone,
    VKeystone,
    XOffset,
    YOffset,
    Rotation,
    Zoom,
    LensCorrection1,
    LensCorrection2,
    LensCorrection3,
    LensBrightness,
}

impl CameraParameter {
    /// Inclusive value range accepted by the driver.
    pub fn range(self) -> (i32, i32) {
        match self {
            Self::AutoGain | Self::AutoExposure | Self::AutoWhiteBalance | Self::HFlip | Self::VFlip => {
                (0, 1)
            }
            Self::Gain => (0, 79),
            Self::Exposure => (0, 511),
            Self::WhiteBalanceRed | Self::WhiteBalanceGreen | Self::WhiteBalanceBlue => (0, 255),
            _ => (-500, 500),
        }
    }

    /// Sensor parameters are tracked by the parameter store; the geometric and
    /// lens ones are pass-through only.
    pub fn is_sensor(self) -> bool {
        matches!(
            self,
            Self::AutoGain
                | Self::Gain
                | Self::AutoExposure
                | Self::Exposure
                | Self::AutoWhiteBalance
                | Self::WhiteBalanceRed
                | Self::WhiteBalanceGreen
                | Self::WhiteBalanceBlue
        )
    }
}

/// Unrecoverable failure reported from the frame pull. Ends the capture loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("device failure: {0}")]
pub struct BackendError(pub String);

pub trait DeviceBackend: Send + Sync + 'static {
    /// Number of cameras currently attached.
    fn camera_count(&self) -> usize;

    /// GUID of the camera at `index`, or the nil GUID when there is none.
    fn camera_uuid(&self, index: usize) -> Uuid;

    /// Create a camera instance. `None` means the driver refused.
    fn open(
        &self,
        guid: Uuid,
        color_mode: ColorMode,
        resolution: Resolution,
        frame_rate: f32,
    ) -> Option<DeviceHandle>;

    fn close(&self, handle: DeviceHandle) -> bool;

    fn start(&self, handle: &DeviceHandle) -> bool;

    fn stop(&self, handle: &DeviceHandle) -> bool;

    fn set_led(&self, handle: &DeviceHandle, on: bool) -> bool;

    fn set_parameter(&self, handle: &DeviceHandle, param: CameraParameter, value: i32) -> bool;

    fn get_parameter(&self, handle: &DeviceHandle, param: CameraParameter) -> i32;

    fn frame_dimensions(&self, handle: &DeviceHandle) -> Option<(u32, u32)>;

    /// Block up to `timeout` for the next frame and copy it into `buffer`.
    ///
    /// `Ok(false)` means no frame was ready in time and is not an error.
    fn pull_frame(
        &self,
        handle: &DeviceHandle,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<bool, BackendError>;
}

/// GUIDs of all attached cameras, in index order.
pub fn available_cameras(backend: &dyn DeviceBackend) -> Vec<Uuid> {
    (0..backend.camera_count())
        .map(|index| backend.camera_uuid(index))
        .filter(|guid| !guid.is_nil())
        .collect()
}
