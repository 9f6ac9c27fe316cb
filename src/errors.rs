use crate::engine::EngineState;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CameraError {
    /// The configured identity resolved to no device.
    #[error("No camera found for {0}")]
    DeviceNotFound(String),

    /// The backend refused to create a handle for a resolved camera.
    #[error("Unable to open camera {0}")]
    DeviceOpen(Uuid),

    /// The backend refused to begin streaming on an open handle.
    #[error("Unable to start camera: {0}")]
    DeviceStart(String),

    #[error("Cannot {operation} while engine is {state}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },

    #[error("Capture session terminated after a device error")]
    SessionFaulted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(String),
}

impl CameraError {
    pub(crate) fn invalid_state(operation: &'static str, state: EngineState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Lifecycle errors come from calling a transition in the wrong state,
    /// as opposed to the device refusing it.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}
