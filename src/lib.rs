//! cleye-stream: CL-Eye multicam devices as a shared frame stream
//!
//! The crate wraps a camera driver behind the [`DeviceBackend`] trait and
//! turns it into a continuous, demand-driven sequence of normalized frames.
//!
//! # Features
//! - Explicit device lifecycle: load, start, stop, unload
//! - Sensor parameters that survive device restarts, with auto modes as
//!   shadow state over the last manual value
//! - BGRA→BGR normalization for color modes, zero-copy mono capture
//! - One physical capture session shared by any number of subscribers
//! - Synthetic backend for running everything without hardware
//!
//! # Usage
//! ```rust,no_run
//! use cleye_stream::testing::SyntheticBackend;
//! use cleye_stream::{CaptureEngine, FrameSource};
//! use std::sync::Arc;
//!
//! let engine = CaptureEngine::new(Arc::new(SyntheticBackend::new()));
//! let source = FrameSource::new(engine);
//! let mut frames = source.subscribe().expect("camera available");
//! if let Some(frame) = frames.blocking_recv() {
//!     println!("{}x{} frame #{}", frame.width, frame.height, frame.sequence);
//! }
//! ```
pub mod backend;
pub mod buffers;
pub mod config;
pub mod engine;
pub mod errors;
pub mod parameters;
pub mod publisher;
pub mod types;

// Testing utilities - synthetic backend for offline testing
pub mod testing;

// Re-exports for convenience
pub use backend::{available_cameras, BackendError, CameraParameter, DeviceBackend, DeviceHandle};
pub use config::CleyeConfig;
pub use engine::{CaptureEngine, CaptureStats, EngineState, FrameObserver};
pub use errors::CameraError;
pub use parameters::{ParameterStore, ParameterValue, RuntimeParameters};
pub use publisher::{FrameSource, FrameSubscription};
pub use types::{CaptureConfig, ColorMode, DeviceIdentity, Frame, PixelFormat, Resolution};

/// Initialize logging for the capture system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "cleye_stream=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
