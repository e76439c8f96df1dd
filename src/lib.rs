//! # ml2_capture - Magic Leap 2 camera adapter for visual localization
//!
//! Bridges the headset's CV camera into a localization SDK's platform
//! support contract:
//! - Permission and device negotiation on a background thread
//! - Stream selection (3840x2160 preferred) and capture start
//! - Frame, calibration and engine pose captured as one snapshot per callback
//! - Stride-correct extraction of the luma plane into an owned buffer
//! - C FFI for native hosts
//!
//! ## Quick Start
//! ```no_run
//! use ml2_capture::{CameraPlatform, CaptureConfig, PlatformSupport, SharedTransform, SimulatedCamera};
//! use std::sync::Arc;
//!
//! # async fn run() -> ml2_capture::Result<()> {
//! let camera = Arc::new(SimulatedCamera::builder().build());
//! let platform = CameraPlatform::new(camera, Arc::new(SharedTransform::default()), CaptureConfig::from_env());
//!
//! if platform.configure_platform().await?.success {
//!     let update = platform.update_platform().await?;
//!     if let Some(data) = update.camera_data {
//!         println!("{}x{} intrinsics={:?}", data.width, data.height, data.intrinsics);
//!     }
//! }
//! platform.stop_and_clean_up().await;
//! # Ok(())
//! # }
//! ```

/// Log at info level when the verbose toggle is on.
macro_rules! verbose {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            log::info!($($arg)+);
        }
    };
}

pub mod error;
pub mod types;
pub mod config;
pub mod plane;
pub mod provider;
pub mod snapshot;
pub mod sampler;
pub mod negotiator;
pub mod platform;
pub mod simulated;
pub mod validation;
pub mod ffi;

pub use error::CaptureError;
pub use types::*;
pub use config::CaptureConfig;
pub use plane::{ImageData, PlaneInfo};
pub use provider::{CameraProvider, SharedTransform, TransformSource};
pub use negotiator::{select_stream_capability, Negotiator, Readiness};
pub use platform::{CameraPlatform, PlatformSupport};
pub use simulated::SimulatedCamera;

/// Result type alias for ml2_capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
