//! Seams to the vendor camera SDK and the host engine.

use crate::plane::PlaneInfo;
use crate::types::{
    CaptureSettings, ConnectContext, IntrinsicCalibration, OutputFormat, PermissionStatus,
    PoseSnapshot, StreamCapabilitiesInfo,
};
use crate::Result;
use std::sync::{Arc, Mutex, PoisonError};

/// Invoked once with the outcome of a permission request, from any thread.
pub type PermissionCallback = Box<dyn FnOnce(PermissionStatus) + Send>;

/// Invoked for every raw video frame, usually on a vendor-owned thread.
/// The frame buffers are only valid for the duration of the call.
pub type FrameCallback =
    Arc<dyn Fn(&CameraOutput<'_>, &ResultExtras, &FrameMetadata) + Send + Sync>;

/// Box a closure as a [`FrameCallback`].
pub fn frame_callback<F>(callback: F) -> FrameCallback
where
    F: Fn(&CameraOutput<'_>, &ResultExtras, &FrameMetadata) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Planes of one captured frame.
#[derive(Debug, Clone)]
pub struct CameraOutput<'a> {
    pub format: OutputFormat,
    pub planes: Vec<PlaneInfo<'a>>,
}

/// Per-frame results reported by the capture pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultExtras {
    pub frame_number: i64,
    pub timestamp_ns: u64,
    pub intrinsics: Option<IntrinsicCalibration>,
}

/// Sensor settings in effect for a frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameMetadata {
    pub exposure_time_ns: Option<u64>,
    pub sensor_sensitivity: Option<i32>,
}

/// Operations the adapter needs from the vendor camera SDK.
///
/// Calls are made from the negotiation thread and from whichever thread
/// calls `stop_and_clean_up`, so implementations must be thread-safe.
pub trait CameraProvider: Send + Sync + 'static {
    /// Ask the user for camera permission; `on_result` fires exactly once.
    fn request_permission(&self, on_result: PermissionCallback);

    /// Whether camera permission is currently held.
    fn check_permission(&self) -> bool;

    /// Whether the camera device can be connected to right now.
    fn device_availability(&self) -> Result<bool>;

    fn connect(&self, context: &ConnectContext) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Capability groups in vendor enumeration order.
    fn stream_capabilities(&self) -> Result<Vec<StreamCapabilitiesInfo>>;

    /// Install or remove the raw frame callback.
    fn set_frame_callback(&self, callback: Option<FrameCallback>);

    fn prepare_capture(&self, settings: &CaptureSettings) -> Result<()>;

    /// Run auto-exposure / auto-white-balance before streaming.
    fn pre_capture_aeawb(&self) -> Result<()>;

    fn start_video_capture(&self) -> Result<()>;

    fn stop_video_capture(&self) -> Result<()>;

    fn disconnect(&self) -> Result<()>;
}

/// Host engine query for the rendering camera's current transform.
pub trait TransformSource: Send + Sync + 'static {
    fn camera_pose(&self) -> PoseSnapshot;
}

/// Transform slot the engine writes every frame and the sampler reads on
/// the camera thread.
#[derive(Debug, Default)]
pub struct SharedTransform {
    pose: Mutex<PoseSnapshot>,
}

impl SharedTransform {
    pub fn new(pose: PoseSnapshot) -> Self {
        Self {
            pose: Mutex::new(pose),
        }
    }

    pub fn set(&self, pose: PoseSnapshot) {
        *self.pose.lock().unwrap_or_else(PoisonError::into_inner) = pose;
    }
}

impl TransformSource for SharedTransform {
    fn camera_pose(&self) -> PoseSnapshot {
        *self.pose.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F> TransformSource for F
where
    F: Fn() -> PoseSnapshot + Send + Sync + 'static,
{
    fn camera_pose(&self) -> PoseSnapshot {
        self()
    }
}
