use crate::plane::ImageData;
use std::fmt;

/// Orientation correction applied to every frame: a 180° roll about the
/// camera's optical axis, as quaternion `[x, y, z, w]`. Specific to the
/// Magic Leap 2 CV camera mount.
pub const MOUNTING_ORIENTATION: [f32; 4] = [0.0, 0.0, 1.0, 0.0];

/// Preferred capture resolution when the device offers it.
pub const DEFAULT_TARGET_RESOLUTION: (u32, u32) = (3840, 2160);

/// Engine camera transform captured together with a frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSnapshot {
    /// World position in meters [x, y, z].
    pub position: [f32; 3],
    /// Orientation quaternion [x, y, z, w].
    pub orientation: [f32; 4],
}

impl PoseSnapshot {
    pub const IDENTITY: PoseSnapshot = PoseSnapshot {
        position: [0.0; 3],
        orientation: [0.0, 0.0, 0.0, 1.0],
    };
}

impl Default for PoseSnapshot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Factory calibration reported alongside a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntrinsicCalibration {
    pub width: u32,
    pub height: u32,
    /// Focal length in pixels [fx, fy].
    pub focal_length: [f32; 2],
    /// Principal point in pixels [cx, cy].
    pub principal_point: [f32; 2],
    /// Horizontal field of view in degrees.
    pub fov: f32,
    /// Distortion coefficients [k1, k2, p1, p2, k3].
    pub distortion: [f64; 5],
}

impl IntrinsicCalibration {
    /// Pack as `[fx, fy, cx, cy]`.
    pub fn as_vector(&self) -> [f32; 4] {
        [
            self.focal_length[0],
            self.focal_length[1],
            self.principal_point[0],
            self.principal_point[1],
        ]
    }
}

impl fmt::Display for IntrinsicCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} focal=({:.3}, {:.3}) principal=({:.3}, {:.3}) fov={:.2}",
            self.width,
            self.height,
            self.focal_length[0],
            self.focal_length[1],
            self.principal_point[0],
            self.principal_point[1],
            self.fov
        )?;
        for (i, k) in self.distortion.iter().enumerate() {
            write!(f, " d{}={:.6}", i, k)?;
        }
        Ok(())
    }
}

/// Calibration state of the sampler. Stays `NotCaptured` until a frame
/// arrives with calibration attached.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Intrinsics {
    #[default]
    NotCaptured,
    Captured(IntrinsicCalibration),
}

impl Intrinsics {
    pub fn get(&self) -> Option<&IntrinsicCalibration> {
        match self {
            Intrinsics::NotCaptured => None,
            Intrinsics::Captured(calibration) => Some(calibration),
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, Intrinsics::Captured(_))
    }
}

impl From<Option<IntrinsicCalibration>> for Intrinsics {
    fn from(value: Option<IntrinsicCalibration>) -> Self {
        value.map_or(Intrinsics::NotCaptured, Intrinsics::Captured)
    }
}

/// Capture pipeline a stream capability belongs to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureType {
    Image = 0,
    Video = 1,
    Preview = 2,
}

/// Pixel format requested from the capture stream.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yuv420_888 = 0,
    Rgba8888 = 1,
    Jpeg = 2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFrameRate {
    Fps15 = 15,
    Fps30 = 30,
    Fps60 = 60,
}

impl CaptureFrameRate {
    /// Map a frames-per-second count onto the supported rates.
    pub fn from_fps(fps: u32) -> Option<Self> {
        match fps {
            15 => Some(CaptureFrameRate::Fps15),
            30 => Some(CaptureFrameRate::Fps30),
            60 => Some(CaptureFrameRate::Fps60),
            _ => None,
        }
    }
}

/// One resolution/pipeline combination the camera can stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCapability {
    pub width: u32,
    pub height: u32,
    pub capture_type: CaptureType,
}

impl StreamCapability {
    pub fn new(width: u32, height: u32, capture_type: CaptureType) -> Self {
        Self {
            width,
            height,
            capture_type,
        }
    }
}

/// A group of capabilities as the vendor SDK reports them.
#[derive(Debug, Clone, Default)]
pub struct StreamCapabilitiesInfo {
    pub capabilities: Vec<StreamCapability>,
}

/// Physical camera to connect to.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraId {
    /// Main (RGB) camera.
    Main = 0,
    /// Computer-vision camera, not shared with the compositor.
    Cv = 1,
}

bitflags::bitflags! {
    /// Connection flags passed to the vendor connect call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct ConnectFlags: u32 {
        const CAMERA_ONLY         = 1 << 0;
        const MIXED_REALITY       = 1 << 1;
        const VIDEO_STABILIZATION = 1 << 2;
    }
}

/// Parameters for connecting to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectContext {
    pub camera: CameraId,
    pub flags: ConnectFlags,
}

impl Default for ConnectContext {
    fn default() -> Self {
        Self {
            camera: CameraId::Cv,
            flags: ConnectFlags::CAMERA_ONLY | ConnectFlags::VIDEO_STABILIZATION,
        }
    }
}

/// Single-stream capture configuration handed to `prepare_capture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub frame_rate: CaptureFrameRate,
    pub stream: StreamCapability,
    pub output_format: OutputFormat,
}

/// Lifecycle of the camera connection, owned by the negotiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    DeviceUnavailable,
    Connecting,
    StreamsReady,
    Capturing,
}

/// Lifecycle of the platform facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformState {
    Unconfigured,
    Configuring,
    Capturing,
    Stopped,
}

/// Permission outcome delivered by the vendor permission callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    DeniedDontAskAgain,
}

impl PermissionStatus {
    pub fn is_granted(self) -> bool {
        self == PermissionStatus::Granted
    }
}

/// Layout of the image payload handed to the localizer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraDataFormat {
    /// Luminance only (the Y plane of a YUV frame).
    #[default]
    SingleChannel = 0,
}

/// Per-call configuration accepted by the platform facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformConfiguration {
    pub camera_data_format: CameraDataFormat,
    /// Overrides `CaptureConfig::invert_vertically` for this call.
    pub invert_vertically: Option<bool>,
}

/// Everything the localizer needs from one captured frame.
#[derive(Debug)]
pub struct CameraData {
    pub image: ImageData,
    pub width: u32,
    pub height: u32,
    pub format: CameraDataFormat,
    /// Mounting correction, see [`MOUNTING_ORIENTATION`].
    pub orientation: [f32; 4],
    /// `[fx, fy, cx, cy]`.
    pub intrinsics: [f32; 4],
    pub distortion: [f64; 5],
    pub pose: PoseSnapshot,
    /// Callback sequence number of the source frame.
    pub sequence: u64,
}

impl CameraData {
    /// Release the image buffer ahead of drop.
    pub fn dispose(&mut self) {
        self.image.dispose();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformStatus {
    /// 1.0 while frames are flowing, 0.0 otherwise.
    pub tracking_quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureResult {
    pub success: bool,
}

#[derive(Debug)]
pub struct UpdateResult {
    pub success: bool,
    pub status: PlatformStatus,
    pub camera_data: Option<CameraData>,
}
