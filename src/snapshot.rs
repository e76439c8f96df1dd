use crate::plane::PlaneInfo;
use crate::types::{Intrinsics, PoseSnapshot};
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Copy of one plane as delivered by the camera, padding included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFrameSample {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub bytes_per_pixel: u32,
    /// Position of the frame in callback order, starting at 1.
    pub sequence: u64,
}

impl CameraFrameSample {
    pub fn from_plane(plane: &PlaneInfo<'_>, sequence: u64) -> Self {
        Self {
            data: plane.data.to_vec(),
            width: plane.width,
            height: plane.height,
            stride: plane.stride,
            bytes_per_pixel: plane.bytes_per_pixel,
            sequence,
        }
    }

    pub fn plane(&self) -> PlaneInfo<'_> {
        PlaneInfo {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            bytes_per_pixel: self.bytes_per_pixel,
        }
    }
}

/// Pixels, calibration and pose that belong to the same instant.
#[derive(Debug, Clone)]
pub struct FrameState {
    pub sample: CameraFrameSample,
    pub intrinsics: Intrinsics,
    pub pose: PoseSnapshot,
}

/// Latest-frame slot shared between the camera callback (writer) and the
/// platform update path (reader).
///
/// Writers publish a whole `FrameState` with one pointer swap, so a reader
/// never sees pixels from one frame next to the pose of another. A reader
/// holding an `Arc` keeps its frame alive across a concurrent `clear()`.
#[derive(Debug, Default)]
pub struct FrameCell {
    latest: ArcSwapOption<FrameState>,
}

impl FrameCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, returning the one it replaced.
    pub fn store(&self, state: FrameState) -> Option<Arc<FrameState>> {
        self.latest.swap(Some(Arc::new(state)))
    }

    pub fn load(&self) -> Option<Arc<FrameState>> {
        self.latest.load_full()
    }

    pub fn clear(&self) -> Option<Arc<FrameState>> {
        self.latest.swap(None)
    }

    pub fn is_empty(&self) -> bool {
        self.latest.load().is_none()
    }
}
