//! The platform-support surface consumed by the localization SDK.

use crate::config::CaptureConfig;
use crate::negotiator::{Negotiator, Readiness};
use crate::plane::ImageData;
use crate::provider::{CameraProvider, TransformSource};
use crate::sampler::FrameSampler;
use crate::snapshot::FrameState;
use crate::types::{
    CameraData, ConfigureResult, ConnectionState, PlatformConfiguration, PlatformState,
    PlatformStatus, UpdateResult, MOUNTING_ORIENTATION,
};
use crate::{lock, CaptureError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Configure / update / stop lifecycle expected by the localizer.
#[allow(async_fn_in_trait)]
pub trait PlatformSupport {
    /// Bring the camera up with the default configuration.
    async fn configure_platform(&self) -> Result<ConfigureResult>;

    async fn configure_platform_with(
        &self,
        configuration: &PlatformConfiguration,
    ) -> Result<ConfigureResult>;

    /// Latest frame with pose and calibration.
    ///
    /// Fails with [`CaptureError::NotConfigured`] unless a configure call
    /// succeeded. An update without data is `success = false`, not an error.
    async fn update_platform(&self) -> Result<UpdateResult>;

    /// Update using a one-shot configuration instead of the stored one.
    async fn update_platform_with(
        &self,
        configuration: &PlatformConfiguration,
    ) -> Result<UpdateResult>;

    /// Disconnect the camera and release all buffers. Idempotent.
    async fn stop_and_clean_up(&self);
}

/// Platform support backed by a [`CameraProvider`].
pub struct CameraPlatform<P: CameraProvider> {
    negotiator: Arc<Negotiator<P>>,
    config: CaptureConfig,
    state: Mutex<PlatformState>,
    configuration: Mutex<PlatformConfiguration>,
    configured: AtomicBool,
}

impl<P: CameraProvider> CameraPlatform<P> {
    pub fn new(provider: Arc<P>, transform: Arc<dyn TransformSource>, config: CaptureConfig) -> Self {
        let sampler = Arc::new(FrameSampler::new(transform, config.verbose_logging));
        let negotiator = Arc::new(Negotiator::new(provider, config.clone(), sampler));
        Self {
            negotiator,
            config,
            state: Mutex::new(PlatformState::Unconfigured),
            configuration: Mutex::new(PlatformConfiguration::default()),
            configured: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> PlatformState {
        *lock(&self.state)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.negotiator.state()
    }

    /// Whether the camera is connected and frames have started arriving.
    pub fn is_camera_connected(&self) -> bool {
        self.negotiator.provider().is_connected() && self.negotiator.sampler().is_ready()
    }

    pub fn provider(&self) -> &Arc<P> {
        self.negotiator.provider()
    }

    pub fn negotiator(&self) -> &Arc<Negotiator<P>> {
        &self.negotiator
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Blocking teardown for callers outside an async context.
    pub fn stop(&self) {
        self.negotiator.disconnect();
        self.set_state(PlatformState::Stopped);
    }

    fn set_state(&self, state: PlatformState) {
        let mut current = lock(&self.state);
        if *current != state {
            log::debug!("Platform state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }

    fn camera_data(&self, invert_vertically: bool) -> (bool, Option<CameraData>) {
        match self.negotiator.sampler().latest() {
            Some(frame) => {
                assemble_camera_data(&frame, self.negotiator.is_capturing(), invert_vertically)
            }
            None => (false, None),
        }
    }

    async fn disconnect_in_background(&self) {
        let negotiator = self.negotiator.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || negotiator.disconnect()).await {
            log::warn!("Camera cleanup task failed: {}", e);
        }
    }
}

/// Build the localizer payload from a captured frame.
///
/// Returns `(false, None)` when capture is not running, no calibration has
/// been captured, or the plane cannot be extracted.
pub fn assemble_camera_data(
    frame: &FrameState,
    capturing: bool,
    invert_vertically: bool,
) -> (bool, Option<CameraData>) {
    if !capturing {
        return (false, None);
    }
    let Some(calibration) = frame.intrinsics.get() else {
        log::debug!("Frame {} has no calibration yet", frame.sample.sequence);
        return (false, None);
    };

    let image = match ImageData::copy_from_plane(&frame.sample.plane(), invert_vertically) {
        Ok(image) if !image.is_empty() => image,
        Ok(_) => return (false, None),
        Err(e) => {
            log::warn!("Dropping frame {}: {}", frame.sample.sequence, e);
            return (false, None);
        }
    };

    let data = CameraData {
        width: image.width(),
        height: image.height(),
        image,
        format: Default::default(),
        orientation: MOUNTING_ORIENTATION,
        intrinsics: calibration.as_vector(),
        distortion: calibration.distortion,
        pose: frame.pose,
        sequence: frame.sample.sequence,
    };
    (true, Some(data))
}

impl<P: CameraProvider> PlatformSupport for CameraPlatform<P> {
    async fn configure_platform(&self) -> Result<ConfigureResult> {
        self.configure_platform_with(&PlatformConfiguration::default())
            .await
    }

    async fn configure_platform_with(
        &self,
        configuration: &PlatformConfiguration,
    ) -> Result<ConfigureResult> {
        *lock(&self.configuration) = *configuration;

        if self.configured.load(Ordering::SeqCst) && self.negotiator.is_capturing() {
            log::debug!("Camera already configured");
            return Ok(ConfigureResult { success: true });
        }

        self.configured.store(false, Ordering::SeqCst);
        self.set_state(PlatformState::Configuring);

        let readiness = match self.negotiator.request_access() {
            Ok(rx) => rx,
            Err(e) => {
                log::error!("Could not start camera negotiation: {}", e);
                self.set_state(PlatformState::Unconfigured);
                return Ok(ConfigureResult { success: false });
            }
        };

        let timeout = self.config.configure_timeout;
        match tokio::time::timeout(timeout, readiness).await {
            Ok(Ok(Readiness::Ready)) => {
                self.configured.store(true, Ordering::SeqCst);
                self.set_state(PlatformState::Capturing);
                log::info!("Camera platform configured");
                Ok(ConfigureResult { success: true })
            }
            Ok(Ok(Readiness::NotReady(e))) => {
                log::warn!("Camera platform not ready: {}", e);
                self.set_state(PlatformState::Unconfigured);
                Ok(ConfigureResult { success: false })
            }
            Ok(Err(_)) => {
                log::warn!("Camera negotiation ended without a result");
                self.set_state(PlatformState::Unconfigured);
                Ok(ConfigureResult { success: false })
            }
            Err(_) => {
                log::error!("Camera configuration timed out after {:?}", timeout);
                self.disconnect_in_background().await;
                self.set_state(PlatformState::Unconfigured);
                Err(CaptureError::ConfigurationTimeout(timeout))
            }
        }
    }

    async fn update_platform(&self) -> Result<UpdateResult> {
        let configuration = *lock(&self.configuration);
        self.update_platform_with(&configuration).await
    }

    async fn update_platform_with(
        &self,
        configuration: &PlatformConfiguration,
    ) -> Result<UpdateResult> {
        if !self.configured.load(Ordering::SeqCst) {
            return Err(CaptureError::NotConfigured);
        }
        log::trace!("Platform update");

        let invert = configuration
            .invert_vertically
            .unwrap_or(self.config.invert_vertically);
        let (success, camera_data) = self.camera_data(invert);

        Ok(UpdateResult {
            success,
            status: PlatformStatus {
                tracking_quality: if success { 1.0 } else { 0.0 },
            },
            camera_data,
        })
    }

    async fn stop_and_clean_up(&self) {
        self.disconnect_in_background().await;
        self.set_state(PlatformState::Stopped);
    }
}

impl<P: CameraProvider> Drop for CameraPlatform<P> {
    fn drop(&mut self) {
        self.negotiator.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::CameraFrameSample;
    use crate::types::{IntrinsicCalibration, Intrinsics, PoseSnapshot};

    fn frame(intrinsics: Intrinsics) -> FrameState {
        FrameState {
            sample: CameraFrameSample {
                data: vec![1, 2, 3, 0, 4, 5, 6, 0],
                width: 3,
                height: 2,
                stride: 4,
                bytes_per_pixel: 1,
                sequence: 42,
            },
            intrinsics,
            pose: PoseSnapshot {
                position: [0.1, 0.2, 0.3],
                ..PoseSnapshot::IDENTITY
            },
        }
    }

    fn calibration() -> IntrinsicCalibration {
        IntrinsicCalibration {
            width: 3,
            height: 2,
            focal_length: [2.5, 2.6],
            principal_point: [1.5, 1.0],
            fov: 80.0,
            distortion: [0.1, 0.2, 0.3, 0.4, 0.5],
        }
    }

    #[test]
    fn test_assemble_packs_frame() {
        let (success, data) =
            assemble_camera_data(&frame(Intrinsics::Captured(calibration())), true, false);
        assert!(success);
        let data = data.unwrap();
        assert_eq!(data.image.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!((data.width, data.height), (3, 2));
        assert_eq!(data.intrinsics, [2.5, 2.6, 1.5, 1.0]);
        assert_eq!(data.distortion, [0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(data.orientation, MOUNTING_ORIENTATION);
        assert_eq!(data.pose.position, [0.1, 0.2, 0.3]);
        assert_eq!(data.sequence, 42);
    }

    #[test]
    fn test_assemble_inverted() {
        let (_, data) =
            assemble_camera_data(&frame(Intrinsics::Captured(calibration())), true, true);
        assert_eq!(data.unwrap().image.as_bytes(), &[4, 5, 6, 1, 2, 3]);
    }

    #[test]
    fn test_assemble_fails_closed_without_intrinsics() {
        let (success, data) = assemble_camera_data(&frame(Intrinsics::NotCaptured), true, false);
        assert!(!success);
        assert!(data.is_none());
    }

    #[test]
    fn test_assemble_requires_capture() {
        let (success, data) =
            assemble_camera_data(&frame(Intrinsics::Captured(calibration())), false, false);
        assert!(!success);
        assert!(data.is_none());
    }

    #[test]
    fn test_assemble_rejects_truncated_plane() {
        let mut state = frame(Intrinsics::Captured(calibration()));
        state.sample.data.truncate(5);
        let (success, data) = assemble_camera_data(&state, true, false);
        assert!(!success);
        assert!(data.is_none());
    }
}
