//! Software stand-in for the headset camera.
//!
//! Implements `CameraProvider` with scripted permission, availability and
//! connection outcomes, and streams synthetic luma frames with row padding
//! from a background thread once capture starts.

use crate::plane::PlaneInfo;
use crate::provider::{
    CameraOutput, CameraProvider, FrameCallback, FrameMetadata, PermissionCallback, ResultExtras,
};
use crate::types::{
    CaptureSettings, CaptureType, ConnectContext, IntrinsicCalibration, OutputFormat,
    PermissionStatus, StreamCapabilitiesInfo, StreamCapability,
};
use crate::{lock, CaptureError, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Extra bytes appended to every synthetic row.
pub const ROW_PADDING: u32 = 64;

#[derive(Debug, Clone)]
struct Script {
    /// `None` leaves the permission request unanswered.
    permission: Option<PermissionStatus>,
    unavailable_polls: u32,
    capabilities: Vec<StreamCapabilitiesInfo>,
    fail_connect: bool,
    fail_start: bool,
    streaming: bool,
    frame_interval: Duration,
    intrinsics: Option<IntrinsicCalibration>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            permission: Some(PermissionStatus::Granted),
            unavailable_polls: 0,
            capabilities: vec![StreamCapabilitiesInfo {
                capabilities: [(640, 480), (1280, 720), (1920, 1080), (3840, 2160)]
                    .into_iter()
                    .map(|(w, h)| StreamCapability::new(w, h, CaptureType::Video))
                    .collect(),
            }],
            fail_connect: false,
            fail_start: false,
            streaming: true,
            frame_interval: Duration::from_millis(5),
            intrinsics: None,
        }
    }
}

/// Builder for [`SimulatedCamera`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedCameraBuilder {
    script: Script,
    intrinsics_set: bool,
}

impl SimulatedCameraBuilder {
    pub fn permission(mut self, status: PermissionStatus) -> Self {
        self.script.permission = Some(status);
        self
    }

    /// Never answer the permission request.
    pub fn withhold_permission(mut self) -> Self {
        self.script.permission = None;
        self
    }

    /// Report the device as unavailable for the first `polls` checks.
    pub fn unavailable_polls(mut self, polls: u32) -> Self {
        self.script.unavailable_polls = polls;
        self
    }

    pub fn capabilities(mut self, capabilities: Vec<StreamCapabilitiesInfo>) -> Self {
        self.script.capabilities = capabilities;
        self
    }

    pub fn fail_connect(mut self, fail: bool) -> Self {
        self.script.fail_connect = fail;
        self
    }

    pub fn fail_start(mut self, fail: bool) -> Self {
        self.script.fail_start = fail;
        self
    }

    /// When false, frames are only delivered through [`SimulatedCamera::emit_frame`].
    pub fn streaming(mut self, streaming: bool) -> Self {
        self.script.streaming = streaming;
        self
    }

    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.script.frame_interval = interval;
        self
    }

    /// Calibration attached to streamed frames; `None` streams frames without it.
    pub fn intrinsics(mut self, intrinsics: Option<IntrinsicCalibration>) -> Self {
        self.script.intrinsics = intrinsics;
        self.intrinsics_set = true;
        self
    }

    pub fn build(self) -> SimulatedCamera {
        let mut script = self.script;
        if !self.intrinsics_set {
            script.intrinsics = Some(SimulatedCamera::default_intrinsics(3840, 2160));
        }
        SimulatedCamera {
            script,
            callback: Arc::new(Mutex::new(None)),
            pending_permission: Mutex::new(Vec::new()),
            permission_held: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            availability_checks: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            prepared: Mutex::new(None),
            streamer: Mutex::new(None),
        }
    }
}

struct Streamer {
    stop_flag: Arc<AtomicBool>,
    thread: std::thread::JoinHandle<()>,
}

impl Streamer {
    fn shutdown(self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.thread.join();
    }
}

pub struct SimulatedCamera {
    script: Script,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    pending_permission: Mutex<Vec<PermissionCallback>>,
    permission_held: AtomicBool,
    connected: AtomicBool,
    availability_checks: AtomicU32,
    disconnect_calls: AtomicU32,
    prepared: Mutex<Option<CaptureSettings>>,
    streamer: Mutex<Option<Streamer>>,
}

impl SimulatedCamera {
    pub fn builder() -> SimulatedCameraBuilder {
        SimulatedCameraBuilder::default()
    }

    /// Plausible pinhole calibration for a given resolution.
    pub fn default_intrinsics(width: u32, height: u32) -> IntrinsicCalibration {
        IntrinsicCalibration {
            width,
            height,
            focal_length: [width as f32 * 0.75, width as f32 * 0.75],
            principal_point: [width as f32 / 2.0, height as f32 / 2.0],
            fov: 67.4,
            distortion: [0.12, -0.25, 0.0005, -0.0003, 0.09],
        }
    }

    /// Synthetic luma plane: pixel (x, y) = (x + y + seed) mod 256, padding 0xFF.
    pub fn synthetic_plane(width: u32, height: u32, stride: u32, seed: u64) -> Vec<u8> {
        let mut data = vec![0xFFu8; stride as usize * height as usize];
        for y in 0..height as usize {
            let row = &mut data[y * stride as usize..y * stride as usize + width as usize];
            for (x, px) in row.iter_mut().enumerate() {
                *px = ((x + y) as u64 + seed) as u8;
            }
        }
        data
    }

    pub fn availability_checks(&self) -> u32 {
        self.availability_checks.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn prepared_stream(&self) -> Option<StreamCapability> {
        let prepared = *lock(&self.prepared);
        prepared.map(|settings| settings.stream)
    }

    pub fn has_frame_callback(&self) -> bool {
        lock(&self.callback).is_some()
    }

    /// Deliver one frame to the installed callback on the calling thread.
    /// Returns false when no callback is installed.
    pub fn emit_frame(
        &self,
        plane: PlaneInfo<'_>,
        intrinsics: Option<IntrinsicCalibration>,
        frame_number: i64,
    ) -> bool {
        let callback = lock(&self.callback).clone();
        match callback {
            Some(callback) => {
                deliver(&callback, plane, intrinsics, frame_number, 0);
                true
            }
            None => false,
        }
    }

    fn stop_streamer(&self) {
        let streamer = lock(&self.streamer).take();
        if let Some(streamer) = streamer {
            streamer.shutdown();
        }
    }
}

fn deliver(
    callback: &FrameCallback,
    plane: PlaneInfo<'_>,
    intrinsics: Option<IntrinsicCalibration>,
    frame_number: i64,
    timestamp_ns: u64,
) {
    let output = CameraOutput {
        format: OutputFormat::Yuv420_888,
        planes: vec![plane],
    };
    let extras = ResultExtras {
        frame_number,
        timestamp_ns,
        intrinsics,
    };
    let metadata = FrameMetadata {
        exposure_time_ns: Some(8_000_000),
        sensor_sensitivity: Some(400),
    };
    callback(&output, &extras, &metadata);
}

fn streamer_loop(
    callback: Arc<Mutex<Option<FrameCallback>>>,
    stream: StreamCapability,
    script: Script,
    stop_flag: Arc<AtomicBool>,
) {
    let epoch = Instant::now();
    let stride = stream.width + ROW_PADDING;
    let mut frame_number = 0i64;

    log::debug!("Simulated stream {}x{} started", stream.width, stream.height);
    while !stop_flag.load(Ordering::Relaxed) {
        frame_number += 1;
        let data = SimulatedCamera::synthetic_plane(
            stream.width,
            stream.height,
            stride,
            frame_number as u64,
        );
        let plane = PlaneInfo::luma(&data, stream.width, stream.height, stride);

        // Clone out so the callback runs without holding the lock.
        let current = lock(&callback).clone();
        if let Some(current) = current {
            deliver(
                &current,
                plane,
                script.intrinsics,
                frame_number,
                epoch.elapsed().as_nanos() as u64,
            );
        }
        std::thread::sleep(script.frame_interval);
    }
    log::debug!("Simulated stream stopped after {} frames", frame_number);
}

impl CameraProvider for SimulatedCamera {
    fn request_permission(&self, on_result: PermissionCallback) {
        match self.script.permission {
            Some(status) => {
                self.permission_held
                    .store(status.is_granted(), Ordering::SeqCst);
                // Answer from another thread, like the system permission dialog.
                let spawned = std::thread::Builder::new()
                    .name("sim-permission".into())
                    .spawn(move || on_result(status));
                if let Err(e) = spawned {
                    log::warn!("Failed to spawn permission thread: {}", e);
                }
            }
            None => lock(&self.pending_permission).push(on_result),
        }
    }

    fn check_permission(&self) -> bool {
        self.permission_held.load(Ordering::SeqCst)
    }

    fn device_availability(&self) -> Result<bool> {
        let checks = self.availability_checks.fetch_add(1, Ordering::SeqCst);
        Ok(checks >= self.script.unavailable_polls)
    }

    fn connect(&self, context: &ConnectContext) -> Result<()> {
        if self.script.fail_connect {
            return Err(CaptureError::vendor("CreateAndConnect", "camera busy"));
        }
        log::debug!("Simulated connect: {:?}", context);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn stream_capabilities(&self) -> Result<Vec<StreamCapabilitiesInfo>> {
        if !self.is_connected() {
            return Err(CaptureError::vendor("GetStreamCapabilities", "not connected"));
        }
        Ok(self.script.capabilities.clone())
    }

    fn set_frame_callback(&self, callback: Option<FrameCallback>) {
        *lock(&self.callback) = callback;
    }

    fn prepare_capture(&self, settings: &CaptureSettings) -> Result<()> {
        if !self.is_connected() {
            return Err(CaptureError::vendor("PrepareCapture", "not connected"));
        }
        *lock(&self.prepared) = Some(*settings);
        Ok(())
    }

    fn pre_capture_aeawb(&self) -> Result<()> {
        Ok(())
    }

    fn start_video_capture(&self) -> Result<()> {
        if self.script.fail_start {
            return Err(CaptureError::vendor("CaptureVideoStart", "stream error"));
        }
        let prepared = *lock(&self.prepared);
        let stream = prepared
            .map(|settings| settings.stream)
            .ok_or_else(|| CaptureError::vendor("CaptureVideoStart", "capture not prepared"))?;

        if !self.script.streaming {
            return Ok(());
        }

        self.stop_streamer();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread = {
            let callback = self.callback.clone();
            let script = self.script.clone();
            let stop_flag = stop_flag.clone();
            std::thread::Builder::new()
                .name("sim-camera".into())
                .spawn(move || streamer_loop(callback, stream, script, stop_flag))
                .map_err(|e| CaptureError::vendor("CaptureVideoStart", e.to_string()))?
        };
        *lock(&self.streamer) = Some(Streamer { stop_flag, thread });
        Ok(())
    }

    fn stop_video_capture(&self) -> Result<()> {
        self.stop_streamer();
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.stop_streamer();
        self.connected.store(false, Ordering::SeqCst);
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for SimulatedCamera {
    fn drop(&mut self) {
        self.stop_streamer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::frame_callback;

    #[test]
    fn test_synthetic_plane_layout() {
        let data = SimulatedCamera::synthetic_plane(4, 2, 6, 10);
        assert_eq!(data, vec![10, 11, 12, 13, 0xFF, 0xFF, 11, 12, 13, 14, 0xFF, 0xFF]);
    }

    #[test]
    fn test_availability_after_polls() {
        let camera = SimulatedCamera::builder().unavailable_polls(2).build();
        assert!(!camera.device_availability().unwrap());
        assert!(!camera.device_availability().unwrap());
        assert!(camera.device_availability().unwrap());
        assert_eq!(camera.availability_checks(), 3);
    }

    #[test]
    fn test_emit_frame_requires_callback() {
        let camera = SimulatedCamera::builder().streaming(false).build();
        let data = [0u8; 4];
        assert!(!camera.emit_frame(PlaneInfo::luma(&data, 2, 2, 2), None, 1));

        let seen = Arc::new(AtomicU32::new(0));
        let counter = seen.clone();
        camera.set_frame_callback(Some(frame_callback(move |output, _, _| {
            assert_eq!(output.planes[0].width, 2);
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(camera.emit_frame(PlaneInfo::luma(&data, 2, 2, 2), None, 1));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_streams_after_start() {
        let camera = SimulatedCamera::builder()
            .frame_interval(Duration::from_millis(1))
            .build();
        let seen = Arc::new(AtomicU32::new(0));
        let counter = seen.clone();
        camera.set_frame_callback(Some(frame_callback(move |output, extras, _| {
            let plane = output.planes[0];
            assert_eq!(plane.stride, plane.width + ROW_PADDING);
            assert!(extras.intrinsics.is_some());
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        camera.connect(&ConnectContext::default()).unwrap();
        let stream = StreamCapability::new(64, 8, CaptureType::Video);
        camera
            .prepare_capture(&CaptureSettings {
                frame_rate: crate::types::CaptureFrameRate::Fps30,
                stream,
                output_format: OutputFormat::Yuv420_888,
            })
            .unwrap();
        camera.start_video_capture().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        camera.disconnect().unwrap();
        assert!(seen.load(Ordering::SeqCst) >= 3);
        assert!(!camera.is_connected());
    }
}
