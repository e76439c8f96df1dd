//! Camera bring-up: permission, device availability, connection, stream
//! selection and capture start, plus the matching teardown.

use crate::config::CaptureConfig;
use crate::provider::{frame_callback, CameraProvider};
use crate::sampler::FrameSampler;
use crate::types::{
    CaptureSettings, CaptureType, ConnectContext, ConnectionState, OutputFormat,
    StreamCapability,
};
use crate::{lock, CaptureError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Terminal outcome of a negotiation.
#[derive(Debug)]
pub enum Readiness {
    /// The first frame has arrived.
    Ready,
    /// Negotiation gave up; the camera is not streaming.
    NotReady(CaptureError),
}

/// One-shot readiness notification that whichever side finishes first
/// (negotiation failure or first frame) resolves.
pub struct ReadinessSignal {
    sender: Mutex<Option<oneshot::Sender<Readiness>>>,
}

impl ReadinessSignal {
    pub fn channel() -> (Arc<ReadinessSignal>, oneshot::Receiver<Readiness>) {
        let (tx, rx) = oneshot::channel();
        let signal = Arc::new(ReadinessSignal {
            sender: Mutex::new(Some(tx)),
        });
        (signal, rx)
    }

    /// Returns false if the signal was already resolved.
    pub fn resolve(&self, readiness: Readiness) -> bool {
        match lock(&self.sender).take() {
            Some(tx) => {
                // Receiver may be gone if configure timed out.
                let _ = tx.send(readiness);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        lock(&self.sender).is_none()
    }
}

/// Pick the stream to capture from.
///
/// Returns the first capability of `capture_type` matching `target` exactly.
/// Without an exact match, falls back to the first capability in enumeration
/// order, whatever its type.
pub fn select_stream_capability(
    capabilities: &[StreamCapability],
    capture_type: CaptureType,
    target: (u32, u32),
) -> Option<StreamCapability> {
    if let Some(exact) = capabilities
        .iter()
        .filter(|c| c.capture_type == capture_type)
        .find(|c| (c.width, c.height) == target)
    {
        return Some(*exact);
    }

    let fallback = capabilities.first().copied();
    if let Some(cap) = fallback {
        log::warn!(
            "No {:?} stream at {}x{}, falling back to first enumerated {}x{} {:?}",
            capture_type,
            target.0,
            target.1,
            cap.width,
            cap.height,
            cap.capture_type
        );
    }
    fallback
}

struct Worker {
    stop_tx: Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

/// Drives the camera from "permission requested" to "capturing" on a
/// background thread and tears it down again on `disconnect`.
pub struct Negotiator<P: CameraProvider> {
    provider: Arc<P>,
    config: CaptureConfig,
    sampler: Arc<FrameSampler>,
    state: Mutex<ConnectionState>,
    capabilities: Mutex<Option<Vec<StreamCapability>>>,
    capturing: AtomicBool,
    readiness: Mutex<Option<Arc<ReadinessSignal>>>,
    worker: Mutex<Option<Worker>>,
}

impl<P: CameraProvider> Negotiator<P> {
    pub fn new(provider: Arc<P>, config: CaptureConfig, sampler: Arc<FrameSampler>) -> Self {
        Self {
            provider,
            config,
            sampler,
            state: Mutex::new(ConnectionState::Disconnected),
            capabilities: Mutex::new(None),
            capturing: AtomicBool::new(false),
            readiness: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    /// Capabilities fetched on the current connection, if any.
    pub fn capabilities(&self) -> Option<Vec<StreamCapability>> {
        lock(&self.capabilities).clone()
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn sampler(&self) -> &Arc<FrameSampler> {
        &self.sampler
    }

    /// Request camera permission and bring the camera up in the background.
    ///
    /// The returned receiver resolves once: `Ready` on the first frame,
    /// `NotReady` if any step fails or the negotiation is cancelled.
    pub fn request_access(self: &Arc<Self>) -> Result<oneshot::Receiver<Readiness>> {
        self.disconnect();

        let (signal, rx) = ReadinessSignal::channel();
        *lock(&self.readiness) = Some(signal.clone());
        self.sampler.arm(signal.clone());

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let this = self.clone();
        let thread = std::thread::Builder::new()
            .name("ml2-negotiator".into())
            .spawn(move || this.negotiation_loop(stop_rx, signal))
            .map_err(|e| {
                CaptureError::Negotiation(format!("Failed to spawn negotiation thread: {}", e))
            })?;

        *lock(&self.worker) = Some(Worker { stop_tx, thread });
        Ok(rx)
    }

    fn negotiation_loop(&self, stop_rx: Receiver<()>, signal: Arc<ReadinessSignal>) {
        log::info!("Camera negotiation started");
        match self.negotiate(&stop_rx) {
            Ok(()) => {
                log::info!("Camera capture started, waiting for first frame");
            }
            Err(e) => {
                if signal.is_resolved() {
                    log::debug!("Negotiation ended after readiness resolved: {}", e);
                } else {
                    log::warn!("Camera not ready: {}", e);
                }
                self.release_camera();
                signal.resolve(Readiness::NotReady(e));
            }
        }
    }

    fn negotiate(&self, stop_rx: &Receiver<()>) -> Result<()> {
        let (permission_tx, permission_rx) = crossbeam_channel::bounded(1);
        self.provider.request_permission(Box::new(move |status| {
            let _ = permission_tx.send(status);
        }));

        let status = crossbeam_channel::select! {
            recv(permission_rx) -> status => status.map_err(|_| {
                CaptureError::Negotiation("Permission callback dropped without a result".into())
            })?,
            recv(stop_rx) -> _ => return Err(cancelled()),
        };

        if !status.is_granted() {
            log::error!("Camera permission {:?}", status);
            return Err(CaptureError::PermissionDenied);
        }
        log::debug!("Camera permission granted");

        if !self.provider.check_permission() {
            return Err(CaptureError::PermissionDenied);
        }

        self.wait_for_device(stop_rx)?;
        self.pause(stop_rx, self.config.settle_delay)?;
        self.connect_camera()?;
        self.pause(stop_rx, self.config.settle_delay)?;
        self.start_video_capture()
    }

    /// Sleep that returns early with an error when a stop is requested.
    fn pause(&self, stop_rx: &Receiver<()>, duration: Duration) -> Result<()> {
        match stop_rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            _ => Err(cancelled()),
        }
    }

    fn wait_for_device(&self, stop_rx: &Receiver<()>) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.device_availability() {
                Ok(true) => break,
                Ok(false) => log::debug!("Camera device unavailable (attempt {})", attempt),
                Err(e) => log::warn!("Availability check failed (attempt {}): {}", attempt, e),
            }
            self.set_state(ConnectionState::DeviceUnavailable);
            self.pause(stop_rx, self.config.poll_interval)?;
        }

        verbose!(self.config.verbose_logging, "Camera device available");
        Ok(())
    }

    fn connect_camera(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        let context = ConnectContext::default();
        self.provider.connect(&context).map_err(|e| {
            log::warn!("Camera connect failed: {}", e);
            e
        })?;
        log::info!("Connected to {:?} camera ({:?})", context.camera, context.flags);

        let capabilities = self.fetch_stream_capabilities()?;
        *lock(&self.capabilities) = Some(capabilities);
        self.set_state(ConnectionState::StreamsReady);

        let sampler = self.sampler.clone();
        self.provider
            .set_frame_callback(Some(frame_callback(move |output, extras, metadata| {
                sampler.on_raw_video_frame(output, extras, metadata)
            })));
        Ok(())
    }

    /// Flatten the vendor capability groups in enumeration order.
    fn fetch_stream_capabilities(&self) -> Result<Vec<StreamCapability>> {
        let groups = self.provider.stream_capabilities().map_err(|e| {
            log::warn!("Could not get stream capabilities: {}", e);
            e
        })?;

        let capabilities: Vec<StreamCapability> = groups
            .into_iter()
            .flat_map(|group| group.capabilities)
            .collect();

        if capabilities.is_empty() {
            return Err(CaptureError::NoStreamCapabilities);
        }
        if self.config.verbose_logging {
            for cap in &capabilities {
                log::info!("Stream capability: {}x{} {:?}", cap.width, cap.height, cap.capture_type);
            }
        }
        Ok(capabilities)
    }

    fn start_video_capture(&self) -> Result<()> {
        if self.config.capture_type != CaptureType::Video {
            return Err(CaptureError::Negotiation(format!(
                "Capture type {:?} does not stream frames",
                self.config.capture_type
            )));
        }

        let stream = {
            let capabilities = lock(&self.capabilities);
            let capabilities = capabilities.as_deref().unwrap_or(&[]);
            select_stream_capability(
                capabilities,
                self.config.capture_type,
                self.config.target_resolution,
            )
            .ok_or(CaptureError::NoStreamCapabilities)?
        };
        verbose!(
            self.config.verbose_logging,
            "Selected stream {}x{} {:?}",
            stream.width,
            stream.height,
            stream.capture_type
        );

        let settings = CaptureSettings {
            frame_rate: self.config.frame_rate,
            stream,
            output_format: OutputFormat::Yuv420_888,
        };
        self.provider.prepare_capture(&settings)?;

        if let Err(e) = self.provider.pre_capture_aeawb() {
            log::warn!("Pre-capture AE/AWB failed: {} (continuing)", e);
        }

        // Frames may arrive before start returns.
        self.capturing.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Capturing);
        if let Err(e) = self.provider.start_video_capture() {
            self.capturing.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Stop negotiation and release the camera. Calling this when already
    /// disconnected does nothing.
    pub fn disconnect(&self) {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            drop(worker.stop_tx);
            if worker.thread.thread().id() != std::thread::current().id() {
                let _ = worker.thread.join();
            }
        }

        if let Some(signal) = lock(&self.readiness).take() {
            signal.resolve(Readiness::NotReady(cancelled()));
        }

        if self.state() == ConnectionState::Disconnected && !self.provider.is_connected() {
            return;
        }
        self.release_camera();
        log::info!("Camera disconnected");
    }

    fn release_camera(&self) {
        let mut state = lock(&self.state);

        self.provider.set_frame_callback(None);
        if self.capturing.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.provider.stop_video_capture() {
                log::warn!("Stopping video capture failed: {}", e);
            }
        }
        if self.provider.is_connected() {
            if let Err(e) = self.provider.disconnect() {
                log::warn!("Camera disconnect failed: {}", e);
            }
        }

        *lock(&self.capabilities) = None;
        self.sampler.reset();
        *state = ConnectionState::Disconnected;
    }

    fn set_state(&self, state: ConnectionState) {
        let mut current = lock(&self.state);
        if *current != state {
            log::debug!("Connection state {:?} -> {:?}", *current, state);
            *current = state;
        }
    }
}

fn cancelled() -> CaptureError {
    CaptureError::Negotiation("negotiation cancelled".into())
}
