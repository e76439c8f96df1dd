use crate::lock;
use crate::negotiator::{Readiness, ReadinessSignal};
use crate::provider::{CameraOutput, FrameMetadata, ResultExtras, TransformSource};
use crate::snapshot::{CameraFrameSample, FrameCell, FrameState};
use crate::types::Intrinsics;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Arming state shared by the callback and `reset`. `generation` changes on
/// every arm and reset so a callback that started before a reset cannot
/// publish after it.
#[derive(Debug, Default)]
struct Gate {
    accepting: bool,
    generation: u64,
}

/// Receives raw frames from the camera and publishes them, together with
/// calibration and the engine camera pose, as one `FrameState`.
pub struct FrameSampler {
    frames: Arc<FrameCell>,
    transform: Arc<dyn TransformSource>,
    readiness: Mutex<Option<Arc<ReadinessSignal>>>,
    gate: Mutex<Gate>,
    ready: AtomicBool,
    sequence: AtomicU64,
    verbose: bool,
}

impl FrameSampler {
    pub fn new(transform: Arc<dyn TransformSource>, verbose: bool) -> Self {
        Self {
            frames: Arc::new(FrameCell::new()),
            transform,
            readiness: Mutex::new(None),
            gate: Mutex::new(Gate::default()),
            ready: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            verbose,
        }
    }

    pub fn frames(&self) -> &Arc<FrameCell> {
        &self.frames
    }

    pub fn latest(&self) -> Option<Arc<FrameState>> {
        self.frames.load()
    }

    /// Whether at least one frame arrived since the last reset.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn frame_count(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Start accepting frames; the first one resolves `signal` as ready.
    pub(crate) fn arm(&self, signal: Arc<ReadinessSignal>) {
        let mut gate = lock(&self.gate);
        gate.generation += 1;
        gate.accepting = true;
        *lock(&self.readiness) = Some(signal);
    }

    /// Drop the current frame and ignore callbacks until re-armed.
    ///
    /// Callbacks still in flight when this returns are discarded.
    pub(crate) fn reset(&self) {
        let mut gate = lock(&self.gate);
        gate.generation += 1;
        gate.accepting = false;
        lock(&self.readiness).take();
        self.frames.clear();
        self.ready.store(false, Ordering::SeqCst);
        self.sequence.store(0, Ordering::SeqCst);
    }

    /// Camera callback entry point.
    pub fn on_raw_video_frame(
        &self,
        output: &CameraOutput<'_>,
        extras: &ResultExtras,
        metadata: &FrameMetadata,
    ) {
        let generation = {
            let gate = lock(&self.gate);
            if !gate.accepting {
                log::trace!("Ignoring frame {} while disarmed", extras.frame_number);
                return;
            }
            gate.generation
        };

        let Some(plane) = output.planes.first() else {
            log::warn!("Dropping frame {} without image planes", extras.frame_number);
            return;
        };

        // Pose first: it must describe the instant the callback fired.
        let pose = self.transform.camera_pose();
        let previous = self.frames.load().map(|frame| frame.intrinsics);
        let intrinsics = match extras.intrinsics {
            Some(calibration) => Intrinsics::Captured(calibration),
            None => previous.unwrap_or_default(),
        };
        let sample = CameraFrameSample::from_plane(plane, 0);

        // Publish under the gate so a concurrent reset either runs first and
        // wins, or waits and clears this frame.
        let gate = lock(&self.gate);
        if !gate.accepting || gate.generation != generation {
            log::trace!("Discarding frame {} from a stopped capture", extras.frame_number);
            return;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.frames.store(FrameState {
            sample: CameraFrameSample { sequence, ..sample },
            intrinsics,
            pose,
        });

        if !self.ready.swap(true, Ordering::SeqCst) {
            log::info!(
                "First camera frame: {}x{} stride={} format={:?}",
                plane.width,
                plane.height,
                plane.stride,
                output.format
            );
        }
        if let Some(signal) = lock(&self.readiness).take() {
            signal.resolve(Readiness::Ready);
        }
        drop(gate);

        if let Intrinsics::Captured(calibration) = intrinsics {
            if previous != Some(intrinsics) {
                verbose!(self.verbose, "Camera intrinsics: {}", calibration);
            }
        }
        if self.verbose {
            log::debug!(
                "Frame #{} (vendor {}) ts={}ns exposure={:?} intrinsics={}",
                sequence,
                extras.frame_number,
                extras.timestamp_ns,
                metadata.exposure_time_ns,
                intrinsics.is_captured()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::PlaneInfo;
    use crate::provider::SharedTransform;
    use crate::types::{IntrinsicCalibration, OutputFormat, PoseSnapshot};
    use std::sync::Barrier;

    fn calibration() -> IntrinsicCalibration {
        IntrinsicCalibration {
            width: 4,
            height: 2,
            focal_length: [3.0, 3.0],
            principal_point: [2.0, 1.0],
            fov: 90.0,
            distortion: [0.0; 5],
        }
    }

    fn deliver(sampler: &FrameSampler, data: &[u8], intrinsics: Option<IntrinsicCalibration>) {
        let output = CameraOutput {
            format: OutputFormat::Yuv420_888,
            planes: vec![PlaneInfo::luma(data, 4, 2, 4)],
        };
        let extras = ResultExtras {
            intrinsics,
            ..Default::default()
        };
        sampler.on_raw_video_frame(&output, &extras, &FrameMetadata::default());
    }

    #[test]
    fn test_no_frame_until_first_callback() {
        let sampler = FrameSampler::new(Arc::new(SharedTransform::default()), false);
        assert!(!sampler.is_ready());
        assert!(sampler.latest().is_none());
    }

    #[test]
    fn test_disarmed_sampler_ignores_frames() {
        let sampler = FrameSampler::new(Arc::new(SharedTransform::default()), false);
        deliver(&sampler, &[1; 8], Some(calibration()));
        assert!(!sampler.is_ready());
        assert!(sampler.latest().is_none());
    }

    #[test]
    fn test_first_frame_resolves_readiness() {
        let sampler = FrameSampler::new(Arc::new(SharedTransform::default()), true);
        let (signal, mut rx) = ReadinessSignal::channel();
        sampler.arm(signal);

        deliver(&sampler, &[9; 8], None);
        assert!(sampler.is_ready());
        assert!(matches!(rx.try_recv(), Ok(Readiness::Ready)));
        assert_eq!(sampler.frame_count(), 1);
    }

    #[test]
    fn test_pose_is_taken_at_callback_time() {
        let transform = Arc::new(SharedTransform::default());
        let sampler = FrameSampler::new(transform.clone(), false);
        sampler.arm(ReadinessSignal::channel().0);

        transform.set(PoseSnapshot {
            position: [1.0, 0.0, 0.0],
            ..PoseSnapshot::IDENTITY
        });
        deliver(&sampler, &[1; 8], None);
        // Engine moves on after the frame was captured.
        transform.set(PoseSnapshot {
            position: [5.0, 0.0, 0.0],
            ..PoseSnapshot::IDENTITY
        });

        let frame = sampler.latest().unwrap();
        assert_eq!(frame.pose.position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_intrinsics_carry_forward() {
        let sampler = FrameSampler::new(Arc::new(SharedTransform::default()), false);
        sampler.arm(ReadinessSignal::channel().0);

        deliver(&sampler, &[1; 8], None);
        assert_eq!(sampler.latest().unwrap().intrinsics, Intrinsics::NotCaptured);

        deliver(&sampler, &[2; 8], Some(calibration()));
        deliver(&sampler, &[3; 8], None);
        let frame = sampler.latest().unwrap();
        assert_eq!(frame.sample.sequence, 3);
        assert_eq!(frame.intrinsics, Intrinsics::Captured(calibration()));
    }

    #[test]
    fn test_frame_without_planes_is_dropped() {
        let sampler = FrameSampler::new(Arc::new(SharedTransform::default()), false);
        sampler.arm(ReadinessSignal::channel().0);
        let output = CameraOutput {
            format: OutputFormat::Yuv420_888,
            planes: Vec::new(),
        };
        sampler.on_raw_video_frame(&output, &ResultExtras::default(), &FrameMetadata::default());
        assert!(!sampler.is_ready());
    }

    #[test]
    fn test_reset_clears_frame() {
        let sampler = FrameSampler::new(Arc::new(SharedTransform::default()), false);
        sampler.arm(ReadinessSignal::channel().0);
        deliver(&sampler, &[1; 8], None);

        sampler.reset();
        assert!(!sampler.is_ready());
        assert!(sampler.latest().is_none());
        deliver(&sampler, &[1; 8], None);
        assert!(sampler.latest().is_none());
    }

    #[test]
    fn test_verbose_sampler_publishes_calibration() {
        let _ = env_logger::builder().is_test(true).try_init();
        let sampler = FrameSampler::new(Arc::new(SharedTransform::default()), true);
        sampler.arm(ReadinessSignal::channel().0);

        deliver(&sampler, &[1; 8], Some(calibration()));
        deliver(&sampler, &[2; 8], Some(calibration()));
        let frame = sampler.latest().unwrap();
        assert_eq!(frame.intrinsics, Intrinsics::Captured(calibration()));
        assert_eq!(frame.sample.sequence, 2);
    }

    #[test]
    fn test_reset_discards_frame_in_flight() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let transform = {
            let entered = entered.clone();
            let release = release.clone();
            move || {
                entered.wait();
                release.wait();
                PoseSnapshot::IDENTITY
            }
        };
        let sampler = Arc::new(FrameSampler::new(Arc::new(transform), false));
        sampler.arm(ReadinessSignal::channel().0);

        let callback = {
            let sampler = sampler.clone();
            std::thread::spawn(move || deliver(&sampler, &[9; 8], Some(calibration())))
        };

        // Callback is past the arming check and blocked reading the pose.
        entered.wait();
        sampler.reset();
        release.wait();
        callback.join().unwrap();

        assert!(sampler.latest().is_none());
        assert!(!sampler.is_ready());
        assert_eq!(sampler.frame_count(), 0);
    }
}
