use std::sync::Arc;

use metalwerk_frame::{FramePool, FrameSynchronizer, SlotIndex, SlotState};

use crate::{
    CameraState, CommandQueue, DrawableSize, FramePhase, FrameReport, FrameSubmission,
    FrameUniforms, RenderError, RendererConfig, SubmitFailure,
};

/// Capability to turn the current camera state into one submitted frame.
///
/// The host calls `produce_frame` once per display refresh and `resize`
/// whenever its drawable changes size.
pub trait FrameProducer {
    /// Acquire a slot, compute matrices, submit. May block while the GPU is
    /// behind.
    fn produce_frame(&mut self, camera: &CameraState) -> Result<FrameReport, RenderError>;

    /// Record a new drawable size. Frames already submitted are unaffected.
    fn resize(&mut self, width: u32, height: u32);

    fn drawable_size(&self) -> DrawableSize;
}

/// Production renderer: bounded frames in flight over a host-owned queue.
pub struct Renderer<Q: CommandQueue> {
    config: RendererConfig,
    queue: Q,
    sync: Arc<FrameSynchronizer>,
    slots: FramePool<FrameUniforms>,
    drawable: DrawableSize,
    next_frame: u64,
}

impl<Q: CommandQueue> Renderer<Q> {
    pub fn new(config: RendererConfig, queue: Q) -> Result<Self, RenderError> {
        config.validate()?;
        let sync = FrameSynchronizer::new(config.buffer_count)?;
        let slots = FramePool::new(config.buffer_count, |_| FrameUniforms::IDENTITY)?;
        tracing::info!(
            buffer_count = config.buffer_count,
            width = config.drawable_size.width,
            height = config.drawable_size.height,
            "renderer created"
        );
        Ok(Self {
            drawable: config.drawable_size,
            config,
            queue,
            sync,
            slots,
            next_frame: 0,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn synchronizer(&self) -> &Arc<FrameSynchronizer> {
        &self.sync
    }

    /// Frames submitted but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.sync.capacity() - self.sync.available()
    }

    /// Frames produced so far, including failed ones.
    pub fn frames_produced(&self) -> u64 {
        self.next_frame
    }

    /// The uniforms most recently written into `slot`.
    pub fn slot_uniforms(&self, slot: SlotIndex) -> &FrameUniforms {
        self.slots.get(slot)
    }

    /// Where `frame` currently is, judged from the slot it occupies.
    pub fn phase_of(&self, frame: u64) -> FramePhase {
        if frame >= self.next_frame {
            return FramePhase::Idle;
        }
        for (slot, _) in self.slots.iter() {
            match self.sync.slot_state(slot) {
                SlotState::Acquired { frame: f } if f == frame => return FramePhase::SlotAcquired,
                SlotState::Submitted { frame: f } if f == frame => return FramePhase::Submitted,
                _ => {}
            }
        }
        FramePhase::Completed
    }

    /// Wait for every in-flight frame to complete, then hand the queue back.
    pub fn shutdown(self) -> Q {
        tracing::debug!(in_flight = self.in_flight(), "draining frames before shutdown");
        self.sync.wait_idle();
        tracing::info!(frames = self.next_frame, "renderer shut down");
        self.queue
    }
}

impl<Q: CommandQueue> FrameProducer for Renderer<Q> {
    fn produce_frame(&mut self, camera: &CameraState) -> Result<FrameReport, RenderError> {
        let frame = self.next_frame;
        self.next_frame += 1;
        let _span = tracing::debug_span!("frame", frame).entered();

        let slot = self.slots.next_slot();
        let completion = self.sync.acquire(slot, frame);
        tracing::trace!(%slot, phase = ?FramePhase::SlotAcquired);

        // Aspect is read every frame since a resize may have landed since the last one.
        let drawable = self.drawable;
        let uniforms = match FrameUniforms::compute(&self.config, drawable, camera) {
            Ok(uniforms) => uniforms,
            Err(err) => {
                completion.signal();
                return Err(err.into());
            }
        };
        *self.slots.get_mut(slot) = uniforms;
        tracing::trace!(%slot, phase = ?FramePhase::MatricesComputed);

        let submission = FrameSubmission {
            frame,
            slot,
            uniforms,
            drawable_size: drawable,
            clear_color: self.config.clear_color,
        };
        self.sync.mark_submitted(slot);
        match self.queue.submit(submission, completion) {
            Ok(()) => {
                tracing::trace!(%slot, phase = ?FramePhase::Submitted);
                Ok(FrameReport {
                    frame,
                    slot,
                    aspect: drawable.aspect(),
                    uniforms,
                })
            }
            Err(SubmitFailure { error, completion }) => {
                tracing::warn!(%slot, %error, "frame submission failed, releasing slot");
                completion.signal();
                Err(RenderError::Submission {
                    frame,
                    source: error,
                })
            }
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.drawable = DrawableSize::new(width, height);
        tracing::debug!(width, height, aspect = self.drawable.aspect(), "drawable resized");
    }

    fn drawable_size(&self) -> DrawableSize {
        self.drawable
    }
}

/// GPU-less frame producer for tests and diagnostics.
///
/// Computes the same uniforms as [`Renderer`] and records them instead of
/// submitting. Every frame completes immediately on slot 0.
#[derive(Debug, Default)]
pub struct DebugFrameProducer {
    config: RendererConfig,
    drawable: DrawableSize,
    frames: Vec<FrameReport>,
}

impl DebugFrameProducer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            drawable: config.drawable_size,
            config,
            frames: Vec::new(),
        }
    }

    pub fn frames(&self) -> &[FrameReport] {
        &self.frames
    }

    /// Human-readable dump of the most recent frame.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "=== Frames: {} (drawable {}x{}) ===\n",
            self.frames.len(),
            self.drawable.width,
            self.drawable.height
        );
        if let Some(last) = self.frames.last() {
            out.push_str(&format!(
                "frame={} slot={} aspect={:.3}\n",
                last.frame, last.slot, last.aspect
            ));
            for (name, m) in [
                ("projection", last.uniforms.projection),
                ("model_view", last.uniforms.model_view),
            ] {
                out.push_str(&format!("{name}:\n"));
                for row in 0..4 {
                    out.push_str(&format!(
                        "  [{:8.4} {:8.4} {:8.4} {:8.4}]\n",
                        m[0][row], m[1][row], m[2][row], m[3][row]
                    ));
                }
            }
        }
        out
    }
}

impl FrameProducer for DebugFrameProducer {
    fn produce_frame(&mut self, camera: &CameraState) -> Result<FrameReport, RenderError> {
        let uniforms = FrameUniforms::compute(&self.config, self.drawable, camera)?;
        let report = FrameReport {
            frame: self.frames.len() as u64,
            slot: SlotIndex(0),
            aspect: self.drawable.aspect(),
            uniforms,
        };
        self.frames.push(report.clone());
        Ok(report)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.drawable = DrawableSize::new(width, height);
    }

    fn drawable_size(&self) -> DrawableSize {
        self.drawable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImmediateQueue, QueueError, ThreadedQueue};
    use glam::Vec3;
    use metalwerk_frame::FrameCompletion;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::thread;
    use std::time::Duration;

    const SHORT: Duration = Duration::from_millis(100);
    const LONG: Duration = Duration::from_secs(5);

    /// Queue whose completions are delivered by the test, whenever it likes.
    struct ManualQueue {
        pending: Sender<(FrameSubmission, FrameCompletion)>,
    }

    impl ManualQueue {
        fn new() -> (Self, Receiver<(FrameSubmission, FrameCompletion)>) {
            let (tx, rx) = mpsc::channel();
            (Self { pending: tx }, rx)
        }
    }

    impl CommandQueue for ManualQueue {
        fn submit(
            &mut self,
            submission: FrameSubmission,
            completion: FrameCompletion,
        ) -> Result<(), SubmitFailure> {
            self.pending.send((submission, completion)).map_err(|err| SubmitFailure {
                error: QueueError::DeviceLost,
                completion: err.0.1,
            })
        }
    }

    /// Queue that has lost its device.
    struct LostDeviceQueue;

    impl CommandQueue for LostDeviceQueue {
        fn submit(
            &mut self,
            _submission: FrameSubmission,
            completion: FrameCompletion,
        ) -> Result<(), SubmitFailure> {
            Err(SubmitFailure {
                error: QueueError::DeviceLost,
                completion,
            })
        }
    }

    fn config(buffer_count: usize, width: u32, height: u32) -> RendererConfig {
        RendererConfig {
            buffer_count,
            drawable_size: DrawableSize::new(width, height),
            ..RendererConfig::default()
        }
    }

    #[test]
    fn frames_rotate_through_slots() {
        let mut renderer = Renderer::new(config(3, 800, 600), ImmediateQueue::new()).unwrap();
        let camera = CameraState::default();

        let slots: Vec<usize> = (0..5)
            .map(|_| renderer.produce_frame(&camera).unwrap().slot.0)
            .collect();

        assert_eq!(slots, vec![0, 1, 2, 0, 1]);
        assert_eq!(renderer.in_flight(), 0);
        assert_eq!(renderer.queue().submitted().len(), 5);
        assert_eq!(renderer.phase_of(4), FramePhase::Completed);
        assert_eq!(renderer.phase_of(5), FramePhase::Idle);
    }

    #[test]
    fn submitted_frames_stay_in_flight_until_completed() {
        let (queue, pending) = ManualQueue::new();
        let mut renderer = Renderer::new(config(2, 800, 600), queue).unwrap();

        let report = renderer.produce_frame(&CameraState::default()).unwrap();
        assert_eq!(renderer.in_flight(), 1);
        assert_eq!(renderer.phase_of(report.frame), FramePhase::Submitted);

        let (submission, completion) = pending.recv().unwrap();
        assert_eq!(submission.frame, report.frame);
        assert_eq!(submission.slot, report.slot);
        completion.signal();

        assert_eq!(renderer.in_flight(), 0);
        assert_eq!(renderer.phase_of(report.frame), FramePhase::Completed);
    }

    #[test]
    fn production_blocks_when_all_slots_are_in_flight() {
        let (queue, pending) = ManualQueue::new();
        let mut renderer = Renderer::new(config(2, 800, 600), queue).unwrap();
        let (produced_tx, produced) = mpsc::channel();

        let producer = thread::spawn(move || {
            let camera = CameraState::default();
            for _ in 0..5 {
                let report = renderer.produce_frame(&camera).unwrap();
                produced_tx.send(report.frame).unwrap();
            }
            renderer
        });

        assert_eq!(produced.recv_timeout(LONG).unwrap(), 0);
        assert_eq!(produced.recv_timeout(LONG).unwrap(), 1);
        assert!(produced.recv_timeout(SHORT).is_err(), "third frame must wait for the GPU");

        let (first, done) = pending.recv_timeout(LONG).unwrap();
        assert_eq!(first.frame, 0);
        done.signal();

        assert_eq!(produced.recv_timeout(LONG).unwrap(), 2);
        assert!(produced.recv_timeout(SHORT).is_err(), "one release admits one frame");

        // Complete the rest as they arrive.
        for _ in 1..5 {
            let (_, done) = pending.recv_timeout(LONG).unwrap();
            done.signal();
        }
        let renderer = producer.join().unwrap();
        let frames: Vec<u64> = produced.try_iter().collect();
        assert_eq!(frames, vec![3, 4]);
        assert_eq!(renderer.in_flight(), 0);
    }

    #[test]
    fn resize_only_affects_later_frames() {
        let (queue, pending) = ManualQueue::new();
        let mut renderer = Renderer::new(config(3, 100, 100), queue).unwrap();
        let camera = CameraState::default();

        let before = renderer.produce_frame(&camera).unwrap();
        renderer.resize(178, 100);
        let after = renderer.produce_frame(&camera).unwrap();

        assert_eq!(before.aspect, 1.0);
        assert!((after.aspect - 1.78).abs() < 1e-6);

        let (first, c0) = pending.recv().unwrap();
        let (second, c1) = pending.recv().unwrap();
        assert_eq!(first.uniforms, before.uniforms);
        assert_eq!(renderer.slot_uniforms(first.slot), &before.uniforms);

        let sx_before = first.uniforms.projection().x_axis.x;
        let sx_after = second.uniforms.projection().x_axis.x;
        assert!((sx_before / sx_after - 1.78).abs() < 1e-4);
        assert_eq!(second.drawable_size, DrawableSize::new(178, 100));

        c0.signal();
        c1.signal();
    }

    #[test]
    fn submission_failure_releases_slot() {
        let mut renderer = Renderer::new(config(2, 800, 600), LostDeviceQueue).unwrap();
        let camera = CameraState::default();

        // More failures than slots: a leaked permit would deadlock here.
        for frame in 0..5u64 {
            let err = renderer.produce_frame(&camera).unwrap_err();
            assert!(matches!(
                err,
                RenderError::Submission { frame: f, source: QueueError::DeviceLost } if f == frame
            ));
            assert_eq!(renderer.in_flight(), 0);
        }
        assert_eq!(renderer.synchronizer().completed_frames(), 5);
    }

    #[test]
    fn invalid_camera_releases_slot() {
        let mut renderer = Renderer::new(config(1, 800, 600), ImmediateQueue::new()).unwrap();
        let bad = CameraState {
            axis: Vec3::new(0.0, 0.0, 0.0),
            ..CameraState::default()
        };
        assert!(matches!(renderer.produce_frame(&bad), Err(RenderError::Math(_))));
        assert_eq!(renderer.in_flight(), 0);
        assert!(renderer.produce_frame(&CameraState::default()).is_ok());
    }

    #[test]
    fn shutdown_drains_threaded_queue() {
        let queue = ThreadedQueue::new(Duration::from_millis(2));
        let mut renderer = Renderer::new(config(3, 640, 480), queue).unwrap();
        let mut camera = CameraState::default();
        for _ in 0..10 {
            renderer.produce_frame(&camera).unwrap();
            camera.advance(0.01);
        }
        let queue = renderer.shutdown();
        assert_eq!(queue.completed().len(), 10);
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(matches!(
            Renderer::new(config(0, 800, 600), ImmediateQueue::new()),
            Err(RenderError::Config(_))
        ));
    }

    #[test]
    fn debug_producer_matches_renderer() {
        let cfg = config(2, 1280, 720);
        let mut debug = DebugFrameProducer::new(cfg.clone());
        let mut renderer = Renderer::new(cfg, ImmediateQueue::new()).unwrap();
        let camera = CameraState {
            angle_radians: 0.4,
            ..CameraState::default()
        };

        let a = debug.produce_frame(&camera).unwrap();
        let b = renderer.produce_frame(&camera).unwrap();
        assert_eq!(a.uniforms, b.uniforms);
        assert_eq!(debug.frames().len(), 1);
    }

    #[test]
    fn debug_producer_describes_last_frame() {
        let mut debug = DebugFrameProducer::new(RendererConfig::default());
        assert!(debug.describe().contains("Frames: 0"));

        debug.resize(300, 150);
        debug.produce_frame(&CameraState::default()).unwrap();
        let text = debug.describe();
        assert!(text.contains("Frames: 1"));
        assert!(text.contains("aspect=2.000"));
        assert!(text.contains("projection:"));
    }

    #[test]
    fn producers_are_interchangeable() {
        fn run(producer: &mut dyn FrameProducer) -> Vec<u64> {
            producer.resize(400, 200);
            (0..3)
                .map(|_| producer.produce_frame(&CameraState::default()).unwrap().frame)
                .collect()
        }

        let mut debug = DebugFrameProducer::new(RendererConfig::default());
        let mut renderer = Renderer::new(RendererConfig::default(), ImmediateQueue::new()).unwrap();
        assert_eq!(run(&mut debug), vec![0, 1, 2]);
        assert_eq!(run(&mut renderer), vec![0, 1, 2]);
        assert_eq!(renderer.drawable_size(), DrawableSize::new(400, 200));
    }
}
