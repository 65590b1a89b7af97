use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use metalwerk_frame::FrameCompletion;

use crate::FrameSubmission;

/// Errors a command queue can report for a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("GPU device lost")]
    DeviceLost,
    #[error("queue rejected submission: {0}")]
    Rejected(String),
}

/// A rejected submission. The completion comes back untouched so the
/// caller can release the slot itself.
#[derive(Debug)]
pub struct SubmitFailure {
    pub error: QueueError,
    pub completion: FrameCompletion,
}

/// The externally-owned GPU queue, as seen by the renderer.
///
/// On success the queue owns `completion` and must signal it exactly once,
/// from any thread, after the GPU has finished reading the frame's slot.
/// On failure it must hand `completion` back unsignalled.
pub trait CommandQueue: Send {
    fn submit(
        &mut self,
        submission: FrameSubmission,
        completion: FrameCompletion,
    ) -> Result<(), SubmitFailure>;
}

/// Queue for hosts with no GPU: completes every frame during `submit`.
#[derive(Debug, Default)]
pub struct ImmediateQueue {
    submitted: Vec<FrameSubmission>,
}

impl ImmediateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> &[FrameSubmission] {
        &self.submitted
    }
}

impl CommandQueue for ImmediateQueue {
    fn submit(
        &mut self,
        submission: FrameSubmission,
        completion: FrameCompletion,
    ) -> Result<(), SubmitFailure> {
        self.submitted.push(submission);
        completion.signal();
        Ok(())
    }
}

/// Simulated GPU: a worker thread that "executes" each submission for a
/// fixed latency, then delivers its completion from that thread.
pub struct ThreadedQueue {
    sender: Option<Sender<(FrameSubmission, FrameCompletion)>>,
    worker: Option<JoinHandle<()>>,
    completed: Arc<Mutex<Vec<FrameSubmission>>>,
}

impl ThreadedQueue {
    pub fn new(latency: Duration) -> Self {
        let (sender, receiver) = mpsc::channel::<(FrameSubmission, FrameCompletion)>();
        let completed = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&completed);

        let worker = thread::Builder::new()
            .name("gpu-sim".into())
            .spawn(move || {
                for (submission, completion) in receiver {
                    thread::sleep(latency);
                    tracing::trace!(frame = submission.frame, "simulated GPU finished frame");
                    log.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(submission);
                    completion.signal();
                }
            })
            .ok();
        if worker.is_none() {
            tracing::warn!("failed to spawn simulated GPU thread; submissions will be rejected");
        }

        Self {
            sender: Some(sender),
            worker,
            completed,
        }
    }

    /// Submissions the worker has finished, in completion order.
    pub fn completed(&self) -> Vec<FrameSubmission> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandQueue for ThreadedQueue {
    fn submit(
        &mut self,
        submission: FrameSubmission,
        completion: FrameCompletion,
    ) -> Result<(), SubmitFailure> {
        let Some(sender) = self.sender.as_ref().filter(|_| self.worker.is_some()) else {
            return Err(SubmitFailure {
                error: QueueError::Rejected("simulated GPU thread is not running".into()),
                completion,
            });
        };
        sender.send((submission, completion)).map_err(|err| {
            let (_, completion) = err.0;
            SubmitFailure {
                error: QueueError::DeviceLost,
                completion,
            }
        })
    }
}

impl Drop for ThreadedQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish what it has and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DrawableSize, FrameUniforms};
    use metalwerk_frame::{FrameSynchronizer, SlotIndex};

    fn submission(frame: u64, slot: usize) -> FrameSubmission {
        FrameSubmission {
            frame,
            slot: SlotIndex(slot),
            uniforms: FrameUniforms::IDENTITY,
            drawable_size: DrawableSize::default(),
            clear_color: [0.0; 4],
        }
    }

    #[test]
    fn immediate_queue_completes_during_submit() {
        let sync = FrameSynchronizer::new(2).unwrap();
        let mut queue = ImmediateQueue::new();

        let token = sync.acquire(SlotIndex(0), 0);
        queue.submit(submission(0, 0), token).unwrap();

        assert_eq!(sync.available(), 2);
        assert_eq!(queue.submitted().len(), 1);
    }

    #[test]
    fn threaded_queue_completes_on_worker() {
        let sync = FrameSynchronizer::new(2).unwrap();
        let mut queue = ThreadedQueue::new(Duration::from_millis(5));

        for frame in 0..2u64 {
            let slot = SlotIndex(frame as usize);
            let token = sync.acquire(slot, frame);
            sync.mark_submitted(slot);
            queue.submit(submission(frame, slot.0), token).unwrap();
        }

        sync.wait_idle();
        let done: Vec<u64> = queue.completed().iter().map(|s| s.frame).collect();
        assert_eq!(done, vec![0, 1]);
    }

    #[test]
    fn dropping_threaded_queue_drains_pending_work() {
        let sync = FrameSynchronizer::new(1).unwrap();
        let mut queue = ThreadedQueue::new(Duration::from_millis(20));
        let token = sync.acquire(SlotIndex(0), 0);
        queue.submit(submission(0, 0), token).unwrap();

        drop(queue);
        assert_eq!(sync.available(), 1);
    }
}
