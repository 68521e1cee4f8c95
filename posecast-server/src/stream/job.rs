use posecast_core::{Frame, FrameSource, PoseAdapter, PoseError, SourceError};
use posecast_model::{Human, Resolution, StreamId, StreamState};
use std::{fmt, time::Duration};
use thiserror::Error;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::publisher::FramePublisher;

/// How a job's loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// The source ran out of frames.
    Completed { frames: u64 },
    /// Cancellation was observed.
    Stopped { frames: u64 },
    Failed { frames: u64, reason: String },
}

impl JobOutcome {
    pub fn frames(&self) -> u64 {
        match self {
            JobOutcome::Completed { frames }
            | JobOutcome::Stopped { frames }
            | JobOutcome::Failed { frames, .. } => *frames,
        }
    }

    pub fn state(&self) -> StreamState {
        match self {
            JobOutcome::Completed { .. } => StreamState::Completed,
            JobOutcome::Stopped { .. } => StreamState::Stopped,
            JobOutcome::Failed { .. } => StreamState::Failed,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            JobOutcome::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Pose(#[from] PoseError),
}

/// Everything the blocking side of an iteration owns.
struct Worker {
    source: Box<dyn FrameSource>,
    adapter: PoseAdapter,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("source", &self.source.describe())
            .field("adapter", &self.adapter)
            .finish()
    }
}

impl Worker {
    fn step(
        &mut self,
        target: Resolution,
        upsample: f32,
    ) -> Result<Option<(Vec<Human>, Frame)>, StepError> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(None);
        };
        let humans = self.adapter.infer(&frame, target, upsample)?;
        Ok(Some((humans, frame)))
    }
}

/// A prepared job: source opened, estimator loaded, nothing running yet.
pub(crate) struct Job {
    pub id: StreamId,
    worker: Worker,
    target: Resolution,
    upsample: f32,
    publisher: FramePublisher,
    inference_timeout: Duration,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("worker", &self.worker)
            .field("target", &self.target)
            .field("upsample", &self.upsample)
            .finish_non_exhaustive()
    }
}

impl Job {
    pub fn new(
        id: StreamId,
        source: Box<dyn FrameSource>,
        adapter: PoseAdapter,
        target: Resolution,
        upsample: f32,
        publisher: FramePublisher,
        inference_timeout: Duration,
    ) -> Self {
        Self {
            id,
            worker: Worker { source, adapter },
            target,
            upsample,
            publisher,
            inference_timeout,
        }
    }

    /// Pulls, infers and publishes until the source is exhausted, a step
    /// fails, or `cancel` fires.
    ///
    /// Cancellation is checked before every iteration and raced against the
    /// in-flight step. A frame whose step finished after cancellation is not
    /// published. On cancellation or an inference timeout the in-flight step
    /// is still awaited, so the source and estimator are dropped before this
    /// returns.
    pub async fn run(self, cancel: CancellationToken) -> JobOutcome {
        let Job {
            id,
            worker,
            target,
            upsample,
            publisher,
            inference_timeout,
        } = self;

        let mut frames = 0u64;
        let mut worker = worker;

        loop {
            if cancel.is_cancelled() {
                return JobOutcome::Stopped { frames };
            }

            let mut step = tokio::task::spawn_blocking(move || {
                let result = worker.step(target, upsample);
                (worker, result)
            });

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                joined = tokio::time::timeout(inference_timeout, &mut step) => {
                    Some(joined)
                }
            };
            let Some(joined) = joined else {
                debug!(stream_id = %id, "cancelled during in-flight step");
                release_in_flight(id, step).await;
                return JobOutcome::Stopped { frames };
            };

            let (returned, result) = match joined {
                Ok(Ok(parts)) => parts,
                Ok(Err(join_err)) => {
                    return JobOutcome::Failed {
                        frames,
                        reason: format!("frame task failed: {join_err}"),
                    };
                }
                Err(_) => {
                    warn!(
                        stream_id = %id,
                        timeout = ?inference_timeout,
                        "frame step exceeded the inference timeout"
                    );
                    // Marks the job as stopping while the step drains.
                    cancel.cancel();
                    release_in_flight(id, step).await;
                    return JobOutcome::Failed {
                        frames,
                        reason: format!(
                            "inference timed out after {inference_timeout:?}"
                        ),
                    };
                }
            };
            worker = returned;

            let (humans, frame) = match result {
                Ok(Some(output)) => output,
                Ok(None) => {
                    info!(stream_id = %id, frames, "source exhausted");
                    return JobOutcome::Completed { frames };
                }
                Err(err) => {
                    warn!(stream_id = %id, error = %err, "stream step failed");
                    return JobOutcome::Failed {
                        frames,
                        reason: err.to_string(),
                    };
                }
            };

            if cancel.is_cancelled() {
                return JobOutcome::Stopped { frames };
            }

            if let Err(err) = publisher.publish(humans, frame).await {
                warn!(stream_id = %id, error = %err, "failed to publish frame");
                return JobOutcome::Failed {
                    frames,
                    reason: err.to_string(),
                };
            }
            frames += 1;
        }
    }
}

/// Waits out a step that is still running on the blocking pool. Its frame
/// is discarded along with the worker it hands back.
async fn release_in_flight<T>(id: StreamId, step: JoinHandle<T>) {
    let started = Instant::now();
    if let Err(err) = step.await {
        warn!(stream_id = %id, error = %err, "in-flight frame task failed");
    }
    debug!(
        stream_id = %id,
        waited = ?started.elapsed(),
        "in-flight step released its source"
    );
}
