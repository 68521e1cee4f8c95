use chrono::{DateTime, Utc};
use posecast_config::{Config, ConflictPolicy};
use posecast_core::{EstimatorFactory, PoseAdapter, SourceOpener};
use posecast_model::{StreamId, StreamState, StreamStatusEvent};
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    ControlError, StartRequest,
    job::{Job, JobOutcome},
    publisher::FramePublisher,
};
use crate::transport::MessageBus;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub conflict_policy: ConflictPolicy,
    pub stop_grace: Duration,
    pub inference_timeout: Duration,
    pub min_body_parts: usize,
    pub status_channel: String,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            conflict_policy: config.stream.conflict_policy,
            stop_grace: config.stream.stop_grace,
            inference_timeout: config.stream.inference_timeout,
            min_body_parts: config.stream.min_body_parts,
            status_channel: config.service.status_channel(),
        }
    }
}

/// Read model of the job currently holding the slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: StreamId,
    pub source: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    /// Cancellation was requested but the loop has not exited yet.
    pub stopping: bool,
}

struct ActiveJob {
    id: StreamId,
    source: String,
    model: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl ActiveJob {
    /// The loop has exited, or its task is gone.
    fn is_finished(&self) -> bool {
        *self.done.borrow() || self.done.has_changed().is_err()
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            source: self.source.clone(),
            model: self.model.clone(),
            started_at: self.started_at,
            stopping: self.cancel.is_cancelled(),
        }
    }
}

/// Owns the single streaming job slot.
///
/// `start` holds the slot lock from the conflict check until the new loop
/// is registered, so two concurrent starts can never both spawn a loop. A
/// finishing loop signals `done` once its source and estimator are dropped,
/// before it reports its final status and before it takes the lock to clear
/// itself, which lets a replacing `start` wait for it while holding the lock.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<ControllerInner>,
}

impl fmt::Debug for JobController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self
            .inner
            .slot
            .try_lock()
            .ok()
            .map(|guard| guard.as_ref().map(|job| job.id));

        f.debug_struct("JobController")
            .field("settings", &self.inner.settings)
            .field("active", &active)
            .field("publisher", &self.inner.publisher)
            .field("sources", &self.inner.sources)
            .field("estimators", &self.inner.estimators)
            .finish()
    }
}

struct ControllerInner {
    settings: ControllerSettings,
    bus: Arc<dyn MessageBus>,
    publisher: FramePublisher,
    sources: Arc<dyn SourceOpener>,
    estimators: Arc<dyn EstimatorFactory>,
    slot: Mutex<Option<ActiveJob>>,
}

impl JobController {
    pub fn new(
        settings: ControllerSettings,
        bus: Arc<dyn MessageBus>,
        publisher: FramePublisher,
        sources: Arc<dyn SourceOpener>,
        estimators: Arc<dyn EstimatorFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                settings,
                bus,
                publisher,
                sources,
                estimators,
                slot: Mutex::new(None),
            }),
        }
    }

    /// Opens the source, loads the estimator and spawns the loop.
    ///
    /// Returns once the loop is scheduled. Source and model failures are
    /// returned here rather than reported by the loop.
    pub async fn start(
        &self,
        request: StartRequest,
    ) -> Result<StreamId, ControlError> {
        let settings = &self.inner.settings;
        let mut slot = self.inner.slot.lock().await;

        if let Some(active) = slot.as_ref().filter(|job| !job.is_finished()) {
            let stopping = active.cancel.is_cancelled();
            if !stopping && settings.conflict_policy == ConflictPolicy::Reject
            {
                return Err(ControlError::AlreadyRunning(active.id));
            }

            if !stopping {
                info!(stream_id = %active.id, "replacing running stream");
                active.cancel.cancel();
            }
            let grace = settings.stop_grace;
            if !wait_finished(active.done.clone(), grace).await {
                warn!(
                    stream_id = %active.id,
                    ?grace,
                    "previous stream did not exit in time"
                );
                return Err(ControlError::StopTimeout {
                    id: active.id,
                    grace,
                });
            }
        }

        let id = StreamId::new();
        let sources = Arc::clone(&self.inner.sources);
        let estimators = Arc::clone(&self.inner.estimators);
        let min_body_parts = settings.min_body_parts;
        let prepare = request.clone();
        let (source, adapter) = tokio::task::spawn_blocking(
            move || -> Result<_, ControlError> {
                let source = sources.open(&prepare.source)?;
                let estimator =
                    estimators.load(&prepare.model, prepare.resolution)?;
                let adapter = PoseAdapter::new(estimator)
                    .with_min_body_parts(min_body_parts);
                Ok((source, adapter))
            },
        )
        .await
        .map_err(|err| ControlError::Task(err.to_string()))??;

        let job = Job::new(
            id,
            source,
            adapter,
            request.resolution,
            request.upsample,
            self.inner.publisher.clone(),
            settings.inference_timeout,
        );

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        *slot = Some(ActiveJob {
            id,
            source: request.source.clone(),
            model: request.model.clone(),
            started_at: Utc::now(),
            cancel: cancel.clone(),
            done: done_rx,
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner
                .report(StreamStatusEvent::new(id, StreamState::Running, 0))
                .await;

            let outcome = job.run(cancel).await;
            log_outcome(id, &outcome);
            let _ = done_tx.send(true);

            let mut event =
                StreamStatusEvent::new(id, outcome.state(), outcome.frames());
            if let Some(reason) = outcome.reason() {
                event = event.with_reason(reason);
            }
            inner.report(event).await;

            let mut slot = inner.slot.lock().await;
            if slot.as_ref().is_some_and(|job| job.id == id) {
                *slot = None;
            }
        });

        info!(
            stream_id = %id,
            source = %request.source,
            model = %request.model,
            resolution = %request.resolution,
            upsample = request.upsample,
            "stream started"
        );
        Ok(id)
    }

    /// Requests cancellation of the running job without waiting for it.
    ///
    /// Returns the id of the job that was signalled; calling it again, or
    /// with nothing running, is a no-op.
    pub async fn stop(&self) -> Option<StreamId> {
        let slot = self.inner.slot.lock().await;
        let active = slot.as_ref().filter(|job| !job.is_finished())?;
        if active.cancel.is_cancelled() {
            return None;
        }
        active.cancel.cancel();
        info!(stream_id = %active.id, "stream stop requested");
        Some(active.id)
    }

    /// Resolves once the job holding the slot, if any, has exited.
    pub async fn await_stopped(&self) {
        let done = {
            let slot = self.inner.slot.lock().await;
            slot.as_ref().map(|job| job.done.clone())
        };
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Stops the running job and waits up to `grace` for it to exit.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.stop().await;
        let stopped = tokio::time::timeout(grace, self.await_stopped())
            .await
            .is_ok();
        if !stopped {
            warn!(?grace, "stream did not stop before shutdown");
        }
        stopped
    }

    pub async fn snapshot(&self) -> Option<JobSnapshot> {
        let slot = self.inner.slot.lock().await;
        slot.as_ref()
            .filter(|job| !job.is_finished())
            .map(ActiveJob::snapshot)
    }

    pub async fn is_running(&self) -> bool {
        self.snapshot().await.is_some()
    }
}

impl ControllerInner {
    async fn report(&self, event: StreamStatusEvent) {
        let channel = &self.settings.status_channel;
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize status event");
                return;
            }
        };
        if let Err(err) = self.bus.publish(channel, payload).await {
            warn!(
                channel = %channel,
                stream_id = %event.stream_id,
                error = %err,
                "failed to publish status event"
            );
        }
    }
}

async fn wait_finished(mut done: watch::Receiver<bool>, grace: Duration) -> bool {
    // A closed channel means the job task is gone, which counts as finished.
    tokio::time::timeout(grace, done.wait_for(|finished| *finished))
        .await
        .is_ok()
}

fn log_outcome(id: StreamId, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed { frames } => {
            info!(stream_id = %id, frames, "stream completed");
        }
        JobOutcome::Stopped { frames } => {
            info!(stream_id = %id, frames, "stream stopped");
        }
        JobOutcome::Failed { frames, reason } => {
            warn!(stream_id = %id, frames, %reason, "stream failed");
        }
    }
    debug!(stream_id = %id, "releasing stream slot");
}
