//! Streaming job lifecycle: the controller owning the single job slot, the
//! loop that runs a job, and the publisher emitting its frames.

mod controller;
mod job;
mod publisher;

pub use controller::{ControllerSettings, JobController, JobSnapshot};
pub use job::JobOutcome;
pub use publisher::{FramePublisher, PublishError};

use posecast_core::{PoseError, SourceError};
use posecast_model::{Resolution, StreamId};
use std::time::Duration;
use thiserror::Error;

/// Validated parameters of a `start` command.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub source: String,
    pub model: String,
    pub resolution: Resolution,
    pub upsample: f32,
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("A stream is already running ({0})")]
    AlreadyRunning(StreamId),

    #[error("Stream {id} did not stop within {grace:?}")]
    StopTimeout { id: StreamId, grace: Duration },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Pose(#[from] PoseError),

    #[error("stream setup task failed: {0}")]
    Task(String),
}

impl ControlError {
    /// Errors caused by another job holding the slot.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ControlError::AlreadyRunning(_) | ControlError::StopTimeout { .. }
        )
    }
}
