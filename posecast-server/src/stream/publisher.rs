use posecast_core::{BlobError, BlobStore, Frame, SourceError, encode_png};
use posecast_model::{BlobKey, FrameMessage, Human};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::debug;

use crate::transport::{MessageBus, TransportError};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] SourceError),

    #[error("failed to cache frame: {0}")]
    Blob(#[from] BlobError),

    #[error("failed to serialize frame message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish frame message: {0}")]
    Transport(#[from] TransportError),

    #[error("frame encoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Emits one result message per processed frame.
///
/// The encoded frame is committed to the blob cache before the message that
/// references it is published.
#[derive(Clone)]
pub struct FramePublisher {
    bus: Arc<dyn MessageBus>,
    blobs: Arc<dyn BlobStore>,
    channel: String,
    ttl: Duration,
}

impl fmt::Debug for FramePublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePublisher")
            .field("channel", &self.channel)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl FramePublisher {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        blobs: Arc<dyn BlobStore>,
        channel: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            bus,
            blobs,
            channel: channel.into(),
            ttl,
        }
    }

    pub async fn publish(
        &self,
        humans: Vec<Human>,
        frame: Frame,
    ) -> Result<BlobKey, PublishError> {
        let png = tokio::task::spawn_blocking(move || encode_png(&frame)).await??;

        let key = BlobKey::generate();
        self.blobs.set(key.as_str(), &png, self.ttl).await?;

        let message = FrameMessage {
            humans,
            image: key.clone(),
        };
        let payload = serde_json::to_vec(&message)?;
        self.bus.publish(&self.channel, payload).await?;

        debug!(
            channel = %self.channel,
            image = %key,
            humans = message.humans.len(),
            bytes = png.len(),
            "published frame"
        );
        Ok(key)
    }
}
