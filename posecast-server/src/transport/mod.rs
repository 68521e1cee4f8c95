//! Message-level pub/sub contract used by the dispatcher and the job loop.
//!
//! Only publish, retained publish and subscribe are needed. Connection
//! handling, reconnects and delivery guarantees belong to the backend.

mod memory;
mod redis_bus;

pub use memory::MemoryBus;
pub use redis_bus::RedisBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

pub type MessageStream = BoxStream<'static, InboundMessage>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("redis transport error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("no channels to subscribe to")]
    NoChannels,
}

#[async_trait]
pub trait MessageBus: Send + Sync + fmt::Debug {
    async fn publish(
        &self,
        channel: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Publishes and keeps `payload` as the channel's last known value.
    async fn publish_retained(
        &self,
        channel: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    async fn subscribe(
        &self,
        channels: &[String],
    ) -> Result<MessageStream, TransportError>;
}
