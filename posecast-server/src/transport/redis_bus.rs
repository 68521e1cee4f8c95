use async_trait::async_trait;
use futures::StreamExt;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::fmt;
use tracing::{debug, info};

use super::{InboundMessage, MessageBus, MessageStream, TransportError};

/// Redis pub/sub transport.
///
/// Publishes share one [`ConnectionManager`]; every subscription opens its
/// own pub/sub connection. Retained values are kept as plain string keys
/// named after the channel.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBus")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisBus {
    pub async fn connect(redis_url: &str) -> Result<Self, TransportError> {
        info!("Connecting to Redis pub/sub at {}", redis_url);

        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;

        info!("Redis pub/sub connected");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(
        &self,
        channel: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        debug!(channel, bytes = payload.len(), "PUBLISH");
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn publish_retained(
        &self,
        channel: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        debug!(channel, bytes = payload.len(), "PUBLISH (retained)");
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set(channel, payload.as_slice())
            .ignore()
            .publish(channel, payload.as_slice())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channels: &[String],
    ) -> Result<MessageStream, TransportError> {
        if channels.is_empty() {
            return Err(TransportError::NoChannels);
        }

        let mut pubsub = self.client.get_async_pubsub().await?;
        for channel in channels {
            pubsub.subscribe(channel.as_str()).await?;
            info!(channel = %channel, "subscribed");
        }

        let stream = pubsub.into_on_message().map(|msg| InboundMessage {
            channel: msg.get_channel_name().to_string(),
            payload: msg.get_payload_bytes().to_vec(),
        });
        Ok(stream.boxed())
    }
}
