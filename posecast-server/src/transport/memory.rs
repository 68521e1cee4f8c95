use async_trait::async_trait;
use dashmap::DashMap;
use futures::{StreamExt, future};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::warn;

use super::{InboundMessage, MessageBus, MessageStream, TransportError};

const DEFAULT_CAPACITY: usize = 1024;

/// In-process bus with the same semantics as [`super::RedisBus`].
///
/// Every subscriber sees every message published after it subscribed on
/// one of its channels. Lagging subscribers skip what they missed.
#[derive(Debug)]
pub struct MemoryBus {
    tx: broadcast::Sender<InboundMessage>,
    retained: DashMap<String, Vec<u8>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            retained: DashMap::new(),
        }
    }

    pub fn retained(&self, channel: &str) -> Option<Vec<u8>> {
        self.retained.get(channel).map(|value| value.clone())
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(
        &self,
        channel: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        // No receivers is not an error; the message is simply dropped.
        let _ = self.tx.send(InboundMessage {
            channel: channel.to_string(),
            payload,
        });
        Ok(())
    }

    async fn publish_retained(
        &self,
        channel: &str,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.retained.insert(channel.to_string(), payload.clone());
        self.publish(channel, payload).await
    }

    async fn subscribe(
        &self,
        channels: &[String],
    ) -> Result<MessageStream, TransportError> {
        if channels.is_empty() {
            return Err(TransportError::NoChannels);
        }
        let wanted: HashSet<String> = channels.iter().cloned().collect();

        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(
            move |item| {
                let message = match item {
                    Ok(message) if wanted.contains(&message.channel) => {
                        Some(message)
                    }
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "memory bus subscriber lagged");
                        None
                    }
                };
                future::ready(message)
            },
        );
        Ok(stream.boxed())
    }
}
