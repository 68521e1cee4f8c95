use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use redis::{AsyncCommands, aio::ConnectionManager};
use std::{fmt, time::Duration};
use tracing::{debug, info};

use super::{BlobStore, ttl_seconds};
use crate::error::BlobError;

/// Blob cache backed by Redis string keys with `EX` expiry.
///
/// Values are stored base64 encoded so any Redis client can read them back
/// as text.
#[derive(Clone)]
pub struct RedisBlobStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBlobStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisBlobStore {
    pub async fn connect(redis_url: &str) -> Result<Self, BlobError> {
        info!("Connecting blob store to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("Blob store connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl BlobStore for RedisBlobStore {
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), BlobError> {
        let secs = ttl_seconds(ttl);
        debug!(key, bytes = value.len(), ttl_secs = secs, "Blob SET");

        let mut conn = self.conn.clone();
        let stored: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(STANDARD.encode(value))
            .arg("NX")
            .arg("EX")
            .arg(secs)
            .query_async(&mut conn)
            .await?;

        match stored {
            Some(_) => Ok(()),
            None => Err(BlobError::KeyExists(key.to_string())),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(key).await?;

        match data {
            Some(encoded) => {
                debug!(key, "Blob HIT");
                let bytes = STANDARD.decode(encoded.as_bytes()).map_err(
                    |source| BlobError::Decode {
                        key: key.to_string(),
                        source,
                    },
                )?;
                Ok(Some(bytes))
            }
            None => {
                debug!(key, "Blob MISS");
                Ok(None)
            }
        }
    }
}
