//! Side cache for encoded frames.
//!
//! Frame messages only carry a key; the bytes live here until the entry's
//! TTL runs out. Keys are write-once: setting an existing, unexpired key is
//! an error rather than an overwrite. A missing key is a normal answer for
//! readers that arrive after expiry.

mod memory;
mod redis_store;

pub use memory::MemoryBlobStore;
pub use redis_store::RedisBlobStore;

use async_trait::async_trait;
use std::{fmt, time::Duration};

use crate::error::BlobError;

#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    /// Stores `value` under `key` for `ttl`.
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), BlobError>;

    /// Returns the stored bytes, or `None` once the entry has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;
}

/// Expiry in whole seconds, never below one.
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_truncated_with_a_one_second_floor() {
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(2_900)), 2);
        assert_eq!(ttl_seconds(Duration::from_secs(180)), 180);
    }
}
