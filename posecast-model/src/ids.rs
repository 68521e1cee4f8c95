use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier handed back to the caller of `start`, one per job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StreamId(pub Uuid);

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamId {
    pub fn new() -> Self {
        StreamId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of an encoded frame in the blob cache.
///
/// Random (v4) rather than time ordered so that keys are not guessable from
/// the stream cadence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobKey(String);

impl Default for BlobKey {
    fn default() -> Self {
        Self::generate()
    }
}

impl BlobKey {
    pub fn generate() -> Self {
        BlobKey(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for BlobKey {
    fn from(value: String) -> Self {
        BlobKey(value)
    }
}

impl AsRef<str> for BlobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_ids_are_unique_per_call() {
        let a = StreamId::new();
        let b = StreamId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn blob_keys_serialize_as_plain_strings() {
        let key = BlobKey::from("abc".to_string());
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"abc\"");
    }

    #[test]
    fn generated_blob_keys_are_non_empty_and_distinct() {
        let a = BlobKey::generate();
        let b = BlobKey::generate();
        assert!(!a.as_str().is_empty());
        assert_ne!(a, b);
    }
}
