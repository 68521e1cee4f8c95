use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob '{0}' already exists; entries are immutable until they expire")]
    KeyExists(String),

    #[error("redis blob store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("blob '{key}' is not valid base64")]
    Decode {
        key: String,
        #[source]
        source: base64::DecodeError,
    },
}

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("pose backend unavailable: {0}")]
    Backend(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("frame rejected by estimator: {0}")]
    InvalidFrame(String),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("no images found in {}", .0.display())]
    Empty(PathBuf),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("frame buffer of {len} bytes does not match {width}x{height} RGB")]
    InvalidFrame { width: u32, height: u32, len: usize },

    #[error("failed to encode frame: {0}")]
    Encode(#[source] image::ImageError),

    #[error("unsupported source '{0}'")]
    Unsupported(String),

    #[error("video error: {0}")]
    Video(String),
}
