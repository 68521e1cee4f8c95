use std::time::Duration;

pub const DEFAULT_SERVICE_NAME: &str = "tf-pose";
pub const DEFAULT_ERROR_CHANNEL: &str = "error";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

pub const DEFAULT_BLOB_TTL: Duration = Duration::from_secs(180);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MODELS_DIR: &str = "./models";
pub const DEFAULT_MODELS: &[&str] = &[
    "cmu",
    "mobilenet_thin",
    "mobilenet_v2_large",
    "mobilenet_v2_small",
];

/// Longest blob TTL accepted without a warning.
pub const MAX_RECOMMENDED_BLOB_TTL: Duration = Duration::from_secs(60 * 60);
