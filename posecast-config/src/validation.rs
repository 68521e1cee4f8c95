use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::{
    constants::MAX_RECOMMENDED_BLOB_TTL,
    models::Config,
};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("blob TTL must be at least one second (got {0:?})")]
    BlobTtlTooShort(Duration),
    #[error("stop grace period must be greater than zero")]
    ZeroStopGrace,
    #[error("inference timeout must be greater than zero")]
    ZeroInferenceTimeout,
    #[error("model allow-list is empty; no stream could ever start")]
    EmptyModelAllowList,
    #[error("service name must not be empty or contain pub/sub wildcards")]
    InvalidServiceName,
    #[error("redis URL '{url}' is invalid: {reason}")]
    InvalidRedisUrl { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

/// Whether a channel name contains pub/sub pattern characters.
pub fn has_wildcard(channel: &str) -> bool {
    channel
        .chars()
        .any(|c| matches!(c, '*' | '?' | '[' | ']' | '#' | '+'))
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    let name = config.service.name.trim();
    if name.is_empty() || has_wildcard(name) {
        return Err(ConfigGuardRailError::InvalidServiceName);
    }

    validate_redis_url(&config.redis.url)?;

    let stream = &config.stream;
    if stream.blob_ttl < Duration::from_secs(1) {
        return Err(ConfigGuardRailError::BlobTtlTooShort(stream.blob_ttl));
    }
    if stream.blob_ttl.subsec_nanos() != 0 {
        warnings.push(format!(
            "blob TTL {:?} is truncated to whole seconds",
            stream.blob_ttl
        ));
    }
    if stream.blob_ttl > MAX_RECOMMENDED_BLOB_TTL {
        warnings.push_with_hint(
            format!(
                "blob TTL of {}s keeps every frame in the cache for a long time",
                stream.blob_ttl.as_secs()
            ),
            "Frames are only referenced briefly; a few minutes is usually enough",
        );
    }
    if stream.stop_grace.is_zero() {
        return Err(ConfigGuardRailError::ZeroStopGrace);
    }
    if stream.inference_timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroInferenceTimeout);
    }

    if config.models.allowed.is_empty() {
        return Err(ConfigGuardRailError::EmptyModelAllowList);
    }
    if !config.models.dir.is_dir() {
        warnings.push_with_hint(
            format!(
                "model directory {} does not exist",
                config.models.dir.display()
            ),
            "Set MODELS_DIR or [models].dir to the folder holding <model>.onnx files",
        );
    }

    Ok(warnings)
}

fn validate_redis_url(raw: &str) -> Result<(), ConfigGuardRailError> {
    let invalid = |reason: String| ConfigGuardRailError::InvalidRedisUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    match parsed.scheme() {
        "redis" | "rediss" | "redis+unix" | "unix" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
