pub mod sources;

use posecast_model::Resolution;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub redis: RedisConfig,
    pub stream: StreamConfig,
    pub models: ModelsConfig,
    pub metadata: ConfigMetadata,
}

/// Naming of the service and the channels derived from it.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub error_channel: String,
    /// Publish a retained `healthy`/`unhealthy` marker on connect/shutdown.
    pub health_marker: bool,
}

impl ServiceConfig {
    /// Inbound command channel; the bare service name.
    pub fn command_channel(&self) -> String {
        self.name.clone()
    }

    pub fn result_channel(&self) -> String {
        format!("{}/pose", self.name)
    }

    pub fn health_channel(&self) -> String {
        format!("{}/health", self.name)
    }

    pub fn status_channel(&self) -> String {
        format!("{}/status", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Expiry applied to every cached frame.
    pub blob_ttl: Duration,
    pub conflict_policy: ConflictPolicy,
    /// Upper bound on waiting for a replaced job to wind down.
    pub stop_grace: Duration,
    /// Upper bound on a single read + inference step.
    pub inference_timeout: Duration,
    /// Humans with fewer detected parts are dropped; 0 keeps everyone.
    pub min_body_parts: usize,
}

#[derive(Debug, Clone)]
pub struct ModelsConfig {
    pub dir: PathBuf,
    pub allowed: Vec<String>,
    pub default_resolution: Resolution,
}

impl ModelsConfig {
    pub fn is_allowed(&self, model: &str) -> bool {
        self.allowed.iter().any(|candidate| candidate == model)
    }
}

/// What `start` does while another job is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Refuse the new job and keep the running one.
    #[default]
    Reject,
    /// Cancel the running job, wait for it to exit, then start the new one.
    Replace,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(ConflictPolicy::Reject),
            "replace" => Ok(ConflictPolicy::Replace),
            other => Err(format!(
                "unknown conflict policy '{other}', expected reject or replace"
            )),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Reject => f.write_str("reject"),
            ConflictPolicy::Replace => f.write_str("replace"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
