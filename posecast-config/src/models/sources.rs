use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub service: FileServiceConfig,
    #[serde(default)]
    pub redis: FileRedisConfig,
    #[serde(default)]
    pub stream: FileStreamConfig,
    #[serde(default)]
    pub models: FileModelsConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_marker: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRedisConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Durations are humantime strings such as `"180s"` or `"2m"`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStreamConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_grace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_body_parts: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileModelsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_resolution: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub service_name: Option<String>,
    pub error_channel: Option<String>,
    pub health_marker: Option<bool>,
    pub redis_url: Option<String>,
    pub blob_ttl: Option<String>,
    pub conflict_policy: Option<String>,
    pub stop_grace: Option<String>,
    pub inference_timeout: Option<String>,
    pub min_body_parts: Option<usize>,
    pub models_dir: Option<PathBuf>,
    pub allowed_models: Option<Vec<String>>,
    pub default_resolution: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        let mut env_config = Self::default();

        env_config.config_path =
            std::env::var("POSECAST_CONFIG").ok().map(PathBuf::from);
        env_config.service_name = non_empty_var("POSECAST_SERVICE_NAME");
        env_config.error_channel = non_empty_var("POSECAST_ERROR_CHANNEL");
        env_config.health_marker = parse_bool_var("POSECAST_HEALTH_MARKER");
        env_config.redis_url = non_empty_var("REDIS_URL");

        env_config.blob_ttl = non_empty_var("BLOB_TTL");
        env_config.conflict_policy = non_empty_var("STREAM_CONFLICT_POLICY");
        env_config.stop_grace = non_empty_var("STREAM_STOP_GRACE");
        env_config.inference_timeout = non_empty_var("INFERENCE_TIMEOUT");
        env_config.min_body_parts = std::env::var("MIN_BODY_PARTS")
            .ok()
            .and_then(|s| s.trim().parse().ok());

        env_config.models_dir =
            std::env::var("MODELS_DIR").ok().map(PathBuf::from);
        env_config.allowed_models = parse_csv_var("ALLOWED_MODELS");
        env_config.default_resolution = non_empty_var("DEFAULT_RESOLUTION");

        env_config
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_csv_var(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| split_csv(&raw))
}

pub(crate) fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_bool_var(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|raw| parse_bool(&raw))
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_values_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            split_csv(" cmu, ,mobilenet_thin ,"),
            vec!["cmu".to_string(), "mobilenet_thin".to_string()]
        );
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn file_config_parses_partial_toml() {
        let parsed: FileConfig = toml::from_str(
            r#"
            [service]
            name = "pose-lab"

            [stream]
            blob_ttl = "90s"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.service.name.as_deref(), Some("pose-lab"));
        assert_eq!(parsed.stream.blob_ttl.as_deref(), Some("90s"));
        assert!(parsed.redis.url.is_none());
    }
}
