pub mod error;

use once_cell::sync::Lazy;
use posecast_model::Resolution;
use std::{
    fs,
    path::PathBuf,
    time::Duration,
};
use tracing::debug;

use crate::{
    constants::{
        DEFAULT_BLOB_TTL, DEFAULT_ERROR_CHANNEL, DEFAULT_INFERENCE_TIMEOUT,
        DEFAULT_MODELS, DEFAULT_MODELS_DIR, DEFAULT_REDIS_URL,
        DEFAULT_SERVICE_NAME, DEFAULT_STOP_GRACE,
    },
    models::{
        Config, ConfigMetadata, ConflictPolicy, ModelsConfig, RedisConfig,
        ServiceConfig, StreamConfig,
        sources::{EnvConfig, FileConfig},
    },
    validation::{self, ConfigWarnings},
};
use error::ConfigLoadError;

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("posecast.toml"),
        PathBuf::from("config/posecast.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
struct ConfigLoaderOptions {
    config_path: Option<PathBuf>,
    /// Skip `.env` handling entirely.
    skip_env_file: bool,
    /// Use these values instead of reading the process environment.
    env_override: Option<EnvConfig>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn without_env_file(mut self) -> Self {
        self.options.skip_env_file = true;
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env_override = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;

        let env_config = self
            .options
            .env_override
            .clone()
            .unwrap_or_else(EnvConfig::gather);

        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let mut warnings = ConfigWarnings::default();
        if config_path.is_none() {
            warnings.push_with_hint(
                "No posecast.toml detected; using environment variables and defaults",
                "Create posecast.toml or point POSECAST_CONFIG at a config file",
            );
        }

        let metadata = ConfigMetadata {
            config_path,
            env_file_loaded,
        };
        let config = compose_config(file_config, env_config, metadata)?;

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        if self.options.skip_env_file {
            return Ok(false);
        }
        match dotenvy::dotenv() {
            Ok(_) => Ok(true),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(FileConfig, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env_config.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(path) => path.clone(),
                None => return Ok((FileConfig::default(), None)),
            },
        };

        debug!(path = %path.display(), "reading configuration file");
        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

        Ok((file_config, Some(path)))
    }
}

/// Merges file and environment values; the environment wins.
fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        service: file_service,
        redis: file_redis,
        stream: file_stream,
        models: file_models,
    } = file;

    let service = ServiceConfig {
        name: env
            .service_name
            .or(file_service.name)
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        error_channel: env
            .error_channel
            .or(file_service.error_channel)
            .unwrap_or_else(|| DEFAULT_ERROR_CHANNEL.to_string()),
        health_marker: env
            .health_marker
            .or(file_service.health_marker)
            .unwrap_or(true),
    };

    let redis = RedisConfig {
        url: env
            .redis_url
            .or(file_redis.url)
            .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
    };

    let conflict_policy = match env.conflict_policy.or(file_stream.conflict_policy)
    {
        Some(raw) => raw.parse::<ConflictPolicy>().map_err(|reason| {
            ConfigLoadError::InvalidValue {
                field: "stream.conflict_policy",
                reason,
            }
        })?,
        None => ConflictPolicy::default(),
    };

    let stream = StreamConfig {
        blob_ttl: resolve_duration(
            "stream.blob_ttl",
            env.blob_ttl.or(file_stream.blob_ttl),
            DEFAULT_BLOB_TTL,
        )?,
        conflict_policy,
        stop_grace: resolve_duration(
            "stream.stop_grace",
            env.stop_grace.or(file_stream.stop_grace),
            DEFAULT_STOP_GRACE,
        )?,
        inference_timeout: resolve_duration(
            "stream.inference_timeout",
            env.inference_timeout.or(file_stream.inference_timeout),
            DEFAULT_INFERENCE_TIMEOUT,
        )?,
        min_body_parts: env
            .min_body_parts
            .or(file_stream.min_body_parts)
            .unwrap_or(0),
    };

    let default_resolution = match env
        .default_resolution
        .or(file_models.default_resolution)
    {
        Some(raw) => raw.parse::<Resolution>().map_err(|err| {
            ConfigLoadError::InvalidValue {
                field: "models.default_resolution",
                reason: err.to_string(),
            }
        })?,
        None => Resolution::DEFAULT,
    };
    if default_resolution.is_unspecified() {
        return Err(ConfigLoadError::InvalidValue {
            field: "models.default_resolution",
            reason: "default resolution must be non-zero".to_string(),
        });
    }

    let models = ModelsConfig {
        dir: env
            .models_dir
            .or(file_models.dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR)),
        allowed: env
            .allowed_models
            .or(file_models.allowed)
            .unwrap_or_else(|| {
                DEFAULT_MODELS.iter().map(|m| m.to_string()).collect()
            }),
        default_resolution,
    };

    Ok(Config {
        service,
        redis,
        stream,
        models,
        metadata,
    })
}

fn resolve_duration(
    field: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        Some(value) => humantime::parse_duration(value.trim()).map_err(
            |source| ConfigLoadError::InvalidDuration {
                field,
                value,
                source,
            },
        ),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_beats_file_values() {
        let mut file = FileConfig::default();
        file.service.name = Some("from-file".into());
        file.stream.blob_ttl = Some("90s".into());
        let env = EnvConfig {
            service_name: Some("from-env".into()),
            ..EnvConfig::default()
        };

        let config =
            compose_config(file, env, ConfigMetadata::default()).unwrap();
        assert_eq!(config.service.name, "from-env");
        assert_eq!(config.stream.blob_ttl, Duration::from_secs(90));
    }

    #[test]
    fn defaults_fill_every_section() {
        let config = compose_config(
            FileConfig::default(),
            EnvConfig::default(),
            ConfigMetadata::default(),
        )
        .unwrap();
        assert_eq!(config.service.name, "tf-pose");
        assert_eq!(config.service.error_channel, "error");
        assert_eq!(config.stream.blob_ttl, Duration::from_secs(180));
        assert_eq!(config.stream.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.models.allowed.len(), 4);
        assert_eq!(config.models.default_resolution, Resolution::DEFAULT);
    }

    #[test]
    fn bad_duration_names_the_field() {
        let env = EnvConfig {
            blob_ttl: Some("soon".into()),
            ..EnvConfig::default()
        };
        let err = compose_config(
            FileConfig::default(),
            env,
            ConfigMetadata::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("stream.blob_ttl"));
    }

    #[test]
    fn zero_default_resolution_is_rejected() {
        let env = EnvConfig {
            default_resolution: Some("0x0".into()),
            ..EnvConfig::default()
        };
        assert!(matches!(
            compose_config(FileConfig::default(), env, ConfigMetadata::default()),
            Err(ConfigLoadError::InvalidValue { .. })
        ));
    }
}
