//! Shared configuration library for posecast.
//!
//! Configuration is layered the same way for every entry point: an optional
//! TOML file (explicit path, `$POSECAST_CONFIG`, or one of the default
//! locations), then environment variables (including a `.env` file), then
//! built-in defaults. Guard rails run on the composed result and either
//! reject it or attach warnings for the caller to log.
#![allow(missing_docs)]

pub mod constants;
pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoader, error::ConfigLoadError};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{
    Config, ConfigMetadata, ConflictPolicy, ModelsConfig, RedisConfig,
    ServiceConfig, StreamConfig,
};
pub use validation::{
    ConfigGuardRailError, ConfigWarning, ConfigWarnings, has_wildcard,
};
