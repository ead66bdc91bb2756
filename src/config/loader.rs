//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles file discovery,
//! environment detection and layering through the `config` crate.

use super::error::ConfigResult;
use super::ResilienceConfig;
use ::config::{builder::DefaultState, ConfigBuilder, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Base name of configuration files inside the config directory
const CONFIG_FILE_STEM: &str = "resilience";

/// Prefix of environment variable overrides (`RESILIENCE__DEDUP__MAX_SIZE`)
const ENV_PREFIX: &str = "RESILIENCE";

/// Environment-variable-only builder, shared with [`ResilienceConfig::from_env`]
pub(crate) fn environment_source_builder() -> ConfigBuilder<DefaultState> {
    ::config::Config::builder().add_source(environment_source())
}

fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

/// Loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: ResilienceConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading resilience configuration"
        );

        let config: ResilienceConfig = ::config::Config::builder()
            .add_source(Self::file_source(&config_directory, CONFIG_FILE_STEM))
            .add_source(Self::file_source(
                &config_directory,
                &format!("{CONFIG_FILE_STEM}.{environment}"),
            ))
            .add_source(environment_source())
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            environment = %environment,
            service_name = %config.consumer.service_name,
            max_retries = config.consumer.max_retries,
            dead_letter_topic = %config.consumer.dead_letter_topic,
            dedup_max_size = config.dedup.max_size,
            dedup_ttl_ms = config.dedup.ttl_ms,
            "🔧 Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the environment from `RESILIENCE_ENV`, then `APP_ENV`
    pub fn detect_environment() -> String {
        env::var("RESILIENCE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    /// `RESILIENCE_CONFIG_DIR` if set, else `./config`
    fn default_config_directory() -> PathBuf {
        env::var("RESILIENCE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn file_source(directory: &Path, stem: &str) -> File<::config::FileSourceFile, FileFormat> {
        let path = directory.join(format!("{stem}.toml"));
        File::new(&path.to_string_lossy(), FileFormat::Toml).required(false)
    }
}
