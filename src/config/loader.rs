//! Configuration Loader
//!
//! Environment-aware loading built on the `config` crate. Sources are layered in
//! increasing precedence:
//!
//! 1. The preset for the detected environment ([`ResilienceConfig::for_environment`])
//! 2. An optional configuration file (format inferred from its extension)
//! 3. Environment variables prefixed with `RESILIENCE_`, using `__` between nested
//!    keys, e.g. `RESILIENCE_WORKER_POOL__WORKER_COUNT=8`

use super::error::{ConfigResult, ConfigurationError};
use super::ResilienceConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "RESILIENCE";

/// Conventional location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/resilience.toml";

/// Loaded, validated configuration and where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ResilienceConfig,
    environment: String,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    ///
    /// Reads [`DEFAULT_CONFIG_PATH`] when it exists; otherwise only the preset and
    /// environment variables apply.
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let path = default_path.is_file().then_some(default_path);
        Self::load_from_file(path, &environment)
    }

    /// Load configuration from an explicit file for an explicit environment
    pub fn load_from_file(path: Option<&Path>, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(path, environment, None)
    }

    /// Like [`ConfigManager::load_from_file`] but reads overrides from `vars` instead
    /// of the process environment
    pub fn load_with_env_vars(
        path: Option<&Path>,
        environment: &str,
        vars: HashMap<String, String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::build(path, environment, Some(vars))
    }

    fn build(
        path: Option<&Path>,
        environment: &str,
        vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let environment = environment.to_lowercase();
        debug!(
            environment = %environment,
            config_path = ?path,
            "Loading resilience configuration"
        );

        let preset = ResilienceConfig::for_environment(&environment);
        let mut builder = Config::builder().add_source(
            Config::try_from(&preset)
                .map_err(|e| ConfigurationError::load_error("defaults", e))?,
        );

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::config_file_not_found(path));
            }
            builder = builder.add_source(File::from(path));
        }

        let overrides = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("retry.retryable_errors")
            .source(vars);
        builder = builder.add_source(overrides);

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());
        let config: ResilienceConfig = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(source_name, e))?
            .try_deserialize()
            .map_err(ConfigurationError::deserialization_error)?;

        config.validate()?;

        info!(
            environment = %environment,
            limiters = config.rate_limits.limiters.len(),
            breaker_overrides = config.circuit_breakers.components.len(),
            worker_count = config.worker_pool.worker_count,
            queue_capacity = config.worker_pool.queue_capacity,
            "✅ Resilience configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_path: path.map(Path::to_path_buf),
        }))
    }

    /// Manager around an in-memory configuration, validated like a loaded one
    pub fn from_config(config: ResilienceConfig, environment: &str) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            environment: environment.to_lowercase(),
            config_path: None,
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// `RESILIENCE_ENV`, then `APP_ENV`, defaulting to `development`
    pub fn detect_environment() -> String {
        env::var("RESILIENCE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
