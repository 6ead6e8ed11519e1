//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use murmur_core::MurmurError;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Prefix of environment variable overrides (`MURMUR_CACHE__ENABLED=false`).
pub const ENV_PREFIX: &str = "MURMUR";

/// Configuration loader with runtime reload support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `MURMUR_` prefix
    pub fn new(config_dir: impl Into<String>) -> Result<Self, MurmurError> {
        let config_dir = config_dir.into();
        let config = Self::load(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, MurmurError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    ///
    /// The current configuration is kept when the new one fails to load.
    pub async fn reload(&self) -> Result<(), MurmurError> {
        let new_config = Self::load(&self.config_dir)?;
        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads and validates configuration from the specified directory.
    pub fn load(config_dir: &str) -> Result<AppConfig, MurmurError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var(format!("{ENV_PREFIX}_ENVIRONMENT")).unwrap_or_else(|_| "development".to_string());

        info!(environment = %environment, config_dir = %config_dir, "Loading configuration");

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{config_dir}/{name}.toml");
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let app_config: AppConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_error_to_murmur_error)?;

        ConfigValidator::validate(&app_config).map_err(|errors| {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            MurmurError::Configuration(message)
        })?;

        Ok(app_config)
    }
}

fn config_error_to_murmur_error(err: ConfigError) -> MurmurError {
    MurmurError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheBackend;
    use std::fs;

    #[tokio::test]
    async fn test_missing_directory_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        let config = loader.get().await;
        assert_eq!(config.queue.capacity, 1000);
    }

    #[tokio::test]
    async fn test_default_and_local_layers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[cache]\nbackend = \"memory\"\nfeed_ttl_secs = 120\n\n[queue]\ncapacity = 10\n",
        )
        .unwrap();
        fs::write(dir.path().join("local.toml"), "[queue]\ncapacity = 20\n").unwrap();

        let config = ConfigLoader::load(&dir.path().to_string_lossy()).unwrap();
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.feed_ttl_secs, 120);
        assert_eq!(config.queue.capacity, 20);
    }

    #[tokio::test]
    async fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("default.toml"), "[queue]\ncapacity = 0\n").unwrap();

        let err = ConfigLoader::load(&dir.path().to_string_lossy()).unwrap_err();
        assert!(matches!(err, MurmurError::Configuration(msg) if msg.contains("queue.capacity")));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.toml");
        fs::write(&path, "[queue]\ncapacity = 5\n").unwrap();

        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        assert_eq!(loader.get().await.queue.capacity, 5);

        fs::write(&path, "[queue]\ncapacity = 7\n").unwrap();
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.queue.capacity, 7);
    }
}
