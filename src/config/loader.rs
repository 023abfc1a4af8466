//! Configuration Loader
//!
//! Environment-aware configuration loading: `orchestrator.yaml`, then
//! `orchestrator.{environment}.yaml`, then `ORCHESTRATOR__SECTION__KEY`
//! environment variables, later sources overriding earlier ones.

use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::ConfigResult;
use super::OrchestratorConfig;
use crate::logging::get_environment;

const BASE_CONFIG_NAME: &str = "orchestrator";
const ENV_PREFIX: &str = "ORCHESTRATOR";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: OrchestratorConfig,
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
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config: OrchestratorConfig = Config::builder()
            .add_source(Self::yaml_source(&config_directory, BASE_CONFIG_NAME))
            .add_source(Self::yaml_source(
                &config_directory,
                &format!("{BASE_CONFIG_NAME}.{environment}"),
            ))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            environment = %environment,
            owner = %config.github.owner,
            repo = %config.github.repo,
            executor_workflow = %config.github.executor_workflow,
            batch_size = config.orchestration.batch_size,
            targets = config.instances.targets.len(),
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it
    pub fn from_config(config: OrchestratorConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn yaml_source(directory: &Path, name: &str) -> File<config::FileSourceFile, FileFormat> {
        let path = directory.join(format!("{name}.yaml"));
        File::from(path).format(FileFormat::Yaml).required(false)
    }

    fn detect_environment() -> String {
        get_environment().to_lowercase()
    }
}
