//! Configuration Loader
//!
//! Environment-aware loading on top of the `config` crate. Sources, later wins:
//!
//! 1. the base file (`operator.toml`), required
//! 2. `<stem>.<environment>.toml` next to it, optional
//! 3. `OPERATOR_<SECTION>__<KEY>` environment variables

use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::OperatorConfig;

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "OPERATOR";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: OperatorConfig,
    environment: String,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load `path` for the auto-detected environment
    pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<ConfigManager> {
        let environment = Self::detect_environment();
        Self::load_from_path_with_env(path, &environment)
    }

    /// Load `path` for an explicit environment
    pub fn load_from_path_with_env(
        path: impl AsRef<Path>,
        environment: &str,
    ) -> ConfigResult<ConfigManager> {
        Self::load_with_overrides(path.as_ref(), environment, None)
    }

    /// Load with an explicit set of environment variables instead of the process environment.
    ///
    /// This is useful for testing without modifying global environment variables.
    pub fn load_with_overrides(
        path: &Path,
        environment: &str,
        env_overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<ConfigManager> {
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let override_path = Self::environment_override_path(path, environment);
        debug!(
            environment,
            config_path = %path.display(),
            override_path = %override_path.display(),
            "Loading configuration"
        );

        let parse_error = |e: config::ConfigError| ConfigurationError::ParseError {
            file_path: path.display().to_string(),
            reason: e.to_string(),
        };

        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                File::from(override_path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env_overrides),
            )
            .build()
            .map_err(parse_error)?;

        let config: OperatorConfig = settings.try_deserialize().map_err(parse_error)?;
        config.validate()?;

        info!(
            environment,
            operator_address = %config.operator.address,
            rpc_url = %config.chain.rpc_url,
            delegate_url = %config.delegate.url,
            aggregator_url = %config.aggregator.url,
            "Configuration loaded successfully"
        );

        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            config_path: path.to_path_buf(),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Detect the current environment
    pub fn detect_environment() -> String {
        crate::logging::get_environment()
    }

    /// `config/operator.toml` + `production` -> `config/operator.production.toml`
    fn environment_override_path(path: &Path, environment: &str) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "operator".to_string());
        path.with_file_name(format!("{stem}.{environment}.toml"))
    }
}
