//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PANOMP_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where a resolved config file path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    UserConfigDir,
}

/// Config file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `<user config dir>/panomp/config.toml`, if it exists
///
/// `None` means no file; callers fall back to built-in defaults.
pub struct ConfigResolver {
    env_var_name: String,
}

impl ConfigResolver {
    /// Resolver reading the standard `PANOMP_CONFIG` variable
    pub fn new() -> Self {
        Self::with_env_var(CONFIG_ENV_VAR)
    }

    /// Resolver reading a custom environment variable
    pub fn with_env_var(env_var_name: impl Into<String>) -> Self {
        Self {
            env_var_name: env_var_name.into(),
        }
    }

    /// Resolve the config file to load
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Some((path.to_path_buf(), ConfigSource::CommandLine));
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.is_empty() {
                return Some((PathBuf::from(path), ConfigSource::Environment));
            }
        }

        // Priority 3: per-user config file
        match default_config_path() {
            Some(path) if path.exists() => Some((path, ConfigSource::UserConfigDir)),
            _ => None,
        }
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Default per-user config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("panomp").join("config.toml"))
}

/// Parse a TOML document into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Read and parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value = parse_toml(&content)?;
    info!("Loaded TOML configuration from {}", path.display());
    Ok(value)
}

/// Resolve and load a config, falling back to `T::default()` when no file is found
pub fn load_or_default<T: DeserializeOwned + Default>(
    resolver: &ConfigResolver,
    cli_arg: Option<&Path>,
) -> Result<T> {
    match resolver.resolve(cli_arg) {
        Some((path, source)) => {
            debug!("Config file {} (from {:?})", path.display(), source);
            load_toml(&path)
        }
        None => {
            info!("No config file found, using built-in defaults");
            Ok(T::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        assert_eq!(default_log_level(), "info");
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    fn test_cli_argument_wins() {
        let resolver = ConfigResolver::with_env_var("PANOMP_TEST_UNSET_VARIABLE");
        let (path, source) = resolver.resolve(Some(Path::new("/tmp/x.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
        assert_eq!(source, ConfigSource::CommandLine);
    }

    #[test]
    fn test_parse_toml_error_maps_to_toml_variant() {
        let result: Result<LoggingConfig> = parse_toml("level = ");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result: Result<LoggingConfig> = load_toml(Path::new("/nonexistent/panomp.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
