//! Configuration file loading and parsing.

use crate::env::{base_url_from_host_port, vars};
use crate::types::ClientConfig;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up inside the project directory.
pub const CONFIG_FILE_NAME: &str = "apitest.yaml";

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("env var pattern is valid")
});

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error("invalid value for {var}: {value}")]
    InvalidEnvValue { var: String, value: String },
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
    file_name: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    ///
    /// The file name is `APITEST_CONFIG_PATH` when set, else `apitest.yaml`.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        let file_name = std::env::var(vars::APITEST_CONFIG_PATH)
            .unwrap_or_else(|_| CONFIG_FILE_NAME.to_string());
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
            file_name: PathBuf::from(file_name),
        }
    }

    /// Use `file_name`, relative to the project directory, as the config file.
    pub fn with_file_name(mut self, file_name: impl AsRef<Path>) -> Self {
        self.file_name = file_name.as_ref().to_path_buf();
        self
    }

    /// Path of the config file this loader reads and writes.
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join(&self.file_name)
    }

    /// Load `apitest.yaml` and apply environment overrides.
    pub fn load(&self) -> Result<ClientConfig, ConfigError> {
        let mut config = self.load_file()?;
        apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        validate(&config)?;
        Ok(config)
    }

    /// Load the config file alone, falling back to defaults when absent.
    pub fn load_file(&self) -> Result<ClientConfig, ConfigError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Ok(ClientConfig::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let expanded = expand_env_vars(&contents, |name| std::env::var(name).ok())?;

        let config: ClientConfig =
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        tracing::debug!(path = %config_path.display(), "loaded config file");
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        let config_path = self.config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(&config_path, yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

/// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
///
/// Comment lines are left untouched and substituted values are never
/// expanded again.
pub fn expand_env_vars(
    content: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut missing = None;

    let expanded: String = content
        .split_inclusive('\n')
        .map(|line| {
            if line.trim_start().starts_with('#') {
                return Cow::Borrowed(line);
            }
            ENV_VAR_PATTERN.replace_all(line, |cap: &Captures<'_>| {
                match lookup(&cap[1]).or_else(|| cap.get(2).map(|m| m.as_str().to_string())) {
                    Some(value) => value,
                    None => {
                        missing.get_or_insert_with(|| cap[1].to_string());
                        String::new()
                    }
                }
            })
        })
        .collect();

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(expanded),
    }
}

/// Apply environment overrides on top of a loaded config.
///
/// A missing base URL is filled from `APITEST_BASE_URL`, then from `HOST` + `PORT`.
pub fn apply_overrides(
    config: &mut ClientConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(base_url) = lookup(vars::APITEST_BASE_URL) {
        config.base_url = Some(base_url);
    } else if config.base_url.is_none() {
        config.base_url = base_url_from_host_port(
            lookup(vars::HOST).as_deref(),
            lookup(vars::PORT).as_deref(),
        );
    }

    if let Some(value) = lookup(vars::APITEST_TIMEOUT_MS) {
        config.request_timeout_ms = parse_var(vars::APITEST_TIMEOUT_MS, &value)?;
    }

    if let Some(value) = lookup(vars::APITEST_CONNECT_TIMEOUT_MS) {
        config.connect_timeout_ms = parse_var(vars::APITEST_CONNECT_TIMEOUT_MS, &value)?;
    }

    if let Some(value) = lookup(vars::APITEST_MAX_REDIRECTS) {
        config.max_redirects = parse_var(vars::APITEST_MAX_REDIRECTS, &value)?;
    }

    Ok(())
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Validate configuration values.
pub fn validate(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.request_timeout_ms == 0 {
        return Err(ConfigError::ValidationError {
            message: "request_timeout_ms must be greater than 0".to_string(),
        });
    }

    if let Some(base_url) = &config.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::ValidationError {
                message: format!("base_url must be an http(s) URL, got {}", base_url),
            });
        }
    }

    Ok(())
}
