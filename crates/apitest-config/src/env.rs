//! Environment variable handling.

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    // Server under test
    pub const APITEST_BASE_URL: &str = "APITEST_BASE_URL";
    pub const HOST: &str = "HOST";
    pub const PORT: &str = "PORT";

    // Transport
    pub const APITEST_TIMEOUT_MS: &str = "APITEST_TIMEOUT_MS";
    pub const APITEST_CONNECT_TIMEOUT_MS: &str = "APITEST_CONNECT_TIMEOUT_MS";
    pub const APITEST_MAX_REDIRECTS: &str = "APITEST_MAX_REDIRECTS";

    // Configuration
    pub const APITEST_CONFIG_PATH: &str = "APITEST_CONFIG_PATH";
    pub const APITEST_ENV: &str = "APITEST_ENV";
}

/// Compose `http://{host}:{port}` when both parts are present and non-empty.
pub fn base_url_from_host_port(host: Option<&str>, port: Option<&str>) -> Option<String> {
    match (host, port) {
        (Some(host), Some(port)) if !host.is_empty() && !port.is_empty() => {
            Some(format!("http://{}:{}", host, port))
        }
        _ => None,
    }
}

/// Access to the process environment.
pub struct Environment;

impl Environment {
    /// Load `.env` files from the working directory.
    pub fn init() -> Result<Vec<PathBuf>, EnvError> {
        let dir = env::current_dir().map_err(|e| EnvError::DotenvError(dotenvy::Error::Io(e)))?;
        Self::load_from(&dir, env::var(vars::APITEST_ENV).ok().as_deref())
    }

    /// Load `.env.{env_name}`, `.env.local` and `.env` from `dir`.
    ///
    /// Variables already set are never replaced, so the process environment
    /// wins over every file and the more specific files win over `.env`.
    /// Returns the files that were found.
    pub fn load_from(dir: &Path, env_name: Option<&str>) -> Result<Vec<PathBuf>, EnvError> {
        let mut names = Vec::new();
        if let Some(env_name) = env_name {
            names.push(format!(".env.{}", env_name));
        }
        names.push(".env.local".to_string());
        names.push(".env".to_string());

        let mut loaded = Vec::new();
        for name in names {
            let path = dir.join(name);
            match dotenvy::from_path(&path) {
                Ok(()) => loaded.push(path),
                Err(error) if error.not_found() => {}
                Err(error) => return Err(error.into()),
            }
        }

        tracing::debug!(files = loaded.len(), "loaded .env files");
        Ok(loaded)
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Base URL of the server under test.
    ///
    /// `APITEST_BASE_URL` wins; otherwise `HOST` and `PORT` are combined.
    pub fn base_url() -> Option<String> {
        Self::get(vars::APITEST_BASE_URL).or_else(|| {
            base_url_from_host_port(
                Self::get(vars::HOST).as_deref(),
                Self::get(vars::PORT).as_deref(),
            )
        })
    }
}
