//! Configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of redirects followed when a request does not say otherwise.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Settings shared by every request created from one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix applied to relative endpoints.
    pub base_url: Option<String>,
    /// Connection timeout (ms).
    pub connect_timeout_ms: u64,
    /// Whole-request timeout (ms), overridable per request.
    pub request_timeout_ms: u64,
    /// User agent string.
    pub user_agent: String,
    /// Redirects followed before the redirect response itself is returned.
    pub max_redirects: usize,
    /// Enable gzip decompression.
    pub gzip: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            user_agent: format!("apitest/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            gzip: true,
        }
    }
}

impl ClientConfig {
    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Connection timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
