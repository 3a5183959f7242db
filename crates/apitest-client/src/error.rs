//! Errors raised while building, sending or post-processing a request.

use crate::hooks::HookPhase;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

/// Lines shaped like `    at handler (server.js:10:5)`.
static STACK_FRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*at .*(\S+:\d+|\(native\))").expect("stack frame pattern is valid"));

/// Errors produced by [`ApiRequest::send`](crate::ApiRequest::send).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid header {name:?}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("cannot serialize body as {content_type}: {message}")]
    Serialize { content_type: String, message: String },

    #[error("failed to read {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS configuration: {0}")]
    Tls(String),

    #[error("server error {status}: {message}")]
    Server {
        status: u16,
        message: String,
        body: String,
    },

    #[error("failed to parse {content_type} response (status {status}): {message}")]
    Parse {
        status: u16,
        content_type: String,
        message: String,
    },

    #[error("{phase} hook failed: {error}")]
    Hook { phase: HookPhase, error: anyhow::Error },

    #[error("{phase} cleanup failed: {error}")]
    Cleanup { phase: HookPhase, error: anyhow::Error },
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(e)
        }
    }
}

impl ApiError {
    /// Build the error for a response with a 5xx status.
    ///
    /// When the body looks like a stack trace, its first line becomes the message.
    pub fn from_server_response(status: u16, body: String) -> Self {
        let message = if STACK_FRAME.is_match(&body) {
            body.lines().next().unwrap_or_default().trim().to_string()
        } else if body.trim().is_empty() {
            format!("server responded with status {}", status)
        } else {
            body.clone()
        };

        ApiError::Server {
            status,
            message,
            body,
        }
    }

    /// Status code of a server error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Parse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The transport gave up before any response arrived: timeouts and refused connections.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            ApiError::Timeout => true,
            ApiError::Transport(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Error raised by a hook or a hook cleanup.
    pub fn hook_phase(&self) -> Option<HookPhase> {
        match self {
            ApiError::Hook { phase, .. } | ApiError::Cleanup { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub(crate) fn invalid_header(name: impl Into<String>, message: impl ToString) -> Self {
        ApiError::InvalidHeader {
            name: name.into(),
            message: message.to_string(),
        }
    }
}
