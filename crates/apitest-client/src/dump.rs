//! Human-readable request and response dumps, emitted as tracing events on
//! the `apitest::dump` target.

use crate::response::ApiResponse;
use reqwest::header::HeaderMap;
use reqwest::Method;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Log target of every dump.
pub const TARGET: &str = "apitest::dump";

/// Part of a request or response that can be dumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Method and URL of a request, status of a response.
    Summary,
    Headers,
    Cookies,
    Body,
    Error,
}

fn header_lines(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value.to_str().unwrap_or("<binary>")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_timeout(timeout: Option<Duration>) -> String {
    match timeout {
        Some(t) => format!("{}ms", t.as_millis()),
        None => "default".to_string(),
    }
}

/// Everything about an outgoing request that can be dumped.
pub(crate) struct RequestDump<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub query: &'a [(String, String)],
    pub timeout: Option<Duration>,
    pub headers: &'a HeaderMap,
    pub cookies: &'a [(String, String)],
    pub body: String,
}

pub(crate) fn request(dump: &RequestDump<'_>, sections: &[Section]) {
    for section in sections {
        match section {
            Section::Summary => tracing::info!(
                target: TARGET,
                method = %dump.method,
                url = %dump.url,
                query = ?dump.query,
                timeout = %describe_timeout(dump.timeout),
                "request"
            ),
            Section::Headers => {
                tracing::info!(target: TARGET, headers = %header_lines(dump.headers), "request headers")
            }
            Section::Cookies => {
                let cookies: BTreeMap<_, _> = dump.cookies.iter().cloned().collect();
                tracing::info!(target: TARGET, cookies = ?cookies, "request cookies")
            }
            Section::Body => {
                if !dump.body.is_empty() {
                    tracing::info!(target: TARGET, body = %dump.body, "request body")
                }
            }
            Section::Error => {}
        }
    }
}

pub(crate) fn response_summary(response: &ApiResponse) {
    tracing::info!(
        target: TARGET,
        status = response.status(),
        url = %response.url(),
        redirects = response.redirects().len(),
        "response"
    );
}

pub(crate) fn response_headers(response: &ApiResponse) {
    tracing::info!(target: TARGET, headers = %header_lines(response.headers()), "response headers");
}

pub(crate) fn response_cookies(response: &ApiResponse) {
    tracing::info!(target: TARGET, cookies = ?response.cookies(), "response cookies");
}

pub(crate) fn response_body(response: &ApiResponse) {
    if response.has_fatal_error() {
        return;
    }

    if response.has_body() && !response.body().is_null() {
        let body = serde_json::to_string_pretty(response.body()).unwrap_or_default();
        tracing::info!(target: TARGET, body = %body, "response body");
    } else if !response.text().is_empty() {
        tracing::info!(target: TARGET, text = %response.text(), "response text");
    }
}

pub(crate) fn response_error(response: &ApiResponse) {
    if response.has_fatal_error() {
        let error = crate::error::ApiError::from_server_response(response.status(), response.text().to_string());
        tracing::info!(target: TARGET, error = %error, "response error");
    }
}
