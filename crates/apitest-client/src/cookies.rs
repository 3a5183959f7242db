//! Request cookie encoding and `Set-Cookie` parsing.

use crate::request::ApiRequest;
use crate::response::ApiResponse;
use cookie::Cookie;
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Hook into how cookie values are written and read.
///
/// Both methods default to passing values through untouched, so an
/// implementation only overrides the direction it cares about (for
/// example signing outgoing values, or decrypting incoming ones).
pub trait CookieSerializer: Send + Sync {
    /// Turn a request cookie value into what goes on the wire.
    fn prepare(&self, name: &str, value: &str, request: &ApiRequest) -> String {
        let _ = (name, request);
        value.to_string()
    }

    /// Decode a response cookie value. `None` keeps the raw value.
    fn process(&self, name: &str, value: &str, response: &ApiResponse) -> Option<String> {
        let _ = (name, value, response);
        None
    }
}

/// `SameSite` attribute of a response cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl From<cookie::SameSite> for SameSite {
    fn from(value: cookie::SameSite) -> Self {
        match value {
            cookie::SameSite::Strict => SameSite::Strict,
            cookie::SameSite::Lax => SameSite::Lax,
            cookie::SameSite::None => SameSite::None,
        }
    }
}

/// A cookie set by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<SystemTime>,
    /// Seconds.
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl ResponseCookie {
    fn from_cookie(cookie: &Cookie<'_>) -> Self {
        Self {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            path: cookie.path().map(str::to_string),
            domain: cookie.domain().map(str::to_string),
            expires: cookie.expires_datetime().map(SystemTime::from),
            max_age: cookie.max_age().map(|age| age.whole_seconds()),
            secure: cookie.secure().unwrap_or(false),
            http_only: cookie.http_only().unwrap_or(false),
            same_site: cookie.same_site().map(SameSite::from),
        }
    }
}

/// Render request cookies as a single `Cookie` header value.
pub(crate) fn encode_request_cookies<'a>(
    cookies: impl IntoIterator<Item = (&'a str, String)>,
) -> Option<String> {
    let rendered: Vec<String> = cookies
        .into_iter()
        .map(|(name, value)| Cookie::new(name, value).encoded().to_string())
        .collect();

    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join("; "))
    }
}

/// Parse every `Set-Cookie` header. Later cookies win over earlier ones of
/// the same name; malformed headers are skipped.
pub(crate) fn parse_set_cookies(headers: &HeaderMap) -> BTreeMap<String, ResponseCookie> {
    let mut jar = BTreeMap::new();

    for raw in headers.get_all(SET_COOKIE) {
        let Ok(raw) = raw.to_str() else {
            tracing::debug!("skipping non-ascii set-cookie header");
            continue;
        };
        match Cookie::parse_encoded(raw) {
            Ok(cookie) => {
                let parsed = ResponseCookie::from_cookie(&cookie);
                jar.insert(parsed.name.clone(), parsed);
            }
            Err(error) => tracing::debug!(header = raw, %error, "skipping malformed set-cookie header"),
        }
    }

    jar
}
