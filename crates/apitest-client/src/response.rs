//! Buffered view over a completed response.

use crate::codec::{self, Codecs};
use crate::cookies::{parse_set_cookies, CookieSerializer, ResponseCookie};
use crate::dump::{self, Section};
use crate::error::ApiError;
use crate::links::parse_links;
use crate::transport::RawResponse;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use url::Url;

/// Response returned by [`ApiRequest::send`](crate::ApiRequest::send).
///
/// The body is read in full before the response is handed out, so every
/// accessor is synchronous and can be called any number of times.
pub struct ApiResponse {
    method: Method,
    request_url: Url,
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    bytes: Bytes,
    text: String,
    body: Value,
    parsed: bool,
    redirects: Vec<Url>,
    cookies: BTreeMap<String, ResponseCookie>,
    dumped: Mutex<HashSet<Section>>,
}

impl fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResponse")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("status", &self.status.as_u16())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("redirects", &self.redirects)
            .finish()
    }
}

impl ApiResponse {
    pub(crate) fn from_raw(
        method: Method,
        request_url: Url,
        raw: RawResponse,
        redirects: Vec<Url>,
        codecs: &Codecs,
        cookie_serializer: Option<&dyn CookieSerializer>,
    ) -> Result<Self, ApiError> {
        let RawResponse {
            status,
            headers,
            url,
            bytes,
        } = raw;

        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let (body, parsed) = match codecs.decode(content_type, &bytes, status.as_u16()) {
            Ok(decoded) => decoded,
            // Server errors are reported from their text, not their body.
            Err(error) if status.is_server_error() => {
                tracing::debug!(%error, "ignoring unparsable server error body");
                (Value::Null, false)
            }
            Err(error) => return Err(error),
        };

        let mut response = Self {
            method,
            request_url,
            url,
            status,
            text: String::from_utf8_lossy(&bytes).into_owned(),
            cookies: BTreeMap::new(),
            headers,
            bytes,
            body,
            parsed,
            redirects,
            dumped: Mutex::new(HashSet::new()),
        };

        let mut cookies = parse_set_cookies(&response.headers);
        if let Some(serializer) = cookie_serializer {
            for cookie in cookies.values_mut() {
                if let Some(value) = serializer.process(&cookie.name, &cookie.value, &response) {
                    cookie.value = value;
                }
            }
        }
        response.cookies = cookies;

        Ok(response)
    }

    /// HTTP method of the request that produced this response.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL the request was sent to.
    pub fn request_url(&self) -> &Url {
        &self.request_url
    }

    /// Final URL, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Status class: `2` for 2xx, `4` for 4xx and so on.
    pub fn status_type(&self) -> u16 {
        self.status.as_u16() / 100
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header. Names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a header.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// Mime essence of the `Content-Type` header, e.g. `application/json`.
    pub fn content_type(&self) -> Option<String> {
        self.header(CONTENT_TYPE.as_str()).map(codec::essence)
    }

    /// `charset` parameter of the `Content-Type` header.
    pub fn charset(&self) -> Option<String> {
        self.header(CONTENT_TYPE.as_str()).and_then(codec::charset)
    }

    /// Body as text. Invalid UTF-8 is replaced.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Parsed body, or `Null` when no parser handles the content type.
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Deserialize the raw body as JSON into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.bytes).map_err(|e| ApiError::Parse {
            status: self.status(),
            content_type: self.content_type().unwrap_or_default(),
            message: e.to_string(),
        })
    }

    /// Whether the body was parsed into structured data, or is binary.
    pub fn has_body(&self) -> bool {
        if self.parsed {
            return true;
        }
        match self.content_type() {
            Some(essence) => {
                essence == codec::mime::JSON
                    || essence == codec::mime::FORM
                    || essence == codec::mime::MULTIPART
                    || codec::is_binary(&essence)
            }
            None => false,
        }
    }

    /// Status is 400 or above.
    pub fn has_error(&self) -> bool {
        self.status.as_u16() >= 400
    }

    /// Status is 500 or above.
    pub fn has_fatal_error(&self) -> bool {
        self.status.as_u16() >= 500
    }

    pub fn has_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    pub fn has_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Description of an error status, e.g. `cannot GET /users (404)`.
    pub fn error(&self) -> Option<String> {
        self.has_error().then(|| {
            format!(
                "cannot {} {} ({})",
                self.method,
                self.request_url.path(),
                self.status.as_u16()
            )
        })
    }

    /// Targets of the `Link` header keyed by relation.
    pub fn links(&self) -> BTreeMap<String, String> {
        parse_links(&self.headers)
    }

    /// URLs followed before reaching this response.
    pub fn redirects(&self) -> &[Url] {
        &self.redirects
    }

    pub fn cookies(&self) -> &BTreeMap<String, ResponseCookie> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&ResponseCookie> {
        self.cookies.get(name)
    }

    /// Record a section as dumped; false if it already was.
    fn mark_dumped(&self, section: Section) -> bool {
        self.dumped.lock().insert(section)
    }

    pub fn dump_headers(&self) -> &Self {
        if self.mark_dumped(Section::Headers) {
            dump::response_headers(self);
        }
        self
    }

    pub fn dump_cookies(&self) -> &Self {
        if self.mark_dumped(Section::Cookies) {
            dump::response_cookies(self);
        }
        self
    }

    pub fn dump_body(&self) -> &Self {
        if self.mark_dumped(Section::Body) {
            dump::response_body(self);
        }
        self
    }

    pub fn dump_error(&self) -> &Self {
        if self.mark_dumped(Section::Error) {
            dump::response_error(self);
        }
        self
    }

    /// Dump the status line and every section not dumped yet.
    pub fn dump(&self) -> &Self {
        if self.mark_dumped(Section::Summary) {
            dump::response_summary(self);
            self.dump_cookies().dump_headers().dump_body().dump_error();
        }
        self
    }

    /// Sections dumped so far.
    pub fn dumped_sections(&self) -> HashSet<Section> {
        self.dumped.lock().clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use reqwest::header::{HeaderValue, LINK, SET_COOKIE};
    use serde::Deserialize;
    use serde_json::json;

    pub(crate) fn raw(status: u16, content_type: Option<&'static str>, body: &'static [u8]) -> RawResponse {
        let mut headers = HeaderMap::new();
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            url: Url::parse("http://localhost:3333/users").unwrap(),
            bytes: Bytes::from_static(body),
        }
    }

    pub(crate) fn response_from(raw: RawResponse) -> ApiResponse {
        ApiResponse::from_raw(
            Method::GET,
            Url::parse("http://localhost:3333/users").unwrap(),
            raw,
            Vec::new(),
            &Codecs::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_json_response() {
        let response = response_from(raw(200, Some("application/json; charset=utf-8"), br#"{"id":1,"name":"virk"}"#));

        assert_eq!(response.status(), 200);
        assert_eq!(response.status_type(), 2);
        assert_eq!(response.content_type().as_deref(), Some("application/json"));
        assert_eq!(response.charset().as_deref(), Some("utf-8"));
        assert_eq!(response.body(), &json!({ "id": 1, "name": "virk" }));
        assert!(response.has_body());
        assert!(!response.has_error());
        assert_eq!(response.error(), None);
    }

    #[test]
    fn test_typed_json() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct User {
            id: u32,
            name: String,
        }

        let response = response_from(raw(200, Some("application/json"), br#"{"id":1,"name":"virk"}"#));
        let user: User = response.json().unwrap();
        assert_eq!(user, User { id: 1, name: "virk".into() });
    }

    #[test]
    fn test_text_response_has_no_body() {
        let response = response_from(raw(200, Some("text/html"), b"<h1>hello</h1>"));
        assert_eq!(response.text(), "<h1>hello</h1>");
        assert_eq!(response.body(), &Value::Null);
        assert!(!response.has_body());
    }

    #[test]
    fn test_binary_response_has_body() {
        let response = response_from(raw(200, Some("image/png"), b"\x89PNG"));
        assert!(response.has_body());
        assert_eq!(response.bytes().len(), 4);
    }

    #[test]
    fn test_client_error_response() {
        let response = response_from(raw(404, Some("application/json"), br#"{"message":"not found"}"#));
        assert!(response.has_error());
        assert!(response.has_client_error());
        assert!(!response.has_fatal_error());
        assert_eq!(response.error().as_deref(), Some("cannot GET /users (404)"));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let result = ApiResponse::from_raw(
            Method::GET,
            Url::parse("http://localhost/users").unwrap(),
            raw(200, Some("application/json"), b"{oops"),
            Vec::new(),
            &Codecs::default(),
            None,
        );
        assert_matches!(result, Err(ApiError::Parse { status: 200, .. }));
    }

    #[test]
    fn test_invalid_json_on_server_error_is_tolerated() {
        let response = response_from(raw(500, Some("application/json"), b"Error: boom"));
        assert!(response.has_fatal_error());
        assert!(response.has_server_error());
        assert_eq!(response.body(), &Value::Null);
    }

    #[test]
    fn test_headers_links_and_cookies() {
        let mut raw = raw(200, None, b"");
        raw.headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        raw.headers.append(SET_COOKIE, HeaderValue::from_static("b=2; HttpOnly"));
        raw.headers.insert(LINK, HeaderValue::from_static("</users?page=2>; rel=\"next\""));

        let response = response_from(raw);
        assert_eq!(response.header_all("set-cookie"), vec!["a=1", "b=2; HttpOnly"]);
        assert_eq!(response.header("Set-Cookie"), Some("a=1"));
        assert_eq!(response.cookie("b").map(|c| c.http_only), Some(true));
        assert_eq!(response.cookies().len(), 2);
        assert_eq!(response.links()["next"], "/users?page=2");
    }

    #[test]
    fn test_cookie_serializer_processes_values() {
        struct Reverse;
        impl CookieSerializer for Reverse {
            fn process(&self, name: &str, value: &str, _: &ApiResponse) -> Option<String> {
                (name == "secret").then(|| value.chars().rev().collect())
            }
        }

        let mut raw = raw(200, None, b"");
        raw.headers.append(SET_COOKIE, HeaderValue::from_static("secret=cba"));
        raw.headers.append(SET_COOKIE, HeaderValue::from_static("plain=xyz"));

        let response = ApiResponse::from_raw(
            Method::GET,
            Url::parse("http://localhost/").unwrap(),
            raw,
            Vec::new(),
            &Codecs::default(),
            Some(&Reverse),
        )
        .unwrap();

        assert_eq!(response.cookie("secret").unwrap().value, "abc");
        assert_eq!(response.cookie("plain").unwrap().value, "xyz");
    }

    #[test]
    fn test_dump_sections_once() {
        let response = response_from(raw(200, Some("application/json"), br#"{"ok":true}"#));
        response.dump_body();
        assert_eq!(response.dumped_sections(), HashSet::from([Section::Body]));

        response.dump().dump();
        assert_eq!(
            response.dumped_sections(),
            HashSet::from([Section::Summary, Section::Headers, Section::Cookies, Section::Body, Section::Error])
        );
    }
}
