//! Fluent request builder and the send pipeline.

use crate::body::{Body, FileOptions, FileSource, MultipartPart, PreparedBody};
use crate::codec::{self, mime, Codecs};
use crate::cookies::{encode_request_cookies, CookieSerializer};
use crate::dump::{self, RequestDump, Section};
use crate::error::ApiError;
use crate::hooks::{Hook, HookPhase, HookResult, HookRunner};
use crate::response::ApiResponse;
use crate::retry::{Attempt, RetryPolicy};
use crate::transport::{self, RedirectLog, TlsOptions, TransportOptions};
use apitest_config::ClientConfig;
use apitest_log::spans::{attempt_span, record_status, request_span};
use base64::Engine;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, COOKIE};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use url::Url;

/// Whether an endpoint is a complete URL rather than a path.
fn is_absolute(endpoint: &str) -> bool {
    endpoint.starts_with("http://") || endpoint.starts_with("https://")
}

/// Join a relative endpoint to a base URL.
pub(crate) fn join_url(base_url: Option<&str>, endpoint: &str) -> String {
    match base_url {
        Some(base) if !is_absolute(endpoint) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        ),
        _ => endpoint.to_string(),
    }
}

/// Client-wide state copied into every request.
#[derive(Clone, Default)]
pub(crate) struct RequestDefaults {
    pub base_url: Option<String>,
    pub config: ClientConfig,
    pub setup_hooks: Vec<Arc<dyn Hook<ApiRequest>>>,
    pub teardown_hooks: Vec<Arc<dyn Hook<ApiResponse>>>,
    pub cookie_serializer: Option<Arc<dyn CookieSerializer>>,
    pub codecs: Codecs,
}

/// One outbound HTTP request.
///
/// Builder methods consume and return the request. Problems found while
/// building (an invalid header name, a body that cannot be serialized) are
/// held back and reported by [`ApiRequest::send`], so chains never need `?`.
///
/// ```ignore
/// let response = client
///     .post("/users")
///     .json(&json!({ "username": "virk" }))
///     .bearer_token("secret")
///     .await?;
/// response.assert_created();
/// ```
pub struct ApiRequest {
    method: Method,
    endpoint: String,
    base_url: Option<String>,
    config: ClientConfig,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Body,
    timeout: Option<Duration>,
    max_redirects: Option<usize>,
    tls: TlsOptions,
    retry: RetryPolicy,
    dump_sections: Vec<Section>,
    setup_hooks: Vec<Arc<dyn Hook<ApiRequest>>>,
    teardown_hooks: Vec<Arc<dyn Hook<ApiResponse>>>,
    cookie_serializer: Option<Arc<dyn CookieSerializer>>,
    codecs: Codecs,
    deferred_error: Option<ApiError>,
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("setup_hooks", &self.setup_hooks.len())
            .field("teardown_hooks", &self.teardown_hooks.len())
            .finish()
    }
}

impl ApiRequest {
    /// Standalone request with default configuration and no hooks.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self::with_defaults(method, endpoint.into(), RequestDefaults::default())
    }

    pub(crate) fn with_defaults(method: Method, endpoint: String, defaults: RequestDefaults) -> Self {
        Self {
            method,
            endpoint,
            base_url: defaults.base_url,
            config: defaults.config,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            query: Vec::new(),
            body: Body::Empty,
            timeout: None,
            max_redirects: None,
            tls: TlsOptions::default(),
            retry: RetryPolicy::default(),
            dump_sections: Vec::new(),
            setup_hooks: defaults.setup_hooks,
            teardown_hooks: defaults.teardown_hooks,
            cookie_serializer: defaults.cookie_serializer,
            codecs: defaults.codecs,
            deferred_error: None,
        }
    }

    fn defer(&mut self, error: ApiError) {
        if self.deferred_error.is_none() {
            tracing::debug!(%error, "deferring request builder error");
            self.deferred_error = Some(error);
        }
    }

    // ----- accessors -----

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Resolved URL including query parameters.
    pub fn url(&self) -> Result<Url, ApiError> {
        let raw = join_url(self.base_url.as_deref(), &self.endpoint);
        let mut url = Url::parse(&raw).map_err(|source| ApiError::InvalidUrl { url: raw.clone(), source })?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Cookies to send, before serialization.
    pub fn cookie_jar(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Builder error that `send` will report, if any.
    pub fn pending_error(&self) -> Option<&ApiError> {
        self.deferred_error.as_ref()
    }

    // ----- in-place mutators, usable from setup hooks -----

    /// Set a header, replacing previous values.
    pub fn insert_header(&mut self, name: &str, value: &str) -> &mut Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.headers.insert(name, value);
            }
            Err(error) => self.defer(error),
        }
        self
    }

    /// Add a header value, keeping previous ones.
    pub fn append_header_value(&mut self, name: &str, value: &str) -> &mut Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.headers.append(name, value);
            }
            Err(error) => self.defer(error),
        }
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    /// Set a cookie, replacing one of the same name.
    pub fn set_cookie(&mut self, name: &str, value: &str) -> &mut Self {
        match self.cookies.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.cookies.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn add_query(&mut self, key: &str, value: &str) -> &mut Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Replace the body. Fails if the request already has multipart fields.
    pub fn set_body(&mut self, body: Body) -> &mut Self {
        if let Err(error) = self.body.replace(body) {
            self.defer(error);
        }
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    fn push_part(&mut self, part: MultipartPart) {
        if let Err(error) = self.body.push_part(part) {
            self.defer(error);
        }
    }

    fn set_structured_body<T: Serialize + ?Sized>(&mut self, value: &T, content_type: &str) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.set_body(Body::Value(value));
                self.insert_header(CONTENT_TYPE.as_str(), content_type);
            }
            Err(e) => self.defer(ApiError::Serialize {
                content_type: content_type.to_string(),
                message: e.to_string(),
            }),
        }
    }

    // ----- headers -----

    pub fn header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.insert_header(name, value.as_ref());
        self
    }

    pub fn headers_from<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self.insert_header(name.as_ref(), value.as_ref());
        }
        self
    }

    pub fn append_header(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.append_header_value(name, value.as_ref());
        self
    }

    /// Set `Content-Type`. Accepts shorthands such as `json` or `form`.
    pub fn content_type(self, value: &str) -> Self {
        let value = codec::expand_shorthand(value);
        self.header(CONTENT_TYPE.as_str(), value)
    }

    /// Set `Accept`. Accepts the same shorthands as [`ApiRequest::content_type`].
    pub fn accept(self, value: &str) -> Self {
        let value = codec::expand_shorthand(value);
        self.header(ACCEPT.as_str(), value)
    }

    pub fn basic_auth(mut self, user: &str, password: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
        self.set_authorization(format!("Basic {}", encoded));
        self
    }

    pub fn bearer_token(mut self, token: &str) -> Self {
        self.set_authorization(format!("Bearer {}", token));
        self
    }

    fn set_authorization(&mut self, value: String) {
        match HeaderValue::from_str(&value) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(e) => self.defer(ApiError::invalid_header(AUTHORIZATION.as_str(), e)),
        }
    }

    // ----- cookies -----

    pub fn cookie(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.set_cookie(name, value.as_ref());
        self
    }

    pub fn cookies<I, K, V>(mut self, cookies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in cookies {
            self.set_cookie(name.as_ref(), value.as_ref());
        }
        self
    }

    // ----- query string -----

    pub fn qs(mut self, key: &str, value: impl ToString) -> Self {
        self.add_query(key, &value.to_string());
        self
    }

    /// Add every field of `value` as query parameters. Nested objects use
    /// `parent[child]` keys and arrays repeat the key.
    pub fn query<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        let pairs = serde_json::to_value(value)
            .map_err(|e| e.to_string())
            .and_then(|value| codec::flatten_pairs(&value));
        match pairs {
            Ok(pairs) => self.query.extend(pairs),
            Err(message) => self.defer(ApiError::Serialize {
                content_type: "query string".to_string(),
                message,
            }),
        }
        self
    }

    /// Add parameters from an encoded query string such as `a=1&b=2`.
    pub fn query_str(mut self, query: &str) -> Self {
        let query = query.trim_start_matches('?');
        self.query.extend(
            url::form_urlencoded::parse(query.as_bytes()).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
        self
    }

    // ----- body -----

    /// Serialize `value` as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.set_structured_body(value, mime::JSON);
        self
    }

    /// Serialize `value` as an urlencoded form.
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.set_structured_body(value, mime::FORM);
        self
    }

    /// Structured body, serialized according to the content type at send
    /// time (JSON when none is set).
    pub fn send_value(mut self, value: Value) -> Self {
        self.set_body(Body::Value(value));
        self
    }

    /// Plain text body; sets `text/plain` unless a content type is set.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.set_body(Body::Raw(Bytes::from(text.into())));
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.insert_header(CONTENT_TYPE.as_str(), mime::TEXT);
        }
        self
    }

    /// Raw body sent verbatim.
    pub fn bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.set_body(Body::Raw(bytes.into()));
        self
    }

    /// Multipart text field.
    pub fn field(mut self, name: &str, value: impl ToString) -> Self {
        self.push_part(MultipartPart::Field {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        for (name, value) in fields {
            self.push_part(MultipartPart::Field {
                name: name.as_ref().to_string(),
                value: value.to_string(),
            });
        }
        self
    }

    /// Multipart file. Paths are read when the request is sent.
    pub fn file(self, name: &str, source: impl Into<FileSource>) -> Self {
        self.file_with(name, source, FileOptions::default())
    }

    pub fn file_with(mut self, name: &str, source: impl Into<FileSource>, options: FileOptions) -> Self {
        self.push_part(MultipartPart::File {
            name: name.to_string(),
            source: source.into(),
            options,
        });
        self
    }

    // ----- transport -----

    /// Whole-request timeout, overriding the client's.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.set_timeout(timeout);
        self
    }

    /// Maximum redirects to follow. `0` returns the redirect response itself.
    pub fn redirects(mut self, count: usize) -> Self {
        self.max_redirects = Some(count);
        self
    }

    /// Trust an additional CA certificate (PEM).
    pub fn ca(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.tls.ca.push(pem.into());
        self
    }

    /// Client certificate (PEM). Requires [`ApiRequest::private_key`].
    pub fn cert(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.tls.cert = Some(pem.into());
        self
    }

    /// PKCS#8 private key (PEM) for the client certificate.
    pub fn private_key(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.tls.key = Some(pem.into());
        self
    }

    /// Client identity from a PKCS#12 archive.
    pub fn pfx(mut self, der: impl Into<Vec<u8>>, passphrase: &str) -> Self {
        self.tls.pfx = Some((der.into(), passphrase.to_string()));
        self
    }

    /// Accept any server certificate.
    pub fn disable_tls_certs(mut self) -> Self {
        self.tls.accept_invalid_certs = true;
        self
    }

    /// Accept any certificate when the target is the local machine.
    pub fn trust_localhost(mut self, trust: bool) -> Self {
        self.tls.trust_localhost = trust;
        self
    }

    /// Retry connection failures and transient statuses up to `count` times.
    pub fn retry(mut self, count: u32) -> Self {
        self.retry = RetryPolicy::new(count);
        self
    }

    /// Retry up to `count` times while `predicate` returns true.
    pub fn retry_until<F>(mut self, count: u32, predicate: F) -> Self
    where
        F: Fn(Attempt<'_>) -> bool + Send + Sync + 'static,
    {
        self.retry = RetryPolicy::until(count, predicate);
        self
    }

    // ----- dumps -----

    fn dump_section(mut self, section: Section) -> Self {
        if !self.dump_sections.contains(&section) {
            self.dump_sections.push(section);
        }
        self
    }

    /// Dump method, URL, cookies, headers and body when the request is sent.
    pub fn dump(self) -> Self {
        self.dump_section(Section::Summary)
            .dump_cookies()
            .dump_headers()
            .dump_body()
    }

    pub fn dump_headers(self) -> Self {
        self.dump_section(Section::Headers)
    }

    pub fn dump_cookies(self) -> Self {
        self.dump_section(Section::Cookies)
    }

    pub fn dump_body(self) -> Self {
        self.dump_section(Section::Body)
    }

    // ----- hooks -----

    /// Register a setup hook for this request, after the client's.
    pub fn setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ApiRequest) -> HookResult<ApiRequest> + Send + Sync + 'static,
    {
        self.setup_hooks.push(Arc::new(hook));
        self
    }

    pub fn setup_hook(mut self, hook: impl Hook<ApiRequest> + 'static) -> Self {
        self.setup_hooks.push(Arc::new(hook));
        self
    }

    /// Register a teardown hook for this request, after the client's.
    pub fn teardown<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ApiResponse) -> HookResult<ApiResponse> + Send + Sync + 'static,
    {
        self.teardown_hooks.push(Arc::new(hook));
        self
    }

    pub fn teardown_hook(mut self, hook: impl Hook<ApiResponse> + 'static) -> Self {
        self.teardown_hooks.push(Arc::new(hook));
        self
    }

    // ----- sending -----

    /// Run setup hooks, send the request and run teardown hooks.
    ///
    /// Responses with a 4xx status are returned normally; 5xx statuses,
    /// transport failures and hook failures are errors. Setup cleanups run
    /// whether or not the request succeeded; teardown hooks only run for a
    /// response.
    pub async fn send(mut self) -> Result<ApiResponse, ApiError> {
        let span = request_span(self.method.as_str(), &self.endpoint);
        let status_span = span.clone();

        async move {
            let mut setup = HookRunner::new(HookPhase::Setup, std::mem::take(&mut self.setup_hooks));
            if let Err(error) = setup.run(&mut self).await {
                setup.cleanup(Some(&error), &mut self).await?;
                return Err(error);
            }

            let mut response = match self.dispatch().await {
                Ok(response) => {
                    setup.cleanup(None, &mut self).await?;
                    response
                }
                Err(error) => {
                    tracing::debug!(%error, "request failed");
                    setup.cleanup(Some(&error), &mut self).await?;
                    return Err(error);
                }
            };
            record_status(&status_span, response.status());

            let mut teardown = HookRunner::new(HookPhase::Teardown, std::mem::take(&mut self.teardown_hooks));
            if let Err(error) = teardown.run(&mut response).await {
                teardown.cleanup(Some(&error), &mut response).await?;
                return Err(error);
            }
            teardown.cleanup(None, &mut response).await?;

            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Headers as sent, including the `Cookie` header.
    fn wire_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = self.headers.clone();

        let prepared = self.cookies.iter().map(|(name, value)| {
            let value = match &self.cookie_serializer {
                Some(serializer) => serializer.prepare(name, value, self),
                None => value.clone(),
            };
            (name.as_str(), value)
        });

        if let Some(cookie_header) = encode_request_cookies(prepared) {
            let value = HeaderValue::from_str(&cookie_header)
                .map_err(|e| ApiError::invalid_header(COOKIE.as_str(), e))?;
            headers.insert(COOKIE, value);
        }

        Ok(headers)
    }

    fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: self.config.connect_timeout(),
            timeout: self.timeout.unwrap_or_else(|| self.config.request_timeout()),
            user_agent: self.config.user_agent.clone(),
            gzip: self.config.gzip,
            max_redirects: self.max_redirects.unwrap_or(self.config.max_redirects),
            tls: self.tls.clone(),
        }
    }

    async fn dispatch(&mut self) -> Result<ApiResponse, ApiError> {
        if let Some(error) = self.deferred_error.take() {
            return Err(error);
        }

        let url = self.url()?;
        let mut headers = self.wire_headers()?;
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = self.body.prepare(content_type.as_deref(), &self.codecs).await?;
        if matches!(body, PreparedBody::Multipart(_)) {
            // The form supplies its own content type with the boundary.
            headers.remove(CONTENT_TYPE);
        }

        if !self.dump_sections.is_empty() {
            dump::request(
                &RequestDump {
                    method: &self.method,
                    url: &url,
                    query: &self.query,
                    timeout: self.timeout,
                    headers: &headers,
                    cookies: &self.cookies,
                    body: body.preview(),
                },
                &self.dump_sections,
            );
        }

        let redirects = RedirectLog::default();
        let client = transport::build_client(&self.transport_options(), &url, redirects.clone())?;

        let mut made = 0;
        loop {
            made += 1;
            redirects.lock().clear();

            let outcome = transport::execute(&client, &self.method, &url, &headers, &body)
                .instrument(attempt_span(made))
                .await
                .and_then(|raw| {
                    let followed = redirects.lock().clone();
                    ApiResponse::from_raw(
                        self.method.clone(),
                        url.clone(),
                        raw,
                        followed,
                        &self.codecs,
                        self.cookie_serializer.as_deref(),
                    )
                });

            let attempt = match &outcome {
                Ok(response) => Attempt::Responded(response),
                Err(error) => Attempt::Failed(error),
            };
            if self.retry.should_retry(made, attempt) {
                tracing::debug!(attempt = made, max = self.retry.max_attempts(), "retrying request");
                continue;
            }

            let response = outcome?;
            if response.has_fatal_error() {
                return Err(ApiError::from_server_response(
                    response.status(),
                    response.text().to_string(),
                ));
            }
            return Ok(response);
        }
    }
}

impl IntoFuture for ApiRequest {
    type Output = Result<ApiResponse, ApiError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ApiError> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ApiError::invalid_header(name, e))?;
    let header_value = HeaderValue::from_str(value).map_err(|e| ApiError::invalid_header(name, e))?;
    Ok((header_name, header_value))
}
