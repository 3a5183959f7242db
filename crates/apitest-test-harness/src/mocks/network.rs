//! HTTP mocking utilities using wiremock.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// HTTP mock server wrapper with convenience methods
pub struct TestHttpServer {
    server: MockServer,
}

impl TestHttpServer {
    /// Start a new mock server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get URL for a specific path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Access the underlying MockServer
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Mount a prepared mock
    pub async fn mount(&self, mock: Mock) {
        mock.mount(&self.server).await;
    }

    /// Respond to `verb` requests on `endpoint` with `response`
    pub async fn respond(&self, verb: &str, endpoint: &str, response: ResponseTemplate) {
        Mock::given(method(verb))
            .and(path(endpoint))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Register a GET endpoint that returns JSON
    pub async fn get_json<T: Serialize>(&self, endpoint: &str, response: &T) {
        self.respond("GET", endpoint, ResponseTemplate::new(200).set_body_json(response))
            .await;
    }

    /// Register a POST endpoint that returns JSON
    pub async fn post_json<T: Serialize>(&self, endpoint: &str, response: &T) {
        self.respond("POST", endpoint, ResponseTemplate::new(200).set_body_json(response))
            .await;
    }

    /// Register an endpoint that echoes every request back as JSON.
    ///
    /// See [`responders::echo`] for the shape of the body.
    pub async fn echo(&self, endpoint: &str) {
        Mock::given(path(endpoint))
            .respond_with(responders::echo)
            .mount(&self.server)
            .await;
    }

    /// Register an endpoint that returns an error
    pub async fn error(&self, endpoint: &str, status: u16, message: &str) {
        Mock::given(path(endpoint))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(serde_json::json!({ "error": message })),
            )
            .mount(&self.server)
            .await;
    }

    /// Register an endpoint with simulated latency
    pub async fn with_latency<T: Serialize>(
        &self,
        endpoint: &str,
        response: &T,
        latency: Duration,
    ) {
        Mock::given(path(endpoint))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(response)
                    .set_delay(latency),
            )
            .mount(&self.server)
            .await;
    }

    /// Register a sequence of responses, served one per request in order.
    ///
    /// Once the sequence is exhausted the endpoint falls through to any other
    /// mock (or wiremock's 404).
    pub async fn sequence(&self, endpoint: &str, responses: Vec<ResponseTemplate>) {
        for (i, response) in responses.into_iter().enumerate() {
            Mock::given(path(endpoint))
                .respond_with(response)
                .up_to_n_times(1)
                // Lower values match first; wiremock rejects 0.
                .with_priority((i + 1) as u8)
                .mount(&self.server)
                .await;
        }
    }

    /// Verify that a request was received
    pub async fn verify_received(&self, endpoint: &str, times: u64) {
        let count = self.requests_to(endpoint).await.len() as u64;
        assert_eq!(
            count, times,
            "Expected {} requests to {}, got {}",
            times, endpoint, count
        );
    }

    /// Get all received requests
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received on one path
    pub async fn requests_to(&self, endpoint: &str) -> Vec<Request> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == endpoint)
            .collect()
    }

    /// Most recent request, if any
    pub async fn last_request(&self) -> Option<Request> {
        self.received_requests().await.pop()
    }

    /// Clear all mocks and recorded requests
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}

/// Builder for complex mock setups
pub struct MockBuilder {
    method: String,
    path_pattern: Option<String>,
    headers: Vec<(String, String)>,
    query_params: Vec<(String, String)>,
    body_matcher: Option<Value>,
}

impl MockBuilder {
    fn new(verb: &str, path: &str) -> Self {
        Self {
            method: verb.into(),
            path_pattern: Some(path.into()),
            headers: Vec::new(),
            query_params: Vec::new(),
            body_matcher: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: &str) -> Self {
        Self::new("POST", path)
    }

    pub fn put(path: &str) -> Self {
        Self::new("PUT", path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new("PATCH", path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new("DELETE", path)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    pub fn with_json_body(mut self, body: Value) -> Self {
        self.body_matcher = Some(body);
        self
    }

    pub fn respond_with(self, response: ResponseTemplate) -> MockSetup {
        MockSetup {
            builder: self,
            response,
        }
    }

    pub fn respond_json<T: Serialize>(self, status: u16, body: &T) -> MockSetup {
        self.respond_with(ResponseTemplate::new(status).set_body_json(body))
    }
}

pub struct MockSetup {
    builder: MockBuilder,
    response: ResponseTemplate,
}

impl MockSetup {
    pub async fn mount(self, server: &TestHttpServer) {
        let mut mock = Mock::given(method(self.builder.method.as_str()));

        if let Some(path_pattern) = &self.builder.path_pattern {
            mock = mock.and(path(path_pattern.as_str()));
        }

        for (name, value) in &self.builder.headers {
            mock = mock.and(header(name.as_str(), value.as_str()));
        }

        for (name, value) in &self.builder.query_params {
            mock = mock.and(query_param(name.as_str(), value.as_str()));
        }

        if let Some(body) = &self.builder.body_matcher {
            mock = mock.and(body_json(body));
        }

        mock.respond_with(self.response).mount(server.inner()).await;
    }
}

/// Responders computing the response from the request
pub mod responders {
    use super::*;

    fn insert_repeated(map: &mut Map<String, Value>, key: String, value: String) {
        let value = Value::String(value);
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }

    /// Describe the request as JSON.
    ///
    /// ```text
    /// { "method", "path", "query": {..}, "headers": {..}, "body": "<text>", "json": <parsed or null> }
    /// ```
    /// Repeated query keys and headers become arrays.
    pub fn describe(request: &Request) -> Value {
        let mut query = Map::new();
        for (key, value) in request.url.query_pairs() {
            insert_repeated(&mut query, key.into_owned(), value.into_owned());
        }

        let mut headers = Map::new();
        for (name, value) in request.headers.iter() {
            insert_repeated(
                &mut headers,
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }

        json!({
            "method": request.method.as_str(),
            "path": request.url.path(),
            "query": query,
            "headers": headers,
            "body": String::from_utf8_lossy(&request.body),
            "json": serde_json::from_slice::<Value>(&request.body).unwrap_or(Value::Null),
        })
    }

    /// Respond 200 with [`describe`] of the request.
    pub fn echo(request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(describe(request))
    }

    /// Respond with the request body and content type unchanged.
    pub fn mirror(request: &Request) -> ResponseTemplate {
        let content_type = request
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        ResponseTemplate::new(200).set_body_raw(request.body.clone(), &content_type)
    }
}

/// Common response templates
pub mod responses {
    use super::*;

    pub fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200)
    }

    pub fn created() -> ResponseTemplate {
        ResponseTemplate::new(201)
    }

    pub fn no_content() -> ResponseTemplate {
        ResponseTemplate::new(204)
    }

    pub fn json<T: Serialize>(status: u16, body: &T) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(body)
    }

    pub fn text(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/plain")
    }

    pub fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
    }

    /// 302 to `location`.
    pub fn redirect(location: &str) -> ResponseTemplate {
        ResponseTemplate::new(302).insert_header("Location", location)
    }

    /// 200 with one `Set-Cookie` header per entry.
    pub fn with_cookies(set_cookies: &[&str]) -> ResponseTemplate {
        set_cookies
            .iter()
            .fold(ResponseTemplate::new(200), |template, cookie| {
                template.append_header("Set-Cookie", *cookie)
            })
    }

    pub fn not_found() -> ResponseTemplate {
        ResponseTemplate::new(404)
            .set_body_json(serde_json::json!({ "error": "Not found" }))
    }

    pub fn rate_limited(retry_after: u32) -> ResponseTemplate {
        ResponseTemplate::new(429)
            .insert_header("Retry-After", retry_after.to_string())
            .set_body_json(serde_json::json!({ "error": "Rate limited" }))
    }

    pub fn server_error() -> ResponseTemplate {
        ResponseTemplate::new(500)
            .set_body_json(serde_json::json!({ "error": "Internal server error" }))
    }

    /// 500 whose body is a stack trace.
    pub fn server_error_with_stack(message: &str) -> ResponseTemplate {
        let body = format!(
            "Error: {}\n    at handler (/app/routes/users.js:42:11)\n    at Layer.handle (/app/node_modules/router/layer.js:95:5)",
            message
        );
        ResponseTemplate::new(500).set_body_raw(body.into_bytes(), "text/plain")
    }

    pub fn unavailable() -> ResponseTemplate {
        ResponseTemplate::new(503).set_body_raw(b"maintenance".to_vec(), "text/plain")
    }

    pub fn timeout(delay: Duration) -> ResponseTemplate {
        ResponseTemplate::new(200).set_delay(delay)
    }
}
