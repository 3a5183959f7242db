//! Client factory holding hooks and defaults shared by its requests.

use crate::cookies::CookieSerializer;
use crate::hooks::{Hook, HookResult};
use crate::request::{ApiRequest, RequestDefaults};
use crate::response::ApiResponse;
use crate::codec::Codecs;
use apitest_config::{ClientConfig, ConfigError, ConfigLoader, Environment};
use reqwest::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with every request the client creates.
pub type RequestHandler = Arc<dyn Fn(&mut ApiRequest) + Send + Sync>;

/// Creates requests against the server under test.
///
/// Hooks and handlers registered on a client apply to the requests it
/// creates afterwards; each request takes a snapshot at creation time.
#[derive(Clone, Default)]
pub struct ApiClient {
    base_url: Option<String>,
    config: ClientConfig,
    setup_hooks: Vec<Arc<dyn Hook<ApiRequest>>>,
    teardown_hooks: Vec<Arc<dyn Hook<ApiResponse>>>,
    request_handlers: Vec<RequestHandler>,
    cookie_serializer: Option<Arc<dyn CookieSerializer>>,
    codecs: Codecs,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .field("setup_hooks", &self.setup_hooks.len())
            .field("teardown_hooks", &self.teardown_hooks.len())
            .field("request_handlers", &self.request_handlers.len())
            .field("codecs", &self.codecs)
            .finish()
    }
}

impl ApiClient {
    /// Create a client. Without a base URL, the configured one is used, then
    /// `APITEST_BASE_URL`, then `http://{HOST}:{PORT}`.
    pub fn new<S: Into<String>>(base_url: Option<S>) -> Self {
        Self {
            base_url: base_url.map(Into::into),
            ..Self::default()
        }
    }

    /// Create a client from explicit configuration.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Load `.env` files and `apitest.yaml` from the working directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(error) = Environment::init() {
            tracing::debug!(%error, "failed to load .env files");
        }
        let config = ConfigLoader::default().load()?;
        Ok(Self::with_config(config))
    }

    /// Base URL requests will be resolved against.
    pub fn base_url(&self) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| self.config.base_url.clone())
            .or_else(Environment::base_url)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register a setup hook.
    pub fn setup<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ApiRequest) -> HookResult<ApiRequest> + Send + Sync + 'static,
    {
        self.setup_hooks.push(Arc::new(hook));
        self
    }

    /// Register a setup hook implemented as a type.
    pub fn setup_hook(&mut self, hook: impl Hook<ApiRequest> + 'static) -> &mut Self {
        self.setup_hooks.push(Arc::new(hook));
        self
    }

    /// Register a teardown hook.
    pub fn teardown<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&mut ApiResponse) -> HookResult<ApiResponse> + Send + Sync + 'static,
    {
        self.teardown_hooks.push(Arc::new(hook));
        self
    }

    /// Register a teardown hook implemented as a type.
    pub fn teardown_hook(&mut self, hook: impl Hook<ApiResponse> + 'static) -> &mut Self {
        self.teardown_hooks.push(Arc::new(hook));
        self
    }

    pub fn clear_setup_hooks(&mut self) -> &mut Self {
        self.setup_hooks.clear();
        self
    }

    pub fn clear_teardown_hooks(&mut self) -> &mut Self {
        self.teardown_hooks.clear();
        self
    }

    pub fn clear_request_handlers(&mut self) -> &mut Self {
        self.request_handlers.clear();
        self
    }

    pub fn setup_hook_count(&self) -> usize {
        self.setup_hooks.len()
    }

    pub fn teardown_hook_count(&self) -> usize {
        self.teardown_hooks.len()
    }

    /// Run `handler` with each new request, e.g. to add default headers.
    pub fn on_request<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut ApiRequest) + Send + Sync + 'static,
    {
        self.request_handlers.push(Arc::new(handler));
        self
    }

    pub fn cookie_serializer(&mut self, serializer: impl CookieSerializer + 'static) -> &mut Self {
        self.cookie_serializer = Some(Arc::new(serializer));
        self
    }

    /// Parse responses of `content_type` with `parser`.
    pub fn parser<F>(&mut self, content_type: &str, parser: F) -> &mut Self
    where
        F: Fn(&[u8]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.codecs.add_parser(content_type, parser);
        self
    }

    pub fn remove_parser(&mut self, content_type: &str) -> &mut Self {
        self.codecs.remove_parser(content_type);
        self
    }

    /// Serialize request bodies of `content_type` with `serializer`.
    pub fn serializer<F>(&mut self, content_type: &str, serializer: F) -> &mut Self
    where
        F: Fn(&Value) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.codecs.add_serializer(content_type, serializer);
        self
    }

    pub fn remove_serializer(&mut self, content_type: &str) -> &mut Self {
        self.codecs.remove_serializer(content_type);
        self
    }

    /// Create a request.
    pub fn request(&self, endpoint: &str, method: Method) -> ApiRequest {
        let defaults = RequestDefaults {
            base_url: self.base_url(),
            config: self.config.clone(),
            setup_hooks: self.setup_hooks.clone(),
            teardown_hooks: self.teardown_hooks.clone(),
            cookie_serializer: self.cookie_serializer.clone(),
            codecs: self.codecs.clone(),
        };

        let mut request = ApiRequest::with_defaults(method, endpoint.to_string(), defaults);
        for handler in &self.request_handlers {
            handler(&mut request);
        }
        request
    }

    pub fn get(&self, endpoint: &str) -> ApiRequest {
        self.request(endpoint, Method::GET)
    }

    pub fn post(&self, endpoint: &str) -> ApiRequest {
        self.request(endpoint, Method::POST)
    }

    pub fn put(&self, endpoint: &str) -> ApiRequest {
        self.request(endpoint, Method::PUT)
    }

    pub fn patch(&self, endpoint: &str) -> ApiRequest {
        self.request(endpoint, Method::PATCH)
    }

    pub fn delete(&self, endpoint: &str) -> ApiRequest {
        self.request(endpoint, Method::DELETE)
    }

    pub fn head(&self, endpoint: &str) -> ApiRequest {
        self.request(endpoint, Method::HEAD)
    }

    pub fn options(&self, endpoint: &str) -> ApiRequest {
        self.request(endpoint, Method::OPTIONS)
    }
}
