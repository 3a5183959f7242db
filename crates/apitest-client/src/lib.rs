//! HTTP client for testing API endpoints.
//!
//! An [`ApiClient`] creates [`ApiRequest`]s; awaiting a request runs its
//! setup hooks, sends it, and runs teardown hooks on the [`ApiResponse`].
//! Responses carry panicking `assert_*` methods for use inside tests.
//!
//! ```ignore
//! let mut client = ApiClient::new(Some("http://localhost:3333"));
//! client.setup(|_request| {
//!     seed_database()?;
//!     Ok(cleanup(|_error, _request| truncate_database()))
//! });
//!
//! let response = client.get("/users").qs("page", 1).await?;
//! response.assert_ok().assert_body_contains(json!([{ "id": 1 }]));
//! ```

pub mod assertions;
pub mod body;
pub mod client;
pub mod codec;
pub mod cookies;
pub mod dump;
pub mod error;
pub mod hooks;
mod links;
pub mod request;
pub mod response;
pub mod retry;
pub mod subset;
mod transport;

pub use body::{Body, FileOptions, FileSource, MultipartPart};
pub use client::{ApiClient, RequestHandler};
pub use codec::{mime, Codecs};
pub use cookies::{CookieSerializer, ResponseCookie, SameSite};
pub use error::ApiError;
pub use hooks::{cleanup, try_cleanup, BoxCleanup, Cleanup, Hook, HookPhase, HookResult, HookRunner};
pub use request::ApiRequest;
pub use response::ApiResponse;
pub use retry::{Attempt, RetryPolicy, RETRYABLE_STATUSES};
pub use transport::TlsOptions;

pub use reqwest::{Method, StatusCode};
