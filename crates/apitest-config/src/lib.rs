//! Configuration types for apitest.
//!
//! A [`ClientConfig`] decides where requests go and how the underlying
//! transport behaves. It can be built by hand, loaded from an
//! `apitest.yaml` file, or assembled from environment variables.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;
