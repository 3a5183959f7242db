//! apitest Test Harness
//!
//! Shared testing utilities for the apitest crates: a wiremock-backed HTTP
//! server with canned responses, and assertion helpers.

pub mod assertions;
pub mod mocks;

/// Initialize tracing for tests. Safe to call from every test.
pub fn init() {
    apitest_log::init_for_tests();
}
