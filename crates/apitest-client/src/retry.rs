//! Retry policy for transport failures and transient statuses.

use crate::error::ApiError;
use crate::response::ApiResponse;
use std::fmt;
use std::sync::Arc;

/// Statuses retried when no predicate is given.
pub const RETRYABLE_STATUSES: [u16; 10] = [408, 413, 429, 500, 502, 503, 504, 521, 522, 524];

/// Outcome of one attempt, as seen by a retry predicate.
#[derive(Debug, Clone, Copy)]
pub enum Attempt<'a> {
    /// No usable response: connection failure, timeout, unparsable body.
    Failed(&'a ApiError),
    Responded(&'a ApiResponse),
}

/// Decides whether an attempt should be retried.
pub type RetryPredicate = Arc<dyn Fn(Attempt<'_>) -> bool + Send + Sync>;

/// How many times a request is retried, and when.
#[derive(Clone, Default)]
pub struct RetryPolicy {
    count: u32,
    until: Option<RetryPredicate>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("count", &self.count)
            .field("until", &self.until.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl RetryPolicy {
    /// Retry up to `count` times on connection failures and transient statuses.
    pub fn new(count: u32) -> Self {
        Self { count, until: None }
    }

    /// Retry up to `count` times while `predicate` returns true.
    pub fn until<F>(count: u32, predicate: F) -> Self
    where
        F: Fn(Attempt<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            count,
            until: Some(Arc::new(predicate)),
        }
    }

    /// Number of retries.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }

    /// Whether another attempt should follow `attempt`, the `made`th attempt.
    pub fn should_retry(&self, made: u32, attempt: Attempt<'_>) -> bool {
        if made >= self.max_attempts() {
            return false;
        }

        match &self.until {
            Some(predicate) => predicate(attempt),
            None => match attempt {
                Attempt::Failed(error) => error.is_connection_failure(),
                Attempt::Responded(response) => RETRYABLE_STATUSES.contains(&response.status()),
            },
        }
    }
}
