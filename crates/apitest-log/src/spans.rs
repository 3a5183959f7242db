use tracing::{debug_span, info_span, Span};

/// Span covering one request from setup hooks to teardown cleanup.
pub fn request_span(method: &str, url: &str) -> Span {
    info_span!("api_request", method = %method, url = %url, status = tracing::field::Empty)
}

/// Span covering one hook phase.
pub fn hook_span(phase: &str) -> Span {
    debug_span!("hooks", phase = %phase)
}

/// Span covering one transport attempt.
pub fn attempt_span(attempt: u32) -> Span {
    debug_span!("attempt", n = attempt)
}

/// Record the response status on a request span.
pub fn record_status(span: &Span, status: u16) {
    span.record("status", status);
}
