//! Errors raised by the text-completion capability.

use thiserror::Error;

/// Failure of a single completion request.
///
/// The client never retries on its own; callers fold these into their own
/// retry budget.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP 429. `retry_after_ms` comes from the `retry-after` header when present.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other non-2xx status, with the response body as the message.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The provider answered 2xx but with no usable text.
    #[error("completion response contained no text")]
    EmptyResponse,

    #[error("completion timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}
