//! Error types for `send` and the URL normalizer.
//!
//! # Design
//! Every failure is call-scoped and returned to the caller unchanged. Errors
//! produced by caller-supplied handlers come back exactly as the handler
//! returned them; `Other` exists so those handlers can carry arbitrary
//! error types through without a dedicated variant.

use std::io;

use http::StatusCode;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reasons a [`Context`](crate::Context) stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The context (or one of its parents) was cancelled.
    #[error("context canceled")]
    Canceled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by [`Client::send`](crate::Client::send).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A struct body could not be serialized to JSON or XML.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The method or URL could not be turned into a request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The caller's context was cancelled or timed out.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The transport failed to complete the round-trip.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The server answered with something other than `200 OK`. Displays as
    /// the status line, e.g. `404 Not Found`.
    #[error("{0}")]
    Status(StatusCode),

    /// Reading the response body failed.
    #[error("reading response body: {0}")]
    Read(#[from] io::Error),

    /// The response body is larger than the configured bound.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    /// The response body could not be decoded into the target type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A raw URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An error produced by a caller-supplied handler.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary error, typically from a custom response handler.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Other(err.into())
    }

    /// The HTTP status carried by a [`Error::Status`], if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status(status) => Some(*status),
            _ => None,
        }
    }

    /// Whether this error came from the caller's context rather than the
    /// network or the server.
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Context(_))
    }
}
