//! Error types for the profiles client.
//!
//! # Design
//! Construction problems (`InvalidPath`) surface synchronously while a builder
//! chain is being composed. `MissingParameter` is only raised when a request
//! is finalized, so placeholders may be bound in any order before that point.
//! Everything produced by the remote service or the transport is forwarded
//! as-is; the client never retries.

use thiserror::Error;

/// Errors returned by builders, parsers, batches and transports.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A relative path or concat suffix was rejected while building.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// The URL references an `@name` alias with no matching query parameter.
    #[error("no value bound for placeholder `{0}`")]
    MissingParameter(String),

    /// The server returned 404.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Client configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Batch misuse or a malformed batch response.
    #[error("batch error: {0}")]
    Batch(String),
}

impl ApiError {
    pub(crate) fn invalid_path(path: &str, reason: &'static str) -> Self {
        ApiError::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Deserialization(e.to_string())
    }
}
