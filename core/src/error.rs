//! Error types for the request-execution adapter.
//!
//! # Design
//! Failures are split by *when* they happen. `EncodingError` covers
//! everything that goes wrong while building a request, before the transport
//! is contacted. `ResponseError` covers everything after dispatch: transport
//! failures, cancellation, and status codes outside the accepted range.
//! Neither is ever returned from `dispatch`; both travel inside
//! `NetworkResponse` through the completion callback.

use thiserror::Error;

/// Boxed error produced by caller-supplied encoders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A request could not be built. The transport was never contacted.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The base URL, endpoint, or composed URL does not parse.
    #[error("invalid url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A header name or value is not valid HTTP.
    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    /// A multipart part declared a MIME type the transport rejects.
    #[error("invalid mime type `{mime_type}` for multipart field `{field}`")]
    InvalidMimeType { field: String, mime_type: String },

    /// Parameters could not be serialized to JSON.
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport refused to assemble the request.
    #[error("failed to build request: {0}")]
    Request(#[source] reqwest::Error),

    /// A custom parameter encoder failed.
    #[error("custom encoding failed: {0}")]
    Custom(#[source] BoxError),
}

/// A dispatched request did not complete successfully.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The transport failed: connectivity, TLS, timeout, redirect loop.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response body could not be read to the end.
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The server answered with a status outside the accepted range.
    #[error("response status {status} is outside the accepted range {accepted:?}")]
    UnacceptableStatus {
        status: u16,
        accepted: std::ops::Range<u16>,
    },

    /// The caller cancelled the request before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The request task ended without reporting an outcome, e.g. because
    /// its runtime shut down.
    #[error("request aborted before completion")]
    Aborted,
}

impl ResponseError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResponseError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            ResponseError::Transport(err) | ResponseError::Body(err) => err.is_timeout(),
            _ => false,
        }
    }
}

/// The transport session could not be created.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid default header `{name}`")]
    InvalidHeader { name: String },

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    /// No Tokio runtime to run requests on.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// A configuration value could not be read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value `{value}`")]
    InvalidEnv { name: &'static str, value: String },
}
