//! Error taxonomy shared by every layer: transport, message codec, concurrency,
//! telemetry, and the client façade.

use std::time::Duration;
use thiserror::Error;

/// Failures raised by a [`Transport`](crate::transport::Transport) implementation.
///
/// Root of the taxonomy: transports only ever raise one of these variants,
/// and the client façade translates timeouts into its own [`TimeoutError`]
/// at the boundary while preserving the cause.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Transport not reachable (DNS/TCP/TLS failure).
    #[error("connection failed: {0}")]
    Connection(String),

    /// `connect()` exceeded its deadline.
    #[error("connect timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// `receive()` exceeded its deadline.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// `send()` exceeded its deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// Malformed response or message codec failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Message serialize/deserialize failure. A subtype of [`TransportError::Protocol`].
    #[error("message codec error: {0}")]
    Message(#[from] MessageError),

    /// 401-class: identity invalid.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// 403-class: identity valid but denied.
    #[error("permission denied: {0}")]
    Permission(String),

    /// 429 or provider overload. May carry a server-suggested cooldown.
    #[error("rate limited{}", retry_after.map(|d| format!(" (retry after {d:?})")).unwrap_or_default())]
    RateLimit {
        /// Server-suggested retry delay, if one was provided.
        retry_after: Option<Duration>,
    },

    /// 413-class.
    #[error("request too large: {0}")]
    RequestTooLarge(String),

    /// Any other 4xx.
    #[error("invalid request ({status}): {body}")]
    InvalidRequest {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// 5xx.
    #[error("server error ({status}): {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Reserved for a future circuit breaker. Never constructed by the
    /// algorithms in this crate.
    #[error("circuit open")]
    CircuitOpen,
}

impl TransportError {
    /// HTTP status code this error was classified from, when known.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Authentication(_) => Some(401),
            TransportError::Permission(_) => Some(403),
            TransportError::RateLimit { .. } => Some(429),
            TransportError::RequestTooLarge(_) => Some(413),
            TransportError::InvalidRequest { status, .. } => Some(*status),
            TransportError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify an HTTP status + body into the taxonomy (§4.4 step 3).
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 => TransportError::Authentication(body),
            403 => TransportError::Permission(body),
            404 => TransportError::InvalidRequest { status, body },
            413 => TransportError::RequestTooLarge(body),
            429 => TransportError::RateLimit { retry_after },
            400..=499 => TransportError::InvalidRequest { status, body },
            500..=599 => TransportError::Server { status, body },
            _ => TransportError::Protocol(format!("unexpected status {status}: {body}")),
        }
    }
}

/// Message codec failures (§4.2).
#[derive(Error, Debug)]
pub enum MessageError {
    /// Serialization to bytes failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Deserialization from bytes failed.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

/// Invalid construction options for a transport, registry, or client.
#[derive(Error, Debug)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

impl ConfigurationError {
    /// Construct from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// A deadline fired at the client façade boundary.
///
/// Distinct from the transport-level `*TimeoutError` variants: this is what
/// callers of [`Client::request`](crate::client::Client::request) see,
/// regardless of which phase (connect/send/receive) actually timed out.
#[derive(Error, Debug)]
#[error("operation timed out after {elapsed:?}")]
pub struct TimeoutError {
    /// How long the client waited before giving up.
    pub elapsed: Duration,
    /// The transport-level error that was superseded by the deadline, if any.
    #[source]
    pub cause: Option<TransportError>,
}

impl TimeoutError {
    /// Construct a timeout with no known transport-level cause.
    pub fn new(elapsed: Duration) -> Self {
        Self {
            elapsed,
            cause: None,
        }
    }

    /// Construct a timeout that supersedes a transport-level error.
    pub fn with_cause(elapsed: Duration, cause: TransportError) -> Self {
        Self {
            elapsed,
            cause: Some(cause),
        }
    }
}

/// Root error type for the client façade.
///
/// Errors propagate unchanged across layers except timeouts, which the
/// client translates into [`PynectorError::Timeout`] while preserving the
/// cause chain, and cancellation, which is a signal rather than a failure
/// mode (see [`crate::concurrency`]) but is given a concrete `Err` arm here
/// so `request`/`batch_request` callers have something to match on when a
/// call they were waiting on was cancelled out from under them.
#[derive(Error, Debug)]
pub enum PynectorError {
    /// A transport raised an error that was not a timeout.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Construction-time misconfiguration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A deadline fired at the client boundary.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The operation was cancelled before it completed.
    #[error("operation was cancelled")]
    Cancelled,

    /// Multiple children of a task group failed; see [`crate::concurrency::TaskGroupError`].
    #[error(transparent)]
    TaskGroup(#[from] crate::concurrency::TaskGroupError),

    /// Catch-all for errors that don't fit another variant (e.g. adapter
    /// translation failures, bridged `anyhow` errors at the outermost edge).
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PynectorError {
    fn from(err: anyhow::Error) -> Self {
        PynectorError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for PynectorError {
    fn from(err: reqwest::Error) -> Self {
        PynectorError::Transport(TransportError::Connection(err.to_string()))
    }
}

/// Result alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, PynectorError>;
