//! Transport Abstraction Layer (§4.3): a sans-I/O-flavored trait over
//! connect/send/receive/disconnect, plus scoped (RAII-style) acquisition.

pub mod http;
pub mod sdk;

pub use http::{HttpTransport, HttpTransportConfig, JitterStrategy};
pub use sdk::{AnthropicAdapter, OpenAiAdapter, SdkAdapter, SdkTransport};

use crate::error::{PynectorError, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A request body shape, first-class rather than pre-encoded by the caller
/// (§4.4 step 1, §6): transports that understand a shape encode it their own
/// way (`reqwest`'s `.json()`/`.form()`/multipart builder for `HttpTransport`).
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Pre-encoded bytes, sent as-is.
    Raw(Bytes),
    /// Serialized as a JSON body with `Content-Type: application/json`.
    Json(serde_json::Value),
    /// Serialized as `application/x-www-form-urlencoded`.
    Form(BTreeMap<String, String>),
    /// Serialized as `multipart/form-data`, one part per `(field name, bytes)`.
    Files(Vec<(String, Bytes)>),
}

/// Per-call options threaded through `send`/`receive`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Per-call override of the transport's default timeout.
    pub timeout: Option<Duration>,
    /// Whether this call is safe to retry if it fails partway through.
    /// Transports default conservatively (`false`) for anything they can't
    /// prove is idempotent; see `HttpTransport`'s method-based override.
    pub retry_ok: bool,
    /// Extra headers merged over any set at construction time.
    pub headers: BTreeMap<String, String>,
    /// HTTP method override (e.g. `"GET"`, `"PUT"`). Transports that don't
    /// have a notion of method ignore this. Default: the transport's own
    /// default (`HttpTransport` defaults to `POST`).
    pub method: Option<String>,
    /// Path relative to the transport's base URL/endpoint.
    pub path: Option<String>,
    /// Query string parameters, merged onto the request URL.
    pub params: BTreeMap<String, String>,
    /// The request body, one of raw bytes, JSON, form, or files. When unset,
    /// transports fall back to the raw `payload` passed to `send`.
    pub body: Option<RequestBody>,
    /// Request a streaming response rather than a single accumulated one.
    /// Only meaningful to transports that distinguish the two (currently
    /// `SdkTransport`); ignored otherwise.
    pub stream: bool,
}

/// Lifecycle state a [`Transport`] implementation tracks and exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Constructed but `connect()` has not (yet) succeeded.
    Disconnected,
    /// `connect()` succeeded; `send`/`receive` are valid.
    Connected,
    /// `disconnect()` has run; the transport must not be reused.
    Closed,
}

impl TransportState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TransportState::Disconnected,
            1 => TransportState::Connected,
            _ => TransportState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TransportState::Disconnected => 0,
            TransportState::Connected => 1,
            TransportState::Closed => 2,
        }
    }
}

/// Atomic holder for [`TransportState`], shared by implementations that need
/// `Send + Sync` interior state tracking without a lock.
#[derive(Debug, Default)]
pub struct TransportStateCell(AtomicU8);

impl TransportStateCell {
    /// Start in the `Disconnected` state.
    pub fn new() -> Self {
        Self(AtomicU8::new(TransportState::Disconnected.as_u8()))
    }

    /// Current state.
    pub fn get(&self) -> TransportState {
        TransportState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Overwrite the state.
    pub fn set(&self, state: TransportState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }
}

/// Abstraction over a connection-oriented transport: HTTP, a vendor SDK
/// adapter, or (in tests) an in-memory mock.
///
/// Object-safe so the registry and client can hold `Arc<dyn Transport>`
/// without knowing the concrete implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish whatever connection/session this transport needs. Called at
    /// most once per instance by [`crate::client::Client`]'s lazy init.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Send a payload of raw bytes. Must be safe to call only while
    /// `state() == Connected`. Callers that want structured `Message`
    /// framing encode it first via [`crate::message`]'s `serialize_*`
    /// functions.
    async fn send(&self, payload: Bytes, options: &SendOptions) -> Result<(), TransportError>;

    /// A lazy, one-shot stream of response chunks. Finite and not
    /// restartable: calling `receive` again after the stream returned by a
    /// prior call was exhausted is implementation-defined. Streaming
    /// responses are never buffered here into a single `Vec<u8>` —
    /// accumulation into one `Bytes` is the client façade's job.
    fn receive(&self, options: &SendOptions) -> BoxStream<'_, Result<Bytes, TransportError>>;

    /// Release any held resources. Implementations must make this
    /// idempotent: called twice (once explicitly, once from a `Drop`-driven
    /// safety net) must not panic or double-free.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Current lifecycle state.
    fn state(&self) -> TransportState;

    /// Human-readable name for diagnostics/telemetry.
    fn name(&self) -> &'static str;
}

/// RAII guard around an `Arc<dyn Transport>` that enforces the "disconnect
/// runs on every exit path" invariant (§4.3).
///
/// The happy path is an explicit `.close().await`. Because Rust has no async
/// `Drop`, the guard's `Drop` impl is a best-effort fallback: if `close` was
/// never called (early return, `?`, or panic unwind), it spawns a detached
/// task that calls `disconnect()` and logs a warning through telemetry if
/// that fails, rather than silently leaking the connection.
pub struct ScopedTransport {
    transport: Arc<dyn Transport>,
    telemetry: crate::telemetry::Telemetry,
    closed: bool,
}

impl ScopedTransport {
    /// Connect and wrap the result in a scope. On failure the transport is
    /// never handed back to the caller, so there is nothing to clean up.
    pub async fn acquire(
        transport: Arc<dyn Transport>,
        telemetry: crate::telemetry::Telemetry,
    ) -> Result<Self, PynectorError> {
        transport.connect().await?;
        Ok(Self {
            transport,
            telemetry,
            closed: false,
        })
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Disconnect explicitly. Safe to call more than once.
    pub async fn close(mut self) -> Result<(), PynectorError> {
        self.closed = true;
        self.transport.disconnect().await?;
        Ok(())
    }
}

impl Drop for ScopedTransport {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let transport = self.transport.clone();
        let telemetry = self.telemetry.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.disconnect().await {
                telemetry.logger().warning(
                    "transport disconnect on drop failed",
                    &[("error", crate::telemetry::FieldValue::from(e.to_string()))],
                );
            }
        });
    }
}

/// A transport factory, registered in a [`crate::registry::TransportRegistry`]
/// under a name (`"http"`, `"openai"`, `"anthropic"`, ...).
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Build a new transport instance from a configuration map.
    async fn create(
        &self,
        config: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn Transport>, crate::error::ConfigurationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_state_round_trips_through_u8() {
        for state in [
            TransportState::Disconnected,
            TransportState::Connected,
            TransportState::Closed,
        ] {
            assert_eq!(TransportState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_transport_state_cell_starts_disconnected() {
        let cell = TransportStateCell::new();
        assert_eq!(cell.get(), TransportState::Disconnected);
        cell.set(TransportState::Connected);
        assert_eq!(cell.get(), TransportState::Connected);
    }
}
