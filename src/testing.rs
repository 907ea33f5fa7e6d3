//! Test-support transports and adapters, kept alongside production code so
//! downstream consumers can write deterministic tests against this crate
//! without a live endpoint.
//!
//! # Example
//!
//! ```
//! use pynector::testing::MockTransport;
//!
//! let mock = MockTransport::fixed(b"hello".to_vec());
//! ```

use crate::error::TransportError;
use crate::transport::sdk::{SdkAdapter, SdkRequest};
use crate::transport::{SendOptions, Transport, TransportState, TransportStateCell};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A transport that replays pre-configured response bodies in order,
/// cycling back to the start once every response has been returned.
///
/// An optional per-call delay lets tests exercise timeout/cancellation
/// paths deterministically instead of racing a real network call.
pub struct MockTransport {
    responses: Vec<Bytes>,
    index: AtomicUsize,
    delay: Option<Duration>,
    state: TransportStateCell,
    connect_calls: AtomicUsize,
    send_calls: AtomicUsize,
    receive_calls: AtomicUsize,
}

impl MockTransport {
    /// Create a mock transport with the given canned response bodies.
    ///
    /// Responses are returned in order. When exhausted, cycles from the
    /// beginning.
    pub fn new(responses: Vec<Bytes>) -> Self {
        assert!(!responses.is_empty(), "MockTransport requires at least one response");
        Self {
            responses,
            index: AtomicUsize::new(0),
            delay: None,
            state: TransportStateCell::new(),
            connect_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            receive_calls: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<Bytes>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Add an artificial delay before every `receive()` yields its item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `receive()` has been called so far.
    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    /// How many times `send()` has been called so far.
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Bytes {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        self.responses[idx].clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.state.set(TransportState::Connected);
        Ok(())
    }

    async fn send(&self, _payload: Bytes, _options: &SendOptions) -> Result<(), TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn receive(&self, _options: &SendOptions) -> BoxStream<'_, Result<Bytes, TransportError>> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let body = self.next_response();
        let delay = self.delay;
        stream::once(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(body)
        })
        .boxed()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.state.set(TransportState::Closed);
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// An [`SdkAdapter`] that replays canned response bodies, for testing
/// `SdkTransport` call sites without a live vendor endpoint.
pub struct MockAdapter {
    responses: Vec<Bytes>,
    index: AtomicUsize,
}

impl MockAdapter {
    /// Create a mock adapter with the given canned response bodies. Cycles
    /// from the beginning once exhausted.
    pub fn new(responses: Vec<Bytes>) -> Self {
        assert!(!responses.is_empty(), "MockAdapter requires at least one response");
        Self {
            responses,
            index: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<Bytes>) -> Self {
        Self::new(vec![response.into()])
    }

    fn next_response(&self) -> Bytes {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        self.responses[idx].clone()
    }
}

#[async_trait]
impl SdkAdapter for MockAdapter {
    async fn complete(&self, _client: &Client, _request: &SdkRequest) -> Result<Bytes, TransportError> {
        Ok(self.next_response())
    }

    async fn stream(
        &self,
        _client: &Client,
        _request: &SdkRequest,
    ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError> {
        let body = self.next_response();
        Ok(stream::once(async move { Ok(body) }).boxed())
    }

    fn resolve_auth(&self, _explicit: &Option<String>) -> Result<String, TransportError> {
        Ok("mock-auth".to_string())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct DecrementOnDrop<'a>(&'a AtomicUsize);

impl Drop for DecrementOnDrop<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Wraps any [`Transport`] and tracks the maximum number of `receive()`
/// streams that were in flight (staged but not yet exhausted or dropped) at
/// the same time, to verify a bounded-concurrency guarantee end-to-end.
pub struct CountingAdapter {
    inner: std::sync::Arc<dyn Transport>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingAdapter {
    /// Wrap `inner`, counting its concurrent `receive()` streams.
    pub fn new(inner: std::sync::Arc<dyn Transport>) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// The highest number of `receive()` streams observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CountingAdapter {
    async fn connect(&self) -> Result<(), TransportError> {
        self.inner.connect().await
    }

    async fn send(&self, payload: Bytes, options: &SendOptions) -> Result<(), TransportError> {
        self.inner.send(payload, options).await
    }

    fn receive(&self, options: &SendOptions) -> BoxStream<'_, Result<Bytes, TransportError>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let guard = DecrementOnDrop(&self.in_flight);
        let inner = self.inner.receive(options);
        stream::unfold((inner, Some(guard)), |(mut inner, mut guard)| async move {
            match inner.next().await {
                Some(item) => Some((item, (inner, guard))),
                None => {
                    guard.take();
                    None
                }
            }
        })
        .boxed()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.disconnect().await
    }

    fn state(&self) -> TransportState {
        self.inner.state()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
