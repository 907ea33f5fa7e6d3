//! Client Façade (§4.9): lazy, race-free transport acquisition plus
//! single-request and batch dispatch over the Concurrency Core.
//!
//! A lazily built client with a builder returning `Self`, owning a
//! registry-constructed [`Transport`] instead of a fixed backend.

use crate::concurrency::{fail_after, CancelScope, CapacityLimiter, TaskGroup};
use crate::config::{self, ConfigMap};
use crate::error::{PynectorError, TimeoutError, TransportError};
use crate::registry::TransportRegistry;
use crate::telemetry::{FieldValue, Telemetry};
use crate::transport::{SendOptions, Transport};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Resolved, instance-level client configuration (§0/§4.9 lookup chain).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Default per-request timeout when `SendOptions::timeout` is unset.
    pub timeout: Duration,
    /// Default `batch_request` concurrency cap when `BatchOptions::max_concurrency` is unset.
    pub max_concurrency: usize,
}

impl ClientConfig {
    /// Resolve every field through [`config::lookup`]'s
    /// instance → env → default chain.
    pub fn resolve(instance: &ConfigMap) -> Result<Self, crate::error::ConfigurationError> {
        let timeout_secs: u64 = config::lookup(instance, "timeout", 10)?;
        let max_concurrency: usize = config::lookup(instance, "max_concurrency", 8)?;
        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            max_concurrency,
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_concurrency: 8,
        }
    }
}

/// Options for [`Client::batch_request`].
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Caps how many requests run concurrently. Defaults to the client's
    /// resolved `max_concurrency` when unset.
    pub max_concurrency: Option<usize>,
    /// If `true`, the first child failure cancels the remaining requests
    /// (via the underlying `TaskGroup`'s first-failure cancellation).
    pub raise_on_error: bool,
    /// Per-request timeout override for every request in the batch.
    pub timeout: Option<Duration>,
}

/// Transport-agnostic client façade.
///
/// `transport` is lazily, race-free initialized: two concurrent first
/// callers to [`Client::request`] result in exactly one `connect()` call,
/// via `OnceCell::get_or_try_init`.
pub struct Client {
    transport: OnceCell<Arc<dyn Transport>>,
    prebuilt: Option<Arc<dyn Transport>>,
    owns_transport: bool,
    registry: Arc<TransportRegistry>,
    transport_name: String,
    transport_options: BTreeMap<String, String>,
    telemetry: Telemetry,
    config: ClientConfig,
}

impl Client {
    /// Start building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    async fn ensure_transport(&self) -> Result<Arc<dyn Transport>, PynectorError> {
        let transport = self
            .transport
            .get_or_try_init(|| async {
                let transport: Arc<dyn Transport> = match &self.prebuilt {
                    Some(t) => t.clone(),
                    None => {
                        self.registry
                            .create_transport(&self.transport_name, &self.transport_options)
                            .await?
                    }
                };
                transport.connect().await?;
                Ok::<_, PynectorError>(transport)
            })
            .await?;
        Ok(transport.clone())
    }

    /// Send one request and accumulate the response into a single `Bytes`.
    ///
    /// Opens a `"pynector.request"` span, applies the per-call (or
    /// configured default) timeout via `fail_after`, and translates a
    /// transport-level timeout into the façade's [`TimeoutError`].
    pub async fn request(&self, data: Bytes, options: SendOptions) -> Result<Bytes, PynectorError> {
        let transport = self.ensure_transport().await?;
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        self.send_and_receive(transport, data, options, timeout, &CancelScope::new())
            .await
    }

    async fn send_and_receive(
        &self,
        transport: Arc<dyn Transport>,
        data: Bytes,
        options: SendOptions,
        timeout: Duration,
        scope: &CancelScope,
    ) -> Result<Bytes, PynectorError> {
        let span = self.telemetry.tracer().start_span("pynector.request");
        let outcome = span
            .in_scope_async(fail_after(timeout, scope, async {
                transport.send(data, &options).await?;
                let mut stream = transport.receive(&options);
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok::<Bytes, TransportError>(buffer.freeze())
            }))
            .await;

        match outcome {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(transport_err)) => {
                span.record_error(&transport_err.to_string());
                Err(translate_transport_error(transport_err))
            }
            Err(pynector_err) => {
                span.record_error(&pynector_err.to_string());
                Err(pynector_err)
            }
        }
    }

    /// Dispatch `requests` concurrently, writing each result into its own
    /// index so completion order never matters. Uses a `TaskGroup` whose
    /// first-failure cancellation `raise_on_error` opts into.
    pub async fn batch_request(
        &self,
        requests: Vec<(Bytes, SendOptions)>,
        opts: BatchOptions,
    ) -> Vec<Result<Bytes, PynectorError>> {
        let n = requests.len();
        self.telemetry.tracer().start_as_current_span("pynector.batch_request", || {
            self.telemetry
                .logger()
                .info("starting batch request", &[("request.count", FieldValue::from(n as i64))]);
        });

        let transport = match self.ensure_transport().await {
            Ok(t) => t,
            Err(e) => return (0..n).map(|_| Err(PynectorError::Other(e.to_string()))).collect(),
        };

        let timeout = opts.timeout.unwrap_or(self.config.timeout);
        let max_concurrency = opts.max_concurrency.unwrap_or(self.config.max_concurrency);
        let limiter = Arc::new(CapacityLimiter::new(max_concurrency.max(1)));
        let results: Arc<Vec<StdMutex<Option<Result<Bytes, PynectorError>>>>> =
            Arc::new((0..n).map(|_| StdMutex::new(None)).collect());
        let ctx = self.telemetry.capture_context();

        let mut group = TaskGroup::new();
        for (index, (data, options)) in requests.into_iter().enumerate() {
            let transport = transport.clone();
            let telemetry = self.telemetry.clone();
            let results = results.clone();
            let limiter = limiter.clone();
            let ctx = ctx.clone();
            let raise_on_error = opts.raise_on_error;

            group.spawn(move |scope| {
                ctx.instrument(async move {
                    let _permit = limiter.acquire().await;
                    let client_span = telemetry.tracer().start_span("pynector.request");
                    let outcome = client_span
                        .in_scope_async(fail_after(timeout, &scope, async {
                            transport.send(data, &options).await?;
                            let mut stream = transport.receive(&options);
                            let mut buffer = BytesMut::new();
                            while let Some(chunk) = stream.next().await {
                                buffer.extend_from_slice(&chunk?);
                            }
                            Ok::<Bytes, TransportError>(buffer.freeze())
                        }))
                        .await;

                    let result = match outcome {
                        Ok(Ok(bytes)) => Ok(bytes),
                        Ok(Err(e)) => Err(translate_transport_error(e)),
                        Err(e) => Err(e),
                    };

                    let failed = result.is_err();
                    *results[index].lock().expect("result mutex poisoned") = Some(result);

                    if failed && raise_on_error {
                        return Err(PynectorError::Other(format!(
                            "batch request {index} failed"
                        )));
                    }
                    Ok(())
                })
            });
        }

        let _ = group.join().await;

        let results = Arc::try_unwrap(results)
            .unwrap_or_else(|_| panic!("batch request child task outlived group.join()"));
        results
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .expect("result mutex poisoned")
                    .unwrap_or_else(|| Err(PynectorError::Cancelled))
            })
            .collect()
    }

    /// Disconnect the transport if this client constructed it itself.
    /// A no-op when the caller supplied a transport they own via
    /// [`ClientBuilder::transport`].
    pub async fn close(&self) -> Result<(), PynectorError> {
        if !self.owns_transport {
            return Ok(());
        }
        if let Some(transport) = self.transport.get() {
            transport.disconnect().await?;
        }
        Ok(())
    }
}

fn translate_transport_error(err: TransportError) -> PynectorError {
    let duration = match &err {
        TransportError::ConnectionTimeout(d)
        | TransportError::ReadTimeout(d)
        | TransportError::WriteTimeout(d) => Some(*d),
        _ => None,
    };
    match duration {
        Some(d) => PynectorError::Timeout(TimeoutError::with_cause(d, err)),
        None => PynectorError::Transport(err),
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    transport_name: Option<String>,
    transport_options: BTreeMap<String, String>,
    registry: Option<Arc<TransportRegistry>>,
    enable_telemetry: Option<bool>,
    config: ConfigMap,
}

impl ClientBuilder {
    fn new() -> Self {
        Self {
            transport: None,
            transport_name: None,
            transport_options: BTreeMap::new(),
            registry: None,
            enable_telemetry: None,
            config: ConfigMap::new(),
        }
    }

    /// Supply an already-constructed transport. The client will not connect
    /// or disconnect it on the caller's behalf — the caller keeps ownership.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Select which registered transport to construct by name (e.g.
    /// `"http"`, `"openai"`, `"anthropic"`). Default: `"http"`.
    pub fn transport_type(mut self, name: impl Into<String>) -> Self {
        self.transport_name = Some(name.into());
        self
    }

    /// Options passed to the named transport's factory.
    pub fn transport_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport_options.insert(key.into(), value.into());
        self
    }

    /// Use a custom registry instead of [`TransportRegistry::with_builtins`].
    pub fn registry(mut self, registry: Arc<TransportRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Explicitly enable or disable telemetry, overriding env/config (§4.8).
    pub fn enable_telemetry(mut self, enabled: bool) -> Self {
        self.enable_telemetry = Some(enabled);
        self
    }

    /// Instance-level configuration consulted by [`ClientConfig::resolve`]
    /// ahead of environment variables.
    pub fn config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }

    /// Build the client. Performs no I/O — the transport is connected
    /// lazily on first use.
    pub fn build(self) -> Result<Client, crate::error::ConfigurationError> {
        let config = ClientConfig::resolve(&self.config)?;
        let owns_transport = self.transport.is_none();
        Ok(Client {
            transport: OnceCell::new(),
            prebuilt: self.transport,
            owns_transport,
            registry: self.registry.unwrap_or_else(|| Arc::new(TransportRegistry::with_builtins())),
            transport_name: self.transport_name.unwrap_or_else(|| "http".to_string()),
            transport_options: self.transport_options,
            telemetry: Telemetry::init(self.enable_telemetry),
            config,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Transport, TransportState, TransportStateCell};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream, StreamExt as _};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTransport {
        state: TransportStateCell,
        calls: AtomicUsize,
    }

    impl EchoTransport {
        fn new() -> Self {
            Self {
                state: TransportStateCell::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.state.set(TransportState::Connected);
            Ok(())
        }

        async fn send(&self, _payload: Bytes, _options: &SendOptions) -> Result<(), TransportError> {
            Ok(())
        }

        fn receive(&self, _options: &SendOptions) -> BoxStream<'_, Result<Bytes, TransportError>> {
            stream::once(async { Ok(Bytes::from_static(b"ok")) }).boxed()
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.set(TransportState::Closed);
            Ok(())
        }

        fn state(&self) -> TransportState {
            self.state.get()
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    fn build_client(transport: Arc<dyn Transport>) -> Client {
        Client::builder()
            .transport(transport)
            .enable_telemetry(false)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_returns_response_bytes() {
        let transport: Arc<dyn Transport> = Arc::new(EchoTransport::new());
        let client = build_client(transport);
        let response = client
            .request(Bytes::from_static(b"hello"), SendOptions::default())
            .await
            .unwrap();
        assert_eq!(response, Bytes::from_static(b"ok"));
    }

    #[tokio::test]
    async fn test_connect_happens_exactly_once_across_concurrent_requests() {
        let echo = Arc::new(EchoTransport::new());
        let transport: Arc<dyn Transport> = echo.clone();
        let client = Arc::new(build_client(transport));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client
                    .request(Bytes::from_static(b"x"), SendOptions::default())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_request_preserves_index_order() {
        let transport: Arc<dyn Transport> = Arc::new(EchoTransport::new());
        let client = build_client(transport);
        let requests = vec![
            (Bytes::from_static(b"a"), SendOptions::default()),
            (Bytes::from_static(b"b"), SendOptions::default()),
            (Bytes::from_static(b"c"), SendOptions::default()),
        ];
        let results = client.batch_request(requests, BatchOptions::default()).await;
        assert_eq!(results.len(), 3);
        for result in results {
            assert_eq!(result.unwrap(), Bytes::from_static(b"ok"));
        }
    }

    #[tokio::test]
    async fn test_close_is_noop_for_caller_owned_transport() {
        let echo = Arc::new(EchoTransport::new());
        let transport: Arc<dyn Transport> = echo.clone();
        let client = build_client(transport);
        client
            .request(Bytes::from_static(b"x"), SendOptions::default())
            .await
            .unwrap();
        client.close().await.unwrap();
        assert_eq!(echo.state(), TransportState::Connected);
    }

    #[test]
    fn test_client_config_resolve_uses_defaults() {
        let config = ClientConfig::resolve(&ConfigMap::new()).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_concurrency, 8);
    }

    #[tokio::test]
    async fn test_batch_request_honors_max_concurrency() {
        use crate::testing::{CountingAdapter, MockTransport};

        let mock: Arc<dyn Transport> = Arc::new(
            MockTransport::fixed(Bytes::from_static(b"ok")).with_delay(Duration::from_millis(30)),
        );
        let counting = Arc::new(CountingAdapter::new(mock));
        let client = build_client(counting.clone());

        let requests: Vec<_> = (0..6)
            .map(|_| (Bytes::from_static(b"x"), SendOptions::default()))
            .collect();
        let opts = BatchOptions {
            max_concurrency: Some(2),
            ..Default::default()
        };
        let results = client.batch_request(requests, opts).await;
        assert_eq!(results.len(), 6);
        for result in results {
            assert_eq!(result.unwrap(), Bytes::from_static(b"ok"));
        }
        assert!(counting.max_concurrent() <= 2);
    }
}
