//! HTTP Transport (§4.4): a pooled `reqwest::Client` plus a retry/backoff
//! algorithm over arbitrary HTTP verbs, bodies, and headers.

use super::{RequestBody, SendOptions, Transport, TransportState, TransportStateCell};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Method};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Jitter strategy applied to each backoff delay. `None` is the default:
/// the retry/backoff algorithm is specified as deterministic
/// (`backoff_factor * 2^attempt`, capped), so randomizing it is opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// No jitter.
    None,
    /// Random value in `[0, calculated_delay]`.
    Full,
    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

/// Construction-time options for [`HttpTransport`] (§4.4).
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Base URL every request is issued against.
    pub base_url: String,
    /// Per-request timeout. Default: 10s.
    pub timeout: Duration,
    /// Maximum retry attempts after the first. Default: 3.
    pub max_retries: u32,
    /// `backoff_factor` in `backoff_factor * 2^attempt`. Default: 0.5.
    pub retry_backoff_factor: f64,
    /// Maximum delay between retries. Default: 60s.
    pub max_delay: Duration,
    /// Status codes that trigger a retry. Default: `{429,500,502,503,504}`.
    pub retry_status_forcelist: Vec<u16>,
    /// Whether to respect a `Retry-After` header on the response. Default: true.
    pub respect_retry_after: bool,
    /// Jitter strategy. Default: `None`.
    pub jitter: JitterStrategy,
    /// Follow redirects. Default: true.
    pub follow_redirects: bool,
    /// Verify TLS certificates. Default: true.
    pub verify_tls: bool,
    /// Static headers merged onto every request.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_backoff_factor: 0.5,
            max_delay: Duration::from_secs(60),
            retry_status_forcelist: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
            jitter: JitterStrategy::None,
            follow_redirects: true,
            verify_tls: true,
            default_headers: BTreeMap::new(),
        }
    }
}

impl HttpTransportConfig {
    /// Delay for retry attempt `attempt` (0-indexed), `backoff_factor *
    /// 2^attempt`, capped at `max_delay`, then jittered.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.retry_backoff_factor * 2f64.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };
        Duration::from_secs_f64(jittered)
    }

    fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_status_forcelist.contains(&status)
    }
}

/// Method, path, params, headers, and body for the one pending request
/// `send` staged before `receive` actually issues it. HTTP is
/// request/response, so `send` stages the call and `receive` runs the retry
/// loop and streams the body once.
struct PendingRequest {
    method: Method,
    path: String,
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: RequestBody,
}

/// HTTP transport built on a pooled [`reqwest::Client`] (§4.4).
///
/// Cloning `reqwest::Client` is cheap (internally `Arc`-backed) and shares
/// the same connection pool across every concurrent caller.
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
    state: TransportStateCell,
    pending: StdMutex<HashMap<tokio::task::Id, PendingRequest>>,
    cancel: CancellationToken,
}

impl HttpTransport {
    /// Build a new transport from `config`. Does not perform any I/O.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::default()
            } else {
                reqwest::redirect::Policy::none()
            })
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            config,
            state: TransportStateCell::new(),
            pending: StdMutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Stage a request with an explicit method, path, and body (relative to
    /// `config.base_url`), to be issued by the next `receive()` call from
    /// this same task.
    pub fn stage(
        &self,
        method: Method,
        path: impl Into<String>,
        params: BTreeMap<String, String>,
        body: RequestBody,
        headers: BTreeMap<String, String>,
    ) {
        let task_id = tokio::task::id();
        let mut pending = self.pending.lock().expect("pending mutex poisoned");
        pending.insert(
            task_id,
            PendingRequest {
                method,
                path: path.into(),
                params,
                headers,
                body,
            },
        );
    }

    fn is_idempotent(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
        )
    }

    fn build_request(&self, request: &PendingRequest, options: &SendOptions) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (k, v) in &self.config.default_headers {
            builder = builder.header(k, v);
        }
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        for (k, v) in &options.headers {
            builder = builder.header(k, v);
        }
        builder = match &request.body {
            RequestBody::Raw(bytes) => builder.body(bytes.clone()),
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Files(files) => {
                let mut form = reqwest::multipart::Form::new();
                for (name, bytes) in files {
                    form = form.part(name.clone(), reqwest::multipart::Part::bytes(bytes.to_vec()));
                }
                builder.multipart(form)
            }
        };
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    /// Issue the request once. On a non-error status, returns a lazy stream
    /// of response chunks — the body is never buffered here. On an error
    /// status, the body is drained to text for retry classification and
    /// error reporting, since the caller needs the message either way and
    /// an error response is never itself a thing callers stream.
    async fn issue_once(
        &self,
        request: &PendingRequest,
        options: &SendOptions,
    ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError> {
        let builder = self.build_request(request, options);

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, body, retry_after));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Connection(e.to_string())))
            .boxed())
    }

    /// Run the retry/backoff algorithm (§4.4 steps 1-6) around one staged
    /// request: attempt, classify, decide retry eligibility, sleep
    /// (cancellation-aware), repeat. Retries only ever re-run a failed
    /// attempt — once a response stream is handed back, nothing here
    /// buffers or re-reads it.
    async fn run_with_retry(
        &self,
        request: &PendingRequest,
        options: &SendOptions,
    ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError> {
        let retry_allowed = options.retry_ok || Self::is_idempotent(&request.method);
        let mut last_error: Option<TransportError> = None;

        for attempt in 0..=self.config.max_retries {
            if self.cancel.is_cancelled() {
                return Err(TransportError::Connection("cancelled".into()));
            }

            if attempt > 0 {
                let delay = match &last_error {
                    Some(TransportError::RateLimit {
                        retry_after: Some(ra),
                    }) if self.config.respect_retry_after => *ra,
                    _ => self.config.delay_for_attempt(attempt - 1),
                };

                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(TransportError::Connection("cancelled".into()));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.issue_once(request, options).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    let retryable = retry_allowed
                        && attempt < self.config.max_retries
                        && e.status()
                            .map(|s| self.config.is_retryable_status(s))
                            .unwrap_or(true);
                    if retryable {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| TransportError::Protocol("retry loop exited unexpectedly".into())))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.state.set(TransportState::Connected);
        Ok(())
    }

    async fn send(&self, payload: Bytes, options: &SendOptions) -> Result<(), TransportError> {
        let method = options
            .method
            .as_deref()
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .unwrap_or(Method::POST);
        let path = options.path.clone().unwrap_or_default();
        let body = options
            .body
            .clone()
            .unwrap_or_else(|| RequestBody::Raw(payload));
        self.stage(method, path, options.params.clone(), body, options.headers.clone());
        Ok(())
    }

    fn receive(&self, options: &SendOptions) -> BoxStream<'_, Result<Bytes, TransportError>> {
        let task_id = tokio::task::id();
        let request = self
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(&task_id);
        let options = options.clone();

        match request {
            None => stream::once(async {
                Err(TransportError::Protocol(
                    "receive() called with no staged request".into(),
                ))
            })
            .boxed(),
            Some(request) => stream::once(async move { self.run_with_retry(&request, &options).await })
                .flat_map(|result| match result {
                    Ok(body) => body,
                    Err(e) => stream::once(async move { Err(e) }).boxed(),
                })
                .boxed(),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.state.get() == TransportState::Closed {
            return Ok(());
        }
        self.cancel.cancel();
        self.state.set(TransportState::Closed);
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
