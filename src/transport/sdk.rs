//! SDK Transport (§4.5): thin adapters over OpenAI- and Anthropic-style
//! vendor APIs, with SSE/NDJSON decoding for their streaming responses.
//!
//! Vendor wire-format fidelity is out of scope (the crate composes opaque
//! byte payloads, not vendor-specific request/response schemas) — these
//! adapters model only what's pinned down: SSE `content.delta` decoding for
//! OpenAI-shaped APIs, and line-oriented NDJSON decoding for Anthropic-shaped
//! ones, plus auth resolution and a stable error-classification tag instead
//! of vendor-specific exception types.

use super::{SendOptions, Transport, TransportState, TransportStateCell};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::sync::Mutex as StdMutex;

/// SSE stream decoder: `data: {...}` lines, `data: [DONE]` termination,
/// buffered across chunk boundaries.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    /// Start with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning any complete JSON payloads it completed.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Value> {
        let text = String::from_utf8_lossy(chunk);
        self.buffer.push_str(&text);

        let mut values = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() || line.starts_with("event:") {
                continue;
            }
            if let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                let data = data.trim();
                if data == "[DONE]" {
                    continue;
                }
                if let Ok(val) = serde_json::from_str::<Value>(data) {
                    values.push(val);
                }
            }
        }
        values
    }
}

/// Line-oriented NDJSON decoder: one JSON value per newline-terminated
/// line, buffered across chunk boundaries.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: String,
}

impl NdjsonDecoder {
    /// Start with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning any complete JSON lines it completed.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Value> {
        let text = String::from_utf8_lossy(chunk);
        self.buffer.push_str(&text);

        let mut values = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(val) = serde_json::from_str::<Value>(line) {
                values.push(val);
            }
        }
        values
    }
}

/// A normalized non-streaming completion request, opaque to vendor schema.
#[derive(Debug, Clone)]
pub struct SdkRequest {
    /// Raw request body bytes, already encoded by the caller.
    pub body: Bytes,
    /// Extra headers merged over the adapter's own auth header.
    pub headers: std::collections::BTreeMap<String, String>,
}

/// Abstraction over a vendor SDK-shaped completion API (§4.5).
#[async_trait]
pub trait SdkAdapter: Send + Sync {
    /// Issue one non-streaming call, returning the raw response body.
    async fn complete(&self, client: &Client, request: &SdkRequest) -> Result<Bytes, TransportError>;

    /// Issue a streaming call, returning a lazy stream of decoded text
    /// chunks — one item per underlying delta, never the whole response
    /// accumulated into one buffer. Adapters that can't stream forward
    /// `complete`'s single body as a one-item stream instead.
    async fn stream(
        &self,
        client: &Client,
        request: &SdkRequest,
    ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError>;

    /// Resolve the bearer/auth header value, consulting the explicit option
    /// first and then the vendor's env var, lazily — not at construction.
    fn resolve_auth(&self, explicit: &Option<String>) -> Result<String, TransportError>;

    /// Human-readable adapter name.
    fn name(&self) -> &'static str;
}

fn classify_vendor_error(status: u16, body: &str) -> TransportError {
    // Stand-in for inspecting a vendor SDK's module-qualified exception
    // class: a stable string/status tag extracted from the response,
    // resilient to the vendor's concrete Rust error type changing.
    let vendor_error_kind = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.get("type")).cloned())
        .and_then(|v| v.as_str().map(str::to_string));

    match vendor_error_kind.as_deref() {
        Some("invalid_request_error") => TransportError::InvalidRequest {
            status,
            body: body.to_string(),
        },
        Some("authentication_error") => TransportError::Authentication(body.to_string()),
        Some("permission_error") => TransportError::Permission(body.to_string()),
        Some("rate_limit_error") => TransportError::RateLimit { retry_after: None },
        _ => TransportError::from_status(status, body.to_string(), None),
    }
}

/// Drain a response's error status into a classified [`TransportError`].
/// Buffering here is unavoidable (and harmless): an error body is never
/// itself a thing a caller streams.
async fn classify_error_response(response: Response) -> TransportError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    classify_vendor_error(status, &body)
}

/// Decode a byte-chunk stream incrementally with `decoder`, extracting a
/// text delta from each decoded JSON value via `extract`, and yield one
/// `Bytes` item per delta as soon as its chunk arrives — never buffering the
/// whole response into one string.
fn decode_to_stream<D>(
    byte_stream: BoxStream<'static, Result<Bytes, TransportError>>,
    decoder: D,
    extract: fn(&Value) -> Option<&str>,
) -> BoxStream<'static, Result<Bytes, TransportError>>
where
    D: FnMut(&[u8]) -> Vec<Value> + Send + 'static,
{
    stream::unfold(
        (byte_stream, decoder, Vec::<Bytes>::new()),
        move |(mut byte_stream, mut decoder, mut queued)| async move {
            loop {
                if !queued.is_empty() {
                    let item = queued.remove(0);
                    return Some((Ok(item), (byte_stream, decoder, queued)));
                }
                match byte_stream.next().await {
                    None => return None,
                    Some(Err(e)) => return Some((Err(e), (byte_stream, decoder, queued))),
                    Some(Ok(chunk)) => {
                        for value in decoder(&chunk) {
                            if let Some(text) = extract(&value) {
                                queued.push(Bytes::copy_from_slice(text.as_bytes()));
                            }
                        }
                    }
                }
            }
        },
    )
    .boxed()
}

fn extract_openai_delta(value: &Value) -> Option<&str> {
    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
}

fn extract_anthropic_delta(value: &Value) -> Option<&str> {
    value
        .get("delta")
        .and_then(|d| d.get("text"))
        .and_then(|t| t.as_str())
}

/// Adapter for OpenAI-shaped chat completion APIs: SSE streaming with
/// `choices[].delta.content` chunks.
pub struct OpenAiAdapter {
    explicit_api_key: Option<String>,
    base_url: String,
}

impl OpenAiAdapter {
    /// Build an adapter rooted at `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            explicit_api_key: None,
            base_url: base_url.into(),
        }
    }

    /// Supply the API key explicitly rather than via `OPENAI_API_KEY`.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.explicit_api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl SdkAdapter for OpenAiAdapter {
    async fn complete(&self, client: &Client, request: &SdkRequest) -> Result<Bytes, TransportError> {
        let auth = self.resolve_auth(&self.explicit_api_key)?;
        let mut builder = client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(auth)
            .body(request.body.clone());
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(classify_error_response(response).await);
        }
        response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }

    async fn stream(
        &self,
        client: &Client,
        request: &SdkRequest,
    ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError> {
        let auth = self.resolve_auth(&self.explicit_api_key)?;
        let mut builder = client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(auth)
            .body(request.body.clone());
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(classify_error_response(response).await);
        }

        let byte_stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Connection(e.to_string())))
            .boxed();
        Ok(decode_to_stream(
            byte_stream,
            {
                let mut decoder = SseDecoder::new();
                move |chunk: &[u8]| decoder.decode(chunk)
            },
            extract_openai_delta,
        ))
    }

    fn resolve_auth(&self, explicit: &Option<String>) -> Result<String, TransportError> {
        if let Some(key) = explicit {
            return Ok(key.clone());
        }
        env::var("OPENAI_API_KEY")
            .map_err(|_| TransportError::Authentication("OPENAI_API_KEY not set".into()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Adapter for Anthropic-shaped messages APIs: line-oriented NDJSON
/// streaming.
pub struct AnthropicAdapter {
    explicit_api_key: Option<String>,
    base_url: String,
}

impl AnthropicAdapter {
    /// Build an adapter rooted at `base_url` (e.g. `https://api.anthropic.com/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            explicit_api_key: None,
            base_url: base_url.into(),
        }
    }

    /// Supply the API key explicitly rather than via `ANTHROPIC_API_KEY`.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.explicit_api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl SdkAdapter for AnthropicAdapter {
    async fn complete(&self, client: &Client, request: &SdkRequest) -> Result<Bytes, TransportError> {
        let auth = self.resolve_auth(&self.explicit_api_key)?;
        let mut builder = client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", auth)
            .header("anthropic-version", "2023-06-01")
            .body(request.body.clone());
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(classify_error_response(response).await);
        }
        response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))
    }

    async fn stream(
        &self,
        client: &Client,
        request: &SdkRequest,
    ) -> Result<BoxStream<'static, Result<Bytes, TransportError>>, TransportError> {
        let auth = self.resolve_auth(&self.explicit_api_key)?;
        let mut builder = client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", auth)
            .header("anthropic-version", "2023-06-01")
            .body(request.body.clone());
        for (k, v) in &request.headers {
            builder = builder.header(k, v);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(classify_error_response(response).await);
        }

        let byte_stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Connection(e.to_string())))
            .boxed();
        Ok(decode_to_stream(
            byte_stream,
            {
                let mut decoder = NdjsonDecoder::new();
                move |chunk: &[u8]| decoder.decode(chunk)
            },
            extract_anthropic_delta,
        ))
    }

    fn resolve_auth(&self, explicit: &Option<String>) -> Result<String, TransportError> {
        if let Some(key) = explicit {
            return Ok(key.clone());
        }
        env::var("ANTHROPIC_API_KEY")
            .map_err(|_| TransportError::Authentication("ANTHROPIC_API_KEY not set".into()))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

/// [`Transport`] wrapper around an [`SdkAdapter`], so the registry and
/// client can treat vendor SDKs uniformly with [`super::HttpTransport`].
pub struct SdkTransport {
    adapter: Box<dyn SdkAdapter>,
    client: Client,
    state: TransportStateCell,
    pending: StdMutex<HashMap<tokio::task::Id, SdkRequest>>,
    streaming: StdMutex<HashMap<tokio::task::Id, bool>>,
}

impl SdkTransport {
    /// Wrap `adapter`, building its own pooled client.
    pub fn new(adapter: Box<dyn SdkAdapter>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self {
            adapter,
            client,
            state: TransportStateCell::new(),
            pending: StdMutex::new(HashMap::new()),
            streaming: StdMutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl Transport for SdkTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.state.set(TransportState::Connected);
        Ok(())
    }

    async fn send(&self, payload: Bytes, options: &SendOptions) -> Result<(), TransportError> {
        let task_id = tokio::task::id();
        let streaming = options.stream;
        self.pending.lock().expect("pending mutex poisoned").insert(
            task_id,
            SdkRequest {
                body: payload,
                headers: options.headers.clone(),
            },
        );
        self.streaming
            .lock()
            .expect("streaming mutex poisoned")
            .insert(task_id, streaming);
        Ok(())
    }

    fn receive(&self, _options: &SendOptions) -> BoxStream<'_, Result<Bytes, TransportError>> {
        let task_id = tokio::task::id();
        let request = self.pending.lock().expect("pending mutex poisoned").remove(&task_id);
        let streaming = self
            .streaming
            .lock()
            .expect("streaming mutex poisoned")
            .remove(&task_id)
            .unwrap_or(false);

        match request {
            None => stream::once(async {
                Err(TransportError::Protocol(
                    "receive() called with no staged request".into(),
                ))
            })
            .boxed(),
            Some(request) => stream::once(async move {
                if streaming {
                    self.adapter.stream(&self.client, &request).await
                } else {
                    self.adapter
                        .complete(&self.client, &request)
                        .await
                        .map(|body| stream::once(async move { Ok(body) }).boxed())
                }
            })
            .flat_map(|result| match result {
                Ok(body) => body,
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            })
            .boxed(),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.state.set(TransportState::Closed);
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn name(&self) -> &'static str {
        self.adapter.name()
    }
}
