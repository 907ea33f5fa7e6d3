//! End-to-end scenarios (§8) exercised against a real `HttpTransport`
//! pointed at a `wiremock` server, rather than unit-level fakes.

use bytes::Bytes;
use pynector::client::{BatchOptions, Client};
use pynector::testing::CountingAdapter;
use pynector::transport::{HttpTransport, HttpTransportConfig, JitterStrategy, SendOptions};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pynector=debug")
        .with_test_writer()
        .try_init();
}

fn build_client(base_url: String, config: HttpTransportConfig) -> Client {
    let transport: Arc<dyn pynector::transport::Transport> = Arc::new(
        HttpTransport::new(HttpTransportConfig {
            base_url,
            ..config
        })
        .expect("transport config is valid"),
    );
    Client::builder().transport(transport).build().expect("client config is valid")
}

/// Scenario 2: `max_retries=2, retry_backoff_factor=0.1`, server responds
/// 503, 503, 200("ok"); total elapsed delay is at least 0.1 + 0.2s and the
/// final response body is returned.
#[tokio::test]
async fn retry_on_503_eventually_succeeds_after_backoff() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("ok"))
        .mount(&server)
        .await;

    let client = build_client(
        server.uri(),
        HttpTransportConfig {
            max_retries: 2,
            retry_backoff_factor: 0.1,
            jitter: JitterStrategy::None,
            ..Default::default()
        },
    );

    let started = tokio::time::Instant::now();
    let response = client
        .request(
            Bytes::from_static(b"x"),
            SendOptions {
                path: Some("/".to_string()),
                retry_ok: true,
                ..Default::default()
            },
        )
        .await
        .expect("third attempt succeeds");

    assert_eq!(response, Bytes::from_static(b"ok"));
    assert!(
        started.elapsed() >= Duration::from_millis(300),
        "expected at least 0.1s + 0.2s of backoff delay, got {:?}",
        started.elapsed()
    );
}

/// Scenario 3: a 429 with `Retry-After: 1` overrides the exponential
/// formula — the next attempt occurs no earlier than 1.0s after the first
/// response, even though the configured backoff factor would imply a much
/// shorter wait.
#[tokio::test]
async fn rate_limit_response_honors_retry_after_header() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("ok"))
        .mount(&server)
        .await;

    let client = build_client(
        server.uri(),
        HttpTransportConfig {
            max_retries: 1,
            retry_backoff_factor: 0.01,
            jitter: JitterStrategy::None,
            ..Default::default()
        },
    );

    let started = tokio::time::Instant::now();
    let response = client
        .request(
            Bytes::from_static(b"x"),
            SendOptions {
                path: Some("/".to_string()),
                retry_ok: true,
                ..Default::default()
            },
        )
        .await
        .expect("retry after rate limit succeeds");

    assert_eq!(response, Bytes::from_static(b"ok"));
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "Retry-After hint should force at least a 1s wait, got {:?}",
        started.elapsed()
    );
}

/// Scenario 5: 10 requests with `max_concurrency=3` against a transport
/// whose every response is delayed; an instrumented wrapper observes at
/// most 3 `receive()` streams in flight at any instant.
#[tokio::test]
async fn batch_request_bounds_concurrency_against_real_transport() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("ok").set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let transport: Arc<dyn pynector::transport::Transport> = Arc::new(
        HttpTransport::new(HttpTransportConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .expect("transport config is valid"),
    );
    let counting = Arc::new(CountingAdapter::new(transport));
    let client = Client::builder()
        .transport(counting.clone())
        .build()
        .expect("client config is valid");

    let requests: Vec<_> = (0..10)
        .map(|_| {
            (
                Bytes::from_static(b"x"),
                SendOptions {
                    path: Some("/".to_string()),
                    ..Default::default()
                },
            )
        })
        .collect();

    let results = client
        .batch_request(
            requests,
            BatchOptions {
                max_concurrency: Some(3),
                ..Default::default()
            },
        )
        .await;

    assert_eq!(results.len(), 10);
    for result in results {
        assert_eq!(result.unwrap(), Bytes::from_static(b"ok"));
    }
    assert!(
        counting.max_concurrent() <= 3,
        "observed {} concurrent in-flight receives, expected at most 3",
        counting.max_concurrent()
    );
}

/// Scenario 6: a call-level timeout shorter than the server's response
/// delay surfaces as `PynectorError::Timeout`, and the transport remains
/// usable for a subsequent call.
#[tokio::test]
async fn request_timeout_surfaces_as_timeout_error_and_transport_stays_usable() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("ok").set_delay(Duration::from_secs(1)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fast"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes("ok"))
        .mount(&server)
        .await;

    let client = build_client(server.uri(), HttpTransportConfig::default());

    let outcome = client
        .request(
            Bytes::from_static(b"x"),
            SendOptions {
                path: Some("/slow".to_string()),
                timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            },
        )
        .await;

    assert!(
        matches!(outcome, Err(pynector::PynectorError::Timeout(_))),
        "expected a Timeout error, got {outcome:?}"
    );

    let response = client
        .request(
            Bytes::from_static(b"x"),
            SendOptions {
                path: Some("/fast".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("transport is still usable after a prior timeout");
    assert_eq!(response, Bytes::from_static(b"ok"));
}
