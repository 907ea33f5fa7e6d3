//! # pynector
//!
//! A transport-agnostic client library: a sans-I/O [`transport`] layer
//! (HTTP and vendor-SDK adapters behind one trait), a structured
//! [`concurrency`] core (task groups, cancel scopes, capacity limiting),
//! and an optional [`telemetry`] facade, composed by the [`client`] façade.
//!
//! ## Core Concepts
//!
//! - **[`transport::Transport`]** — object-safe trait over
//!   connect/send/receive/disconnect. [`transport::HttpTransport`] and
//!   [`transport::SdkTransport`] are the built-in implementations;
//!   [`registry::TransportRegistry`] constructs them by name.
//! - **[`message::Message`]** — sans-I/O headers + payload, encoded to
//!   bytes before being handed to a transport.
//! - **[`client::Client`]** — lazily connects a transport on first use,
//!   exposes `request`/`batch_request`/`close`.
//! - **[`concurrency`]** — `TaskGroup`, `CancelScope`, `CapacityLimiter`,
//!   and the `Lock`/`Semaphore`/`Event`/`Condition` primitives
//!   `batch_request` is built on.
//! - **[`telemetry`]** — a `Tracer`/`Logger` facade, no-op unless enabled.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pynector::client::Client;
//! use pynector::transport::SendOptions;
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .transport_type("http")
//!         .transport_option("base_url", "https://api.example.com")
//!         .build()?;
//!
//!     let response = client
//!         .request(Bytes::from_static(b"{}"), SendOptions::default())
//!         .await?;
//!     println!("{} bytes back", response.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod message;
pub mod registry;
pub mod telemetry;
pub mod testing;
pub mod transport;

pub use client::{BatchOptions, Client, ClientBuilder, ClientConfig};
pub use error::{PynectorError, Result};
pub use message::Message;
pub use registry::TransportRegistry;
pub use transport::{RequestBody, SendOptions, Transport, TransportFactory, TransportState};
