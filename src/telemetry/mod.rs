//! Optional observability (§4.8): a tracer/logger facade tagged `{Real,
//! NoOp}` once at construction, never branched on at call sites.

mod config;
mod context;
mod ids;
mod logger;
mod tracer;

pub use context::TelemetryContext;
pub use logger::{FieldValue, Logger};
pub use tracer::{Span, Tracer};

use std::sync::Arc;

/// The telemetry façade handed to the [`Client`](crate::client::Client) and
/// every layer beneath it. Holds a `Tracer` and a `Logger`, both already
/// resolved to their `Real` or `NoOp` variant — nothing downstream inspects
/// which one is active.
#[derive(Clone)]
pub struct Telemetry {
    tracer: Tracer,
    logger: Logger,
}

impl Telemetry {
    /// Resolve the configuration hierarchy (§4.8: explicit arg → instance
    /// config → env → default) once and build the facade.
    ///
    /// `enabled` is the explicit-arg layer; pass `None` to fall through to
    /// the rest of the hierarchy.
    pub fn init(enabled: Option<bool>) -> Self {
        let resolved = config::resolve_enabled(enabled);
        if resolved {
            Self {
                tracer: Tracer::real(),
                logger: Logger::real(),
            }
        } else {
            Self {
                tracer: Tracer::noop(),
                logger: Logger::noop(),
            }
        }
    }

    /// Build a disabled facade directly, bypassing the env/config hierarchy.
    pub fn disabled() -> Self {
        Self {
            tracer: Tracer::noop(),
            logger: Logger::noop(),
        }
    }

    /// The tracer half of the facade.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// The logger half of the facade.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Capture the current span/baggage so it can be re-entered from a
    /// spawned task (§4.8 context propagation).
    pub fn capture_context(&self) -> TelemetryContext {
        TelemetryContext::capture()
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

/// Shared handle form, for call sites that need `Arc<Telemetry>` ownership
/// (e.g. a `TaskGroup` child closure captured by value).
pub type SharedTelemetry = Arc<Telemetry>;
