//! `Tracer` facade and its `Span` handle, tagged `{Real, NoOp}` at
//! construction (§4.8).

use super::ids;
use std::future::Future;

enum TracerState {
    Real,
    NoOp,
}

/// Starts spans. Backed by `tracing` when real, inert when not — call sites
/// never match on which.
#[derive(Clone)]
pub struct Tracer {
    state: std::sync::Arc<TracerState>,
}

impl Tracer {
    pub(super) fn real() -> Self {
        Self {
            state: std::sync::Arc::new(TracerState::Real),
        }
    }

    pub(super) fn noop() -> Self {
        Self {
            state: std::sync::Arc::new(TracerState::NoOp),
        }
    }

    /// Whether this tracer is backed by `tracing` (for tests only; call
    /// sites outside tests should never branch on this).
    pub fn is_real(&self) -> bool {
        matches!(*self.state, TracerState::Real)
    }

    /// Start a span. In `NoOp` mode this returns a [`Span`] whose `enter()`
    /// and drop are always safe and record nothing.
    pub fn start_span(&self, name: &'static str) -> Span {
        match *self.state {
            TracerState::Real => {
                let trace_id = ids::new_trace_id();
                let span_id = ids::new_span_id();
                let service_name = super::config::service_name();
                let inner = tracing::info_span!(
                    "pynector.span",
                    otel.name = name,
                    service.name = service_name.as_deref().unwrap_or(""),
                    trace_id = %trace_id,
                    span_id = %span_id,
                    otel.status_code = tracing::field::Empty,
                    otel.status_description = tracing::field::Empty,
                );
                Span {
                    inner: Some(inner),
                    trace_id: Some(trace_id),
                    span_id: Some(span_id),
                }
            }
            TracerState::NoOp => Span {
                inner: None,
                trace_id: None,
                span_id: None,
            },
        }
    }

    /// Run `f` with `name` as the current span for its duration. Any log
    /// record `f` emits through the [`super::Logger`] facade gets this
    /// span's `trace_id`/`span_id` fields attached (§4.8).
    pub fn start_as_current_span<F, R>(&self, name: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let span = self.start_span(name);
        let ids = span.ids();
        let _guard = span.enter();
        match ids {
            Some(ids) => super::context::CURRENT_TRACE_IDS.sync_scope(ids, f),
            None => f(),
        }
    }

    /// Run async `fut` with `name` as the current span, re-entered at every
    /// poll via [`tracing::Instrument`], with `trace_id`/`span_id` attached
    /// to any log record `fut` emits.
    pub async fn start_as_current_async_span<Fut, R>(&self, name: &'static str, fut: Fut) -> R
    where
        Fut: Future<Output = R>,
    {
        let span = self.start_span(name);
        let ids = span.ids();
        match span.inner {
            Some(inner) => {
                use tracing::Instrument;
                let instrumented = fut.instrument(inner);
                match ids {
                    Some(ids) => super::context::CURRENT_TRACE_IDS.scope(ids, instrumented).await,
                    None => instrumented.await,
                }
            }
            None => fut.await,
        }
    }
}

/// A span handle. Entering records nothing and costs nothing when the
/// owning [`Tracer`] is in `NoOp` mode.
pub struct Span {
    inner: Option<tracing::Span>,
    trace_id: Option<String>,
    span_id: Option<String>,
}

impl Span {
    /// Enter the span for the lifetime of the returned guard.
    pub fn enter(&self) -> SpanGuard<'_> {
        SpanGuard {
            _entered: self.inner.as_ref().map(|s| s.enter()),
        }
    }

    /// The 32-hex trace ID, if this span is real.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// The 16-hex span ID, if this span is real.
    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    /// Both IDs together, for scoping [`super::context::CURRENT_TRACE_IDS`].
    fn ids(&self) -> Option<(String, String)> {
        match (&self.trace_id, &self.span_id) {
            (Some(t), Some(s)) => Some((t.clone(), s.clone())),
            _ => None,
        }
    }

    /// Mark this span as having recorded an error, the conventional
    /// `otel.status_code = ERROR` field (§4.8).
    pub fn record_error(&self, message: &str) {
        if let Some(inner) = &self.inner {
            inner.record("otel.status_code", "ERROR");
            inner.record("otel.status_description", message);
        }
    }

    /// The underlying `tracing::Span`, for instrumenting a future directly.
    pub fn as_tracing_span(&self) -> Option<&tracing::Span> {
        self.inner.as_ref()
    }

    /// Run `fut` with this span entered at every poll — the async-safe
    /// counterpart to [`Span::enter`], since `tracing::span::Entered` is
    /// `!Send` and cannot be held across an `.await` inside a spawned task.
    /// `trace_id`/`span_id` are attached to any log record `fut` emits
    /// through the [`super::Logger`] facade while it runs (§4.8).
    pub async fn in_scope_async<F: Future>(&self, fut: F) -> F::Output {
        match &self.inner {
            Some(inner) => {
                use tracing::Instrument;
                let instrumented = fut.instrument(inner.clone());
                match self.ids() {
                    Some(ids) => super::context::CURRENT_TRACE_IDS.scope(ids, instrumented).await,
                    None => instrumented.await,
                }
            }
            None => fut.await,
        }
    }
}

/// Guard returned by [`Span::enter`]. Dropping it exits the span
/// unconditionally, including on an error or panic unwind path.
pub struct SpanGuard<'a> {
    _entered: Option<tracing::span::Entered<'a>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_tracer_span_has_no_ids() {
        let tracer = Tracer::noop();
        let span = tracer.start_span("test");
        assert!(span.trace_id().is_none());
        assert!(span.span_id().is_none());
    }

    #[test]
    fn test_real_tracer_span_has_ids() {
        let tracer = Tracer::real();
        let span = tracer.start_span("test");
        assert_eq!(span.trace_id().map(str::len), Some(32));
        assert_eq!(span.span_id().map(str::len), Some(16));
    }

    #[test]
    fn test_start_as_current_span_returns_value() {
        let tracer = Tracer::real();
        let value = tracer.start_as_current_span("test", || 1 + 1);
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_start_as_current_async_span_returns_value() {
        let tracer = Tracer::noop();
        let value = tracer
            .start_as_current_async_span("test", async { 21 * 2 })
            .await;
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_in_scope_async_survives_await_points() {
        let tracer = Tracer::real();
        let span = tracer.start_span("test");
        let value = span
            .in_scope_async(async {
                tokio::task::yield_now().await;
                7
            })
            .await;
        assert_eq!(value, 7);
    }
}
