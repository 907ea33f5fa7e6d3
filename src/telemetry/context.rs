//! `TelemetryContext`: captured at spawn time, re-entered inside a spawned
//! task body, detaching automatically when the guard drops (§4.8).

use std::collections::BTreeMap;

tokio::task_local! {
    /// The `trace_id`/`span_id` pair of whichever span is currently entered
    /// via [`super::tracer::Span::in_scope_async`] or
    /// [`super::tracer::Tracer::start_as_current_span`]/
    /// `start_as_current_async_span`. Read by [`super::logger::Logger`] to
    /// attach both fields to every log record emitted while a span is
    /// current (§4.8).
    pub(super) static CURRENT_TRACE_IDS: (String, String);
}

/// The current `(trace_id, span_id)` pair, if any span is entered.
pub(super) fn current_trace_ids() -> Option<(String, String)> {
    CURRENT_TRACE_IDS.try_with(|ids| ids.clone()).ok()
}

/// A snapshot of the current span plus any baggage, carried across a
/// `tokio::spawn`/`TaskGroup::spawn` boundary since tracing's thread-local
/// "current span" does not cross task spawns on its own.
#[derive(Clone)]
pub struct TelemetryContext {
    span: tracing::Span,
    baggage: BTreeMap<String, String>,
}

impl TelemetryContext {
    /// Capture the span that is current at the call site, with empty
    /// baggage. Call this just before spawning a child task.
    pub fn capture() -> Self {
        Self {
            span: tracing::Span::current(),
            baggage: BTreeMap::new(),
        }
    }

    /// Capture the current span together with explicit baggage.
    pub fn capture_with_baggage(baggage: BTreeMap<String, String>) -> Self {
        Self {
            span: tracing::Span::current(),
            baggage,
        }
    }

    /// Baggage carried with this context.
    pub fn baggage(&self) -> &BTreeMap<String, String> {
        &self.baggage
    }

    /// Re-enter the captured span for the lifetime of the returned guard.
    /// Detachment happens automatically when the guard drops, including on
    /// an error or panic unwind path inside the child task body.
    ///
    /// Only safe to hold across a synchronous scope — `tracing::span::Entered`
    /// is intentionally `!Send` so it can never be held across an `.await`.
    /// For spawned async task bodies, use [`TelemetryContext::instrument`]
    /// instead.
    pub fn attach(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Wrap `fut` so the captured span is entered around every poll —
    /// the async-safe counterpart to [`TelemetryContext::attach`], used when
    /// re-entering the context inside a spawned task body.
    pub fn instrument<F: std::future::Future>(&self, fut: F) -> tracing::instrument::Instrumented<F> {
        use tracing::Instrument;
        fut.instrument(self.span.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_attach_does_not_panic() {
        let span = tracing::info_span!("parent");
        let _guard = span.enter();
        let ctx = TelemetryContext::capture();
        drop(_guard);

        let _attached = ctx.attach();
    }

    #[test]
    fn test_baggage_round_trips() {
        let mut baggage = BTreeMap::new();
        baggage.insert("request_id".to_string(), "abc123".to_string());
        let ctx = TelemetryContext::capture_with_baggage(baggage.clone());
        assert_eq!(ctx.baggage(), &baggage);
    }

    #[tokio::test]
    async fn test_instrument_is_usable_across_await() {
        let ctx = TelemetryContext::capture();
        let value = ctx
            .instrument(async {
                tokio::task::yield_now().await;
                42
            })
            .await;
        assert_eq!(value, 42);
    }
}
