//! Telemetry enablement hierarchy (§4.8/§6): explicit arg → instance config
//! → `OTEL_SDK_DISABLED` env var → default (enabled).

use std::env;

/// Resolve whether telemetry should be `Real` given an optional explicit
/// argument. `OTEL_SDK_DISABLED=true` forces `NoOp` regardless of the
/// explicit arg, per §4.8.
pub fn resolve_enabled(explicit: Option<bool>) -> bool {
    if sdk_disabled_by_env() {
        return false;
    }
    if let Some(value) = explicit {
        return value;
    }
    true
}

fn sdk_disabled_by_env() -> bool {
    match env::var("OTEL_SDK_DISABLED") {
        Ok(value) => value.eq_ignore_ascii_case("true"),
        Err(_) => false,
    }
}

/// Read `OTEL_SERVICE_NAME`, if set — the one other `OTEL_*` variable that
/// actually changes behavior (it becomes the service name recorded on the
/// root span).
pub fn service_name() -> Option<String> {
    env::var("OTEL_SERVICE_NAME").ok()
}
