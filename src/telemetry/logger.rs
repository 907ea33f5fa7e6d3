//! `Logger` facade: `debug/info/warning/error/critical`, each taking a
//! message plus structured fields, tagged `{Real, NoOp}` like [`super::Tracer`].

enum LoggerState {
    Real,
    NoOp,
}

/// A structured field value, the idiomatic stand-in for Python's kwargs.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// A string field.
    Str(String),
    /// An integer field.
    Int(i64),
    /// A floating-point field.
    Float(f64),
    /// A boolean field.
    Bool(bool),
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{s}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// Structured logger. `NoOp` mode drops every call before formatting
/// anything.
#[derive(Clone)]
pub struct Logger {
    state: std::sync::Arc<LoggerState>,
}

impl Logger {
    pub(super) fn real() -> Self {
        Self {
            state: std::sync::Arc::new(LoggerState::Real),
        }
    }

    pub(super) fn noop() -> Self {
        Self {
            state: std::sync::Arc::new(LoggerState::NoOp),
        }
    }

    fn is_real(&self) -> bool {
        matches!(*self.state, LoggerState::Real)
    }

    fn emit(&self, level: tracing::Level, message: &str, fields: &[(&str, FieldValue)]) {
        if !self.is_real() {
            return;
        }
        let mut rendered: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if let Some((trace_id, span_id)) = super::context::current_trace_ids() {
            rendered.push(format!("trace_id={trace_id}"));
            rendered.push(format!("span_id={span_id}"));
        }
        let suffix = if rendered.is_empty() {
            String::new()
        } else {
            format!(" {}", rendered.join(" "))
        };
        match level {
            tracing::Level::DEBUG => tracing::debug!("{message}{suffix}"),
            tracing::Level::INFO => tracing::info!("{message}{suffix}"),
            tracing::Level::WARN => tracing::warn!("{message}{suffix}"),
            tracing::Level::ERROR => tracing::error!("{message}{suffix}"),
            tracing::Level::TRACE => tracing::trace!("{message}{suffix}"),
        }
    }

    /// Log at debug level.
    pub fn debug(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.emit(tracing::Level::DEBUG, message, fields);
    }

    /// Log at info level.
    pub fn info(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.emit(tracing::Level::INFO, message, fields);
    }

    /// Log at warning level.
    pub fn warning(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.emit(tracing::Level::WARN, message, fields);
    }

    /// Log at error level. Also marks the current span's status as errored
    /// (§4.8), if a real span is current.
    pub fn error(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.emit(tracing::Level::ERROR, message, fields);
        self.mark_current_span_errored(message);
    }

    /// Log at critical level (rendered as `error` — `tracing` has no higher
    /// builtin level). Also marks the current span's status as errored.
    pub fn critical(&self, message: &str, fields: &[(&str, FieldValue)]) {
        self.emit(tracing::Level::ERROR, message, fields);
        self.mark_current_span_errored(message);
    }

    fn mark_current_span_errored(&self, message: &str) {
        if !self.is_real() {
            return;
        }
        let span = tracing::Span::current();
        span.record("otel.status_code", "ERROR");
        span.record("otel.status_description", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_logger_does_not_panic() {
        let logger = Logger::noop();
        logger.info("hello", &[("key", FieldValue::from("value"))]);
        logger.error("oops", &[]);
    }

    #[test]
    fn test_real_logger_does_not_panic() {
        let logger = Logger::real();
        logger.debug("hello", &[("n", FieldValue::from(1i64))]);
        logger.warning("careful", &[("ratio", FieldValue::from(0.5))]);
        logger.critical("boom", &[("fatal", FieldValue::from(true))]);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::from("x").to_string(), "x");
        assert_eq!(FieldValue::from(3i64).to_string(), "3");
        assert_eq!(FieldValue::from(true).to_string(), "true");
    }
}
