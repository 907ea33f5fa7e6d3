//! Trace/span ID generation: 32 hex chars (128 bit) for trace IDs, 16 hex
//! chars (64 bit) for span IDs, the W3C Trace Context widths, generated
//! locally rather than pulled from a full OpenTelemetry SDK (§0).

/// Generate a random 128-bit trace ID, rendered as 32 lowercase hex chars.
pub fn new_trace_id() -> String {
    format!("{:016x}{:016x}", fastrand::u64(..), fastrand::u64(..))
}

/// Generate a random 64-bit span ID, rendered as 16 lowercase hex chars.
pub fn new_span_id() -> String {
    format!("{:016x}", fastrand::u64(..))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_is_32_hex_chars() {
        let id = new_trace_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_span_id_is_16_hex_chars() {
        let id = new_span_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_not_trivially_constant() {
        let a = new_trace_id();
        let b = new_trace_id();
        assert_ne!(a, b);
    }
}
