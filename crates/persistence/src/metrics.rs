//! Store and config loader metrics.
//!
//! Provides functions for recording override store and base config metrics.

use metrics::counter;

/// Record an override read that degraded to "no override".
pub fn record_override_read_failure(namespace: &str) {
    counter!(
        "override_store_read_failures_total",
        "namespace" => namespace.to_string()
    )
    .increment(1);
}

/// Record the outcome of an override write.
pub fn record_override_write(namespace: &str, success: bool) {
    counter!(
        "override_store_writes_total",
        "namespace" => namespace.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

/// Record a base config reload from `source` (`pricing`, `flag_defaults`,
/// `flag_environment`).
pub fn record_base_reload(source: &'static str, success: bool) {
    counter!(
        "base_config_reloads_total",
        "source" => source,
        "outcome" => outcome(success)
    )
    .increment(1);
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome(true), "success");
        assert_eq!(outcome(false), "failure");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_override_read_failure("feature-flags");
        record_override_write("dynamic-pricing", true);
        record_base_reload("pricing", false);
    }
}
