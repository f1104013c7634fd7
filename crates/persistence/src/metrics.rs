//! Cache metrics collection.

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record the duration of a cache store operation.
pub fn record_cache_operation_duration(operation: &str, duration_secs: f64) {
    histogram!(
        "template_cache_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Record the current number of stored entries.
pub fn record_cache_entries(entries: usize) {
    gauge!("template_cache_entries").set(entries as f64);
}

/// Record entries removed by a sweep or by capacity pressure.
pub fn record_evictions(reason: &'static str, count: usize) {
    if count > 0 {
        counter!("template_cache_evictions_total", "reason" => reason).increment(count as u64);
    }
}

/// Times a cache operation and records it on [`CacheOpTimer::record`].
///
/// ```ignore
/// let timer = CacheOpTimer::new("get");
/// let entry = entries.get(fingerprint).cloned();
/// timer.record();
/// ```
pub struct CacheOpTimer {
    operation: &'static str,
    start: Instant,
}

impl CacheOpTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        record_cache_operation_duration(self.operation, self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_creation() {
        let timer = CacheOpTimer::new("get");
        assert_eq!(timer.operation, "get");
        timer.record();
    }

    #[test]
    fn test_zero_evictions_are_not_recorded() {
        record_evictions("sweep", 0);
        record_cache_entries(0);
    }
}
