//! Request and migration counters
//!
//! Counters only, monotonic, reset on process start. Relaxed atomics: the
//! values are reported, never used for control flow.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    served: AtomicU64,
    denied: AtomicU64,
    rate_limited: AtomicU64,
    /// Requests that failed binding
    rejected: AtomicU64,
    /// Requests whose statement the engine refused
    failed: AtomicU64,
    migrations_applied: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_served(&self) {
        self.served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_migrations_applied(&self) {
        self.migrations_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            served: self.served.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            migrations_applied: self.migrations_applied.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub served: u64,
    pub denied: u64,
    pub rate_limited: u64,
    pub rejected: u64,
    pub failed: u64,
    pub migrations_applied: u64,
}

impl MetricsSnapshot {
    /// Counters as log fields
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("denied", self.denied.to_string()),
            ("failed", self.failed.to_string()),
            ("migrations_applied", self.migrations_applied.to_string()),
            ("rate_limited", self.rate_limited.to_string()),
            ("rejected", self.rejected.to_string()),
            ("served", self.served.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increments_are_independent() {
        let registry = MetricsRegistry::new();
        registry.increment_served();
        registry.increment_served();
        registry.increment_denied();
        registry.increment_migrations_applied();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.served, 2);
        assert_eq!(snapshot.denied, 1);
        assert_eq!(snapshot.rate_limited, 0);
        assert_eq!(snapshot.migrations_applied, 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry.increment_failed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().failed, 800);
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = MetricsRegistry::new();
        registry.increment_rejected();
        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json["rejected"], 1);
    }
}
