//! Observability subsystem for tablegate
//!
//! - Structured JSON logs, one line per event
//! - A closed set of lifecycle and request events
//! - Monotonic request counters
//!
//! Logging is synchronous and never fails the caller.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{render, Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log `event` at INFO, or FATAL when the event is fatal
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log a counters snapshot under `event`
pub fn log_metrics(event: Event, snapshot: &MetricsSnapshot) {
    let fields = snapshot.fields();
    let borrowed: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
    Logger::info(event.as_str(), &borrowed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_events() {
        assert!(Event::BootFailed.is_fatal());
        assert!(!Event::QueryServed.is_fatal());
        assert_eq!(Event::AuthDisabled.to_string(), "AUTH_DISABLED");
    }

    #[test]
    fn test_log_event_does_not_panic() {
        log_event(Event::BootStart, &[]);
        log_metrics(Event::ShutdownComplete, &MetricsRegistry::new().snapshot());
    }
}
