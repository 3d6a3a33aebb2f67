//! Gate error types

use chrono::Duration;
use thiserror::Error;

/// Result type for gate checks
pub type GateResult<T> = Result<T, GateError>;

/// Request refused before any query work
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Secret check failed
    #[error("Access denied")]
    AccessDenied,

    /// Identity is inside its rate-limit window
    #[error("Rate limited; retry in {}ms", .remaining.num_milliseconds())]
    RateLimited { remaining: Duration },
}

impl GateError {
    pub fn code(&self) -> &'static str {
        match self {
            GateError::AccessDenied => "GATE_ACCESS_DENIED",
            GateError::RateLimited { .. } => "GATE_RATE_LIMITED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message_carries_wait() {
        let err = GateError::RateLimited {
            remaining: Duration::milliseconds(480),
        };
        assert_eq!(err.to_string(), "Rate limited; retry in 480ms");
        assert_eq!(err.code(), "GATE_RATE_LIMITED");
    }
}
