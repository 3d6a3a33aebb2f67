//! Fixed-window rate limiter keyed by identity
//!
//! An allowed access stamps the identity. Until the window has elapsed from
//! that stamp every further access is refused and the stamp is left alone,
//! so a denied caller cannot extend its own wait. Stale stamps are swept on
//! each check rather than by a timer.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Sentinel for "no limit" in configuration
pub const DISABLED_WINDOW_MS: i64 = -1;

#[derive(Debug)]
pub struct RateLimiter {
    window: Option<Duration>,
    last_access: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RateLimiter {
    /// Limiter with a window of `window_ms`; zero or negative disables it
    pub fn new(window_ms: i64) -> Self {
        let window = (window_ms > 0).then(|| Duration::milliseconds(window_ms));
        Self {
            window,
            last_access: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(DISABLED_WINDOW_MS)
    }

    /// Configured window, `None` when disabled
    pub fn window(&self) -> Option<Duration> {
        self.window
    }

    /// Identities currently holding a stamp
    pub fn tracked(&self) -> usize {
        self.last_access
            .lock()
            .map(|entries| entries.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    /// Remaining wait for `identity`; zero means allowed and stamped
    pub fn check_and_stamp(&self, identity: &str) -> Duration {
        self.check_and_stamp_at(identity, Utc::now())
    }

    pub fn check_and_stamp_at(&self, identity: &str, now: DateTime<Utc>) -> Duration {
        let Some(window) = self.window else {
            return Duration::zero();
        };

        let mut entries = self
            .last_access
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        entries.retain(|_, stamped| now - *stamped < window);

        if let Some(stamped) = entries.get(identity) {
            return window - (now - *stamped);
        }

        entries.insert(identity.to_string(), now);
        Duration::zero()
    }
}
