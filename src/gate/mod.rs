//! Request gate for tablegate
//!
//! Every configured route passes through the gate before any query work:
//! first the secret check, then the per-identity rate limiter. Both pieces
//! of shared state live in one `RequestGate` owned by the gateway.
//!
//! The secret slot holds an `Arc<SecretPolicy>`. A check clones the `Arc`
//! and evaluates outside the lock, so a predicate policy may call
//! `set_secret` without deadlocking; the swap is visible to the next check.

mod errors;
mod rate_limit;
mod secret;

pub use errors::{GateError, GateResult};
pub use rate_limit::{RateLimiter, DISABLED_WINDOW_MS};
pub use secret::{check_secret, keys_match, SecretPolicy, SecretPredicate};

use std::sync::{Arc, RwLock};

use chrono::Duration;

use crate::observability::{Event, Logger};

#[derive(Debug)]
pub struct RequestGate {
    secret: RwLock<Arc<SecretPolicy>>,
    limiter: RateLimiter,
}

impl RequestGate {
    /// Gate with `policy` and a rate-limit window of `window_ms`
    /// (zero or negative for unlimited)
    pub fn new(policy: SecretPolicy, window_ms: i64) -> Self {
        warn_if_disabled(&policy);
        Self {
            secret: RwLock::new(Arc::new(policy)),
            limiter: RateLimiter::new(window_ms),
        }
    }

    /// Gate that admits everything
    pub fn open() -> Self {
        Self {
            secret: RwLock::new(Arc::new(SecretPolicy::disabled())),
            limiter: RateLimiter::disabled(),
        }
    }

    /// Secret check, then rate limit
    pub fn check(&self, identity: &str, provided: Option<&str>) -> GateResult<()> {
        if !self.check_secret(provided, identity) {
            return Err(GateError::AccessDenied);
        }
        self.check_rate(identity)
    }

    pub fn check_secret(&self, provided: Option<&str>, identity: &str) -> bool {
        let policy = self.current_secret();
        check_secret(&policy, provided, identity)
    }

    pub fn check_rate(&self, identity: &str) -> GateResult<()> {
        let remaining = self.limiter.check_and_stamp(identity);
        if remaining > Duration::zero() {
            return Err(GateError::RateLimited { remaining });
        }
        Ok(())
    }

    /// Replace the active secret policy
    pub fn set_secret(&self, policy: SecretPolicy) {
        warn_if_disabled(&policy);
        let mut slot = self
            .secret
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Arc::new(policy);
    }

    pub fn current_secret(&self) -> Arc<SecretPolicy> {
        let slot = self
            .secret
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&slot)
    }

    pub fn is_auth_disabled(&self) -> bool {
        self.current_secret().is_disabled()
    }

    /// Configured rate-limit window, `None` when unlimited
    pub fn rate_limit_window(&self) -> Option<Duration> {
        self.limiter.window()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

fn warn_if_disabled(policy: &SecretPolicy) {
    if policy.is_disabled() {
        Logger::warn(
            Event::AuthDisabled.as_str(),
            &[("reason", "empty secret admits every request")],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    #[test]
    fn test_secret_checked_before_rate_limit() {
        let gate = RequestGate::new(SecretPolicy::Static("k".into()), 60_000);

        // Denied requests do not consume the window
        assert_eq!(gate.check("1.1.1.1", Some("bad")), Err(GateError::AccessDenied));
        assert_eq!(gate.check("1.1.1.1", Some("k")), Ok(()));
        assert!(matches!(
            gate.check("1.1.1.1", Some("k")),
            Err(GateError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_set_secret_swaps_policy() {
        let gate = RequestGate::new(SecretPolicy::Static("old".into()), DISABLED_WINDOW_MS);
        assert!(gate.check_secret(Some("old"), "x"));

        gate.set_secret(SecretPolicy::Static("new".into()));
        assert!(!gate.check_secret(Some("old"), "x"));
        assert!(gate.check_secret(Some("new"), "x"));
        assert!(!gate.is_auth_disabled());

        gate.set_secret(SecretPolicy::disabled());
        assert!(gate.is_auth_disabled());
    }

    #[test]
    fn test_predicate_may_replace_policy_reentrantly() {
        let gate = Arc::new(RequestGate::open());
        let weak: Weak<RequestGate> = Arc::downgrade(&gate);
        gate.set_secret(SecretPolicy::predicate(move |key, _| {
            if let Some(gate) = weak.upgrade() {
                gate.set_secret(SecretPolicy::Static("rotated".into()));
            }
            key == Some("first")
        }));

        assert!(gate.check_secret(Some("first"), "x"));
        assert!(gate.check_secret(Some("rotated"), "x"));
    }

    #[test]
    fn test_window_reporting() {
        assert_eq!(RequestGate::open().rate_limit_window(), None);
        assert_eq!(
            RequestGate::new(SecretPolicy::disabled(), 250).rate_limit_window(),
            Some(Duration::milliseconds(250))
        );
    }
}
