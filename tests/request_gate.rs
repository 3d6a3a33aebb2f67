//! Request Gate Tests
//!
//! - Fixed window per identity, measured from the admitted request
//! - Exactly one concurrent request per identity is admitted in a window
//! - Per-identity keys fail closed for unknown identities
//! - Refusals by the secret check never stamp the limiter

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tablegate::gate::{GateError, RateLimiter, RequestGate, SecretPolicy};

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_750_000_000_000 + ms).unwrap()
}

// =============================================================================
// Rate Limit
// =============================================================================

/// Blocked requests do not extend the window.
#[test]
fn test_window_is_fixed_from_first_admission() {
    let limiter = RateLimiter::new(1000);

    assert_eq!(limiter.check_and_stamp_at("a", at(0)), Duration::zero());
    assert_eq!(limiter.check_and_stamp_at("a", at(300)), Duration::milliseconds(700));
    assert_eq!(limiter.check_and_stamp_at("a", at(999)), Duration::milliseconds(1));
    assert_eq!(limiter.check_and_stamp_at("a", at(1000)), Duration::zero());
    assert_eq!(limiter.check_and_stamp_at("a", at(1500)), Duration::milliseconds(500));
}

#[test]
fn test_identities_are_independent() {
    let limiter = RateLimiter::new(1000);
    assert_eq!(limiter.check_and_stamp_at("a", at(0)), Duration::zero());
    assert_eq!(limiter.check_and_stamp_at("b", at(10)), Duration::zero());
    assert!(limiter.check_and_stamp_at("a", at(20)) > Duration::zero());
    assert_eq!(limiter.tracked(), 2);
}

#[test]
fn test_expired_stamps_are_pruned() {
    let limiter = RateLimiter::new(100);
    for i in 0..50 {
        limiter.check_and_stamp_at(&format!("client-{}", i), at(0));
    }
    assert_eq!(limiter.tracked(), 50);
    limiter.check_and_stamp_at("late", at(500));
    assert_eq!(limiter.tracked(), 1);
}

#[test]
fn test_concurrent_requests_admit_one() {
    let gate = Arc::new(RequestGate::new(SecretPolicy::disabled(), 60_000));
    let admitted = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..16)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                if gate.check("10.0.0.1", None).is_ok() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
}

#[test]
fn test_negative_window_disables_limiting() {
    let gate = RequestGate::new(SecretPolicy::disabled(), -1);
    assert_eq!(gate.rate_limit_window(), None);
    for _ in 0..100 {
        assert!(gate.check("10.0.0.1", None).is_ok());
    }
}

// =============================================================================
// Secret
// =============================================================================

#[test]
fn test_per_identity_keys_fail_closed() {
    let keys: HashMap<String, String> = [
        ("10.0.0.1".to_string(), "alpha".to_string()),
        ("10.0.0.2".to_string(), "beta".to_string()),
    ]
    .into_iter()
    .collect();
    let gate = RequestGate::new(SecretPolicy::PerIdentity(keys), -1);

    assert!(gate.check("10.0.0.1", Some("alpha")).is_ok());
    assert!(gate.check("10.0.0.2", Some("beta")).is_ok());
    assert_eq!(gate.check("10.0.0.1", Some("beta")), Err(GateError::AccessDenied));
    assert_eq!(gate.check("10.0.0.3", Some("alpha")), Err(GateError::AccessDenied));
    assert_eq!(gate.check("10.0.0.3", None), Err(GateError::AccessDenied));
}

#[test]
fn test_secret_refusal_does_not_stamp() {
    let gate = RequestGate::new(SecretPolicy::Static("k".into()), 60_000);

    assert_eq!(gate.check("c", Some("nope")), Err(GateError::AccessDenied));
    assert_eq!(gate.limiter().tracked(), 0);
    assert!(gate.check("c", Some("k")).is_ok());
    assert!(matches!(
        gate.check("c", Some("k")),
        Err(GateError::RateLimited { remaining }) if remaining > Duration::zero()
    ));
}

#[test]
fn test_policy_from_configuration() {
    let policy: SecretPolicy = serde_json::from_str(r#""shared""#).unwrap();
    assert!(matches!(policy, SecretPolicy::Static(ref key) if key == "shared"));

    let policy: SecretPolicy = serde_json::from_str(r#"{"10.0.0.9": "nine"}"#).unwrap();
    let gate = RequestGate::new(policy, -1);
    assert!(gate.check("10.0.0.9", Some("nine")).is_ok());
    assert!(gate.check("10.0.0.8", Some("nine")).is_err());

    let policy: SecretPolicy = serde_json::from_str(r#""""#).unwrap();
    assert!(policy.is_disabled());
}
