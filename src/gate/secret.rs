//! Secret policies
//!
//! Keys are compared in constant time over their SHA-256 digests so neither
//! content nor length leaks through timing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Caller-supplied secret check: `(provided_key, identity) -> allowed`
pub type SecretPredicate = Arc<dyn Fn(Option<&str>, &str) -> bool + Send + Sync>;

/// How a request's secret is judged
#[derive(Clone)]
pub enum SecretPolicy {
    /// One shared key; an empty key disables authentication
    Static(String),
    /// Key per identity; unknown identities are denied
    PerIdentity(HashMap<String, String>),
    /// Arbitrary check over the provided key and the identity
    Predicate(SecretPredicate),
}

impl SecretPolicy {
    /// Policy that allows everything
    pub fn disabled() -> Self {
        SecretPolicy::Static(String::new())
    }

    pub fn predicate<F>(check: F) -> Self
    where
        F: Fn(Option<&str>, &str) -> bool + Send + Sync + 'static,
    {
        SecretPolicy::Predicate(Arc::new(check))
    }

    /// True when this policy admits every request
    pub fn is_disabled(&self) -> bool {
        matches!(self, SecretPolicy::Static(key) if key.is_empty())
    }
}

impl Default for SecretPolicy {
    fn default() -> Self {
        SecretPolicy::disabled()
    }
}

impl fmt::Debug for SecretPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretPolicy::Static(key) if key.is_empty() => f.write_str("Static(<none>)"),
            SecretPolicy::Static(_) => f.write_str("Static(<redacted>)"),
            SecretPolicy::PerIdentity(keys) => {
                let mut identities: Vec<&String> = keys.keys().collect();
                identities.sort();
                f.debug_tuple("PerIdentity").field(&identities).finish()
            }
            SecretPolicy::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

/// Configuration form: a string or an identity-to-key object
impl<'de> Deserialize<'de> for SecretPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Static(String),
            PerIdentity(HashMap<String, String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Static(key) => SecretPolicy::Static(key),
            Raw::PerIdentity(keys) => SecretPolicy::PerIdentity(keys),
        })
    }
}

/// Constant-time comparison of two keys
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided.as_slice().ct_eq(expected.as_slice()).into()
}

/// Judge `provided` for `identity` under `policy`
pub fn check_secret(policy: &SecretPolicy, provided: Option<&str>, identity: &str) -> bool {
    match policy {
        SecretPolicy::Static(expected) if expected.is_empty() => true,
        SecretPolicy::Static(expected) => provided.is_some_and(|key| keys_match(key, expected)),
        SecretPolicy::PerIdentity(keys) => match (keys.get(identity), provided) {
            (Some(expected), Some(key)) => keys_match(key, expected),
            _ => false,
        },
        SecretPolicy::Predicate(check) => check(provided, identity),
    }
}
