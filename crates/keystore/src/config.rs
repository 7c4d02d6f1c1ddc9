//! Configuration for the in-memory rotating keystore.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time a retired key stays available for verification (24 hours).
pub const DEFAULT_VERIFY_OVERLAP: Duration = Duration::from_secs(24 * 60 * 60);

/// Default modulus length for generated keys.
pub const DEFAULT_KEY_SIZE: usize = 2048;

/// Default number of primes for generated keys.
pub const DEFAULT_NUM_PRIMES: usize = 2;

/// Configuration for [`MemoryKeystore`](crate::MemoryKeystore).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use portal_common_keystore::KeystoreConfig;
///
/// let config: KeystoreConfig = serde_json::from_str(r#"{"verify_overlap": "2h"}"#)?;
/// assert_eq!(config.verify_overlap, Duration::from_secs(7200));
/// assert_eq!(config.default_key_size, 2048);
///
/// let config = KeystoreConfig::builder().verify_overlap(Duration::from_secs(60)).build();
/// assert_eq!(config.num_primes, 2);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeystoreConfig {
    /// How long a retired key keeps verifying tokens it signed.
    ///
    /// Should be at least the lifetime of the longest-lived token.
    #[serde(with = "humantime_serde", default = "default_verify_overlap")]
    #[builder(default = default_verify_overlap())]
    pub verify_overlap: Duration,

    /// Modulus length used by [`MemoryKeystore::generate`](crate::MemoryKeystore::generate).
    #[serde(default = "default_key_size")]
    #[builder(default = default_key_size())]
    pub default_key_size: usize,

    /// Prime count used by [`MemoryKeystore::generate`](crate::MemoryKeystore::generate).
    ///
    /// Keys with more than two primes verify tokens but are never returned
    /// by `choose_secret`.
    #[serde(default = "default_num_primes")]
    #[builder(default = default_num_primes())]
    pub num_primes: usize,
}

fn default_verify_overlap() -> Duration {
    DEFAULT_VERIFY_OVERLAP
}

fn default_key_size() -> usize {
    DEFAULT_KEY_SIZE
}

fn default_num_primes() -> usize {
    DEFAULT_NUM_PRIMES
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        Self {
            verify_overlap: default_verify_overlap(),
            default_key_size: default_key_size(),
            num_primes: default_num_primes(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_on_empty_document() {
        let config: KeystoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, KeystoreConfig::default());
    }

    #[test]
    fn test_humantime_overlap() {
        let config: KeystoreConfig =
            serde_json::from_str(r#"{"verify_overlap": "90m", "default_key_size": 3072}"#).unwrap();
        assert_eq!(config.verify_overlap, Duration::from_secs(90 * 60));
        assert_eq!(config.default_key_size, 3072);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<KeystoreConfig, _> = serde_json::from_str(r#"{"flush_threshold": 3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_defaults_match_default() {
        assert_eq!(KeystoreConfig::builder().build(), KeystoreConfig::default());
    }
}
