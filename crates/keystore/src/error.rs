//! Keystore error types and result alias.
//!
//! Every keystore backend and the key material generator map their failures
//! onto [`KeystoreError`].
//!
//! # Error Types
//!
//! - [`KeystoreError::KeyNotFound`] - No key with the requested `kid`
//! - [`KeystoreError::Conflict`] - A key with the same `kid` already exists
//! - [`KeystoreError::UnsupportedKeySize`] - Modulus length rejected by the key size policy
//! - [`KeystoreError::UnsupportedPrimeCount`] - Prime count outside the policy range
//! - [`KeystoreError::Generation`] - Entropy or library failure while generating keys
//! - [`KeystoreError::KeySetFetchTimeout`] - Remote key set fetch exceeded its deadline
//! - [`KeystoreError::KeySetFetch`] - Remote key set fetch failed
//! - [`KeystoreError::InvalidKey`] - Key material that cannot be used
//! - [`KeystoreError::Serialization`] - Key set encoding/decoding failures
//!
//! # Example
//!
//! ```
//! use portal_common_keystore::{KeystoreError, KeystoreResult};
//!
//! fn lookup(kid: &str) -> KeystoreResult<()> {
//!     Err(KeystoreError::key_not_found(kid))
//! }
//! ```

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for keystore operations.
pub type KeystoreResult<T> = Result<T, KeystoreError>;

/// Errors that can occur while generating, storing, or resolving keys.
///
/// Errors preserve their source chain via the `#[source]` attribute.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. New variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum KeystoreError {
    /// No key with the given identifier exists.
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// Key ID that was not found.
        kid: String,
    },

    /// A key with the given identifier already exists.
    #[error("Key already exists: {kid}")]
    Conflict {
        /// Key ID that collided.
        kid: String,
    },

    /// The requested modulus length is not permitted by the key size policy.
    #[error("Unsupported key size: {bits} bits")]
    UnsupportedKeySize {
        /// Requested modulus length in bits.
        bits: usize,
    },

    /// The requested number of primes is outside the permitted range.
    #[error("Unsupported prime count: {primes}")]
    UnsupportedPrimeCount {
        /// Requested number of primes.
        primes: usize,
    },

    /// Key generation failed inside the underlying library.
    #[error("Key generation failed: {message}")]
    Generation {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Fetching a remote key set exceeded its deadline.
    #[error("Key set fetch from {url} timed out after {timeout:?}")]
    KeySetFetchTimeout {
        /// Endpoint that was being fetched.
        url: String,
        /// Configured deadline.
        timeout: Duration,
    },

    /// Fetching or parsing a remote key set failed.
    #[error("Key set fetch failed: {message}")]
    KeySetFetch {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Key material is malformed or unusable for the requested operation.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of what is wrong with the key.
        message: String,
    },

    /// Key set serialization or deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl KeystoreError {
    /// Creates a new `KeyNotFound` error for the given key ID.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a new `Conflict` error for the given key ID.
    #[must_use]
    pub fn conflict(kid: impl Into<String>) -> Self {
        Self::Conflict { kid: kid.into() }
    }

    /// Creates a new `UnsupportedKeySize` error.
    #[must_use]
    pub fn unsupported_key_size(bits: usize) -> Self {
        Self::UnsupportedKeySize { bits }
    }

    /// Creates a new `UnsupportedPrimeCount` error.
    #[must_use]
    pub fn unsupported_prime_count(primes: usize) -> Self {
        Self::UnsupportedPrimeCount { primes }
    }

    /// Creates a new `Generation` error with the given message.
    #[must_use]
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation { message: message.into(), source: None }
    }

    /// Creates a new `Generation` error with a message and source error.
    #[must_use]
    pub fn generation_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Generation { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `KeySetFetchTimeout` error.
    #[must_use]
    pub fn key_set_fetch_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self::KeySetFetchTimeout { url: url.into(), timeout }
    }

    /// Creates a new `KeySetFetch` error with the given message.
    #[must_use]
    pub fn key_set_fetch(message: impl Into<String>) -> Self {
        Self::KeySetFetch { message: message.into(), source: None }
    }

    /// Creates a new `KeySetFetch` error with a message and source error.
    #[must_use]
    pub fn key_set_fetch_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::KeySetFetch { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey { message: message.into() }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` for remote fetch failures a caller may retry with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::KeySetFetchTimeout { .. } | Self::KeySetFetch { .. })
    }
}
