//! Authentication error types.
//!
//! This module defines errors that can occur while verifying, mutating and
//! re-signing tokens.

use portal_common_keystore::KeystoreError;
use serde_json::{Map, Value};
use thiserror::Error;

/// Authentication errors.
///
/// The variants fall into three groups:
///
/// - **verification failures** ([`is_verification_failure`](Self::is_verification_failure)):
///   bad format, signature, expiry, audience, algorithm, claims or key material. By default
///   [`Token::verify`](crate::Token::verify) folds these into an invalid token instead of
///   returning them.
/// - **fatal errors**: [`InternalConsistency`](Self::InternalConsistency) and
///   [`Signing`](Self::Signing) always abort the operation.
/// - **keystore errors**: backend failures such as a timed-out key set fetch, which callers may
///   retry.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. New variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Malformed token - cannot be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Token is not yet valid (`nbf` in the future).
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Audience doesn't match expected value.
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),

    /// Algorithm not in allowed list, or not matching the key.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Required claim is missing.
    #[error("Missing claim: {0}")]
    MissingClaim(String),

    /// Key material cannot be turned into a verification key.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// No key with the token's `kid` in the keystore.
    #[error("Signing key not found: {kid}")]
    KeyNotFound {
        /// Key ID that was not found.
        kid: String,
    },

    /// The verified claims differ from the unverified decomposition of the
    /// same token.
    #[error("Verified claims disagree with unverified payload")]
    InternalConsistency {
        /// Payload held by the token before verification.
        unverified: Box<Map<String, Value>>,
        /// Claims returned by signature verification.
        verified: Box<Map<String, Value>>,
    },

    /// No usable signing key, or the signer rejected the key.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Keystore backend error during key lookup.
    ///
    /// Wraps the original [`KeystoreError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Keystore error: {0}")]
    Keystore(
        /// The underlying keystore error.
        #[source]
        KeystoreError,
    ),
}

impl AuthError {
    /// Creates a new `InvalidTokenFormat` error.
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates a new `InvalidAudience` error.
    #[must_use]
    pub fn invalid_audience(message: impl Into<String>) -> Self {
        Self::InvalidAudience(message.into())
    }

    /// Creates a new `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Creates a new `MissingClaim` error.
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim(claim.into())
    }

    /// Creates a new `InvalidPublicKey` error.
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey(message.into())
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a new `InternalConsistency` error.
    #[must_use]
    pub fn internal_consistency(unverified: Map<String, Value>, verified: Map<String, Value>) -> Self {
        Self::InternalConsistency { unverified: Box::new(unverified), verified: Box::new(verified) }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing(message.into())
    }

    /// Returns `true` for errors that mean "this token does not verify", as
    /// opposed to bugs, signing problems or backend outages.
    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidTokenFormat(_)
                | Self::TokenExpired
                | Self::TokenNotYetValid
                | Self::InvalidSignature
                | Self::InvalidAudience(_)
                | Self::UnsupportedAlgorithm(_)
                | Self::MissingClaim(_)
                | Self::InvalidPublicKey(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => {
                AuthError::InvalidTokenFormat("Invalid JWT structure".into())
            },
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidAudience => {
                AuthError::InvalidAudience("Audience validation failed".into())
            },
            ErrorKind::MissingRequiredClaim(claim) => AuthError::MissingClaim(claim.clone()),
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::UnsupportedAlgorithm("Algorithm not supported".into())
            },
            ErrorKind::InvalidRsaKey(reason) => AuthError::InvalidPublicKey(reason.clone()),
            ErrorKind::InvalidKeyFormat => AuthError::InvalidPublicKey("Invalid key format".into()),
            _ => AuthError::InvalidTokenFormat(format!("JWT error: {}", err)),
        }
    }
}

impl From<KeystoreError> for AuthError {
    fn from(err: KeystoreError) -> Self {
        AuthError::Keystore(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
