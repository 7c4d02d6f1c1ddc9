//! JWT algorithm validation.
//!
//! This module provides security checks for JWT algorithms, ensuring only
//! the RSA signature algorithms produced by the key generator are accepted.
//!
//! # Security
//!
//! Only RS256, RS384 and RS512 are accepted. Symmetric algorithms and
//! `none` are always rejected, and a key that declares an `alg` can only
//! verify tokens carrying that same `alg`.

use jsonwebtoken::Algorithm;
use portal_common_keystore::Jwk;

use crate::error::AuthError;

/// Forbidden JWT algorithms that are never accepted for security reasons.
///
/// These algorithms are blocked because:
/// - `none`: No signature verification (trivially bypassable)
/// - `HS256`, `HS384`, `HS512`: Symmetric algorithms (shared secret vulnerability)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
///
/// These are exactly the algorithms the default key size policy assigns to
/// generated keys (2048 → RS256, 3072 → RS384, 4096 → RS512).
pub const ACCEPTED_ALGORITHMS: &[&str] = &["RS256", "RS384", "RS512"];

/// Validate JWT algorithm against security policies.
///
/// Returns the matching [`Algorithm`] for use with `jsonwebtoken`.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if:
/// - Algorithm is symmetric (HS256, HS384, HS512)
/// - Algorithm is "none"
/// - Algorithm is not in [`ACCEPTED_ALGORITHMS`]
///
/// # Examples
///
/// ```
/// use jsonwebtoken::Algorithm;
/// use portal_common_authn::validation::validate_algorithm;
///
/// assert_eq!(validate_algorithm("RS256").unwrap(), Algorithm::RS256);
///
/// // Elliptic curve keys are never issued here
/// assert!(validate_algorithm("ES256").is_err());
///
/// // Symmetric algorithm rejected
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<Algorithm, AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    match alg {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        _ => Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list (only RS256, RS384 and RS512 are supported)"
        ))),
    }
}

/// Checks that a verification key may be used with the token's algorithm.
///
/// Keys without an `alg` member are accepted for any allowed algorithm.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if the key declares a
/// different algorithm, and [`AuthError::InvalidPublicKey`] if the key is
/// not an RSA key.
pub fn validate_key_algorithm(key: &Jwk, alg: &str) -> Result<(), AuthError> {
    if key.kty != "RSA" {
        return Err(AuthError::invalid_public_key(format!(
            "key type '{}' cannot verify {} signatures",
            key.kty, alg
        )));
    }
    if let Some(key_alg) = key.alg.as_deref()
        && key_alg != alg
    {
        return Err(AuthError::unsupported_algorithm(format!(
            "token algorithm '{alg}' does not match key algorithm '{key_alg}'"
        )));
    }
    Ok(())
}
