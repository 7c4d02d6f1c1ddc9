//! # Portal Common Authentication
//!
//! Token handling for portal services, built on the keystores in
//! `portal-common-keystore`.
//!
//! This crate provides:
//! - **[`Token`]**: parse, verify, mutate and re-sign compact signed tokens
//! - **[`ChangeTrackingMap`]**: header and payload maps that know whether they were written to
//! - **[`RemoteJwksKeystore`]**: a keystore that resolves keys from a remote JWKS endpoint
//! - **Algorithm validation**: Security checks for JWT algorithms
//!
//! ## Features
//!
//! - Only asymmetric RSA algorithms (RS256, RS384, RS512) are supported
//! - Symmetric algorithms (HS256, etc.) and `none` are explicitly rejected
//! - Verification failures are reported as an invalid token unless the caller asks for the error
//!
//! ## Example
//!
//! ```no_run
//! use portal_common_authn::{RemoteJwksConfig, RemoteJwksKeystore, Token};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let keystore = RemoteJwksKeystore::new(
//!     RemoteJwksConfig::builder().url("https://auth.example.com/jwks").build(),
//! )?;
//!
//! let compact = "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsxIn0...";
//! let mut token = Token::new();
//! if let Some(claims) = token.verify(&keystore, Some("staff"), Some(compact), false).await? {
//!     println!("Verified account: {:?}", claims.get("acc_id"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Enables fail point injection around key set fetches.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Remote keystore configuration.
pub mod config;
/// Authentication error types.
pub mod error;
/// JWK to signing and verification key conversion.
pub mod keys;
/// Remote JWKS-backed keystore.
pub mod remote;
/// Compact token wrapper.
pub mod token;
/// Change-tracking map.
pub mod tracked;
/// Algorithm validation.
pub mod validation;

// Re-export key types for convenience
pub use config::RemoteJwksConfig;
pub use error::{AuthError, Result};
pub use remote::RemoteJwksKeystore;
pub use token::{ACC_ID_CLAIM, Token, Validity};
pub use tracked::ChangeTrackingMap;
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
