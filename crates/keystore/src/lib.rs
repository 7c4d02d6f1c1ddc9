//! # Portal Common Keystore
//!
//! Key material and key management for token signing in portal services.
//!
//! This crate provides:
//! - **[`Keystore`]**: the `choose_pubkey` / `choose_secret` abstraction token code signs and
//!   verifies against
//! - **[`MemoryKeystore`]**: an in-process rotating keystore with a verification overlap window
//! - **[`RsaKeyGenerator`]**: RSA key generation rendered as JSON Web Keys
//! - **[`Jwk`] / [`JwkSet`]**: the key set wire format used for persistence and remote exchange
//!
//! ## Quick Start
//!
//! ```no_run
//! use portal_common_keystore::{Keystore, KeystoreConfig, MemoryKeystore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let keystore = MemoryKeystore::new(KeystoreConfig::default());
//!     keystore.generate("2024-q1")?;
//!
//!     let secret = keystore.choose_secret(None, true).await?.expect("a signing key");
//!     let public = keystore.choose_pubkey("2024-q1").await?.expect("a verification key");
//!     assert_eq!(secret.kid, public.kid);
//!
//!     // Hand the public keys to whatever serves the JWKS endpoint.
//!     let jwks = keystore.export_public().to_json()?;
//!     println!("{jwks}");
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with cached test keys and assertion macros.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod jwk;
pub mod keygen;
pub mod keystore;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use config::KeystoreConfig;
pub use error::{BoxError, KeystoreError, KeystoreResult};
pub use jwk::{Jwk, JwkSet, OtherPrimeInfo, decode_uint, encode_uint};
pub use keygen::{KeyPair, KeySizePolicy, Keyset, RsaKeyGenerator, SignatureAlgorithm};
pub use keystore::Keystore;
pub use memory::{KeyRole, MemoryKeystore};
