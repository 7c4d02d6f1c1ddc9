//! The keystore abstraction used for token signing and verification.
//!
//! A [`Keystore`] answers two questions:
//!
//! - which public key verifies a token carrying a given `kid`
//!   ([`choose_pubkey`](Keystore::choose_pubkey)), and
//! - which private key should sign the next token
//!   ([`choose_secret`](Keystore::choose_secret)).
//!
//! Backends include the in-process [`MemoryKeystore`](crate::MemoryKeystore)
//! and a remote key set fetcher in the authentication crate.
//!
//! # Rotation
//!
//! ```text
//! ┌─────────────┐  rotate / retire  ┌──────────────┐  overlap elapsed  ┌─────────┐
//! │   Signing   │──────────────────►│   Retired    │──────────────────►│ Purged  │
//! │ sign+verify │                   │ verify only  │                   │         │
//! └─────────────┘                   └──────────────┘                   └─────────┘
//! ```
//!
//! New tokens are signed with a key drawn at random from the signing set,
//! so traffic migrates to a new key gradually instead of at a hard cutover.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{error::KeystoreResult, jwk::Jwk};

/// Source of signing and verification keys.
///
/// Implementations are shared across many concurrent token operations and
/// must be safe for concurrent reads.
#[async_trait]
pub trait Keystore: Send + Sync {
    /// Returns the public key that verifies tokens signed under `kid`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(key))` if a verification key exists
    /// - `Ok(None)` if no key matches; callers must refuse verification
    /// - `Err(...)` only on backend failure (e.g. a remote fetch)
    async fn choose_pubkey(&self, kid: &str) -> KeystoreResult<Option<Jwk>>;

    /// Returns a private key for signing.
    ///
    /// If `kid` names an active signing key, that key is returned. Otherwise,
    /// when `randomly` is set, a key is drawn uniformly from the active
    /// signing keys; when it is not, the newest active key is returned.
    ///
    /// `Ok(None)` means no usable signing key exists.
    async fn choose_secret(&self, kid: Option<&str>, randomly: bool)
    -> KeystoreResult<Option<Jwk>>;
}

#[async_trait]
impl<T: Keystore + ?Sized> Keystore for Arc<T> {
    async fn choose_pubkey(&self, kid: &str) -> KeystoreResult<Option<Jwk>> {
        (**self).choose_pubkey(kid).await
    }

    async fn choose_secret(
        &self,
        kid: Option<&str>,
        randomly: bool,
    ) -> KeystoreResult<Option<Jwk>> {
        (**self).choose_secret(kid, randomly).await
    }
}
