//! Shared test utilities for keystore testing.
//!
//! RSA key generation is slow, so the helpers here generate a handful of
//! 2048-bit keys once per process (from fixed seeds) and hand out copies
//! stamped with whatever `kid` the test asks for. It is feature-gated behind
//! `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! portal-common-keystore = { path = "../keystore", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use portal_common_keystore::testutil::{test_key_pair, test_keystore};
//! ```

use std::sync::OnceLock;

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    config::KeystoreConfig,
    keygen::{KeyPair, Keyset, RsaKeyGenerator},
    memory::MemoryKeystore,
};

/// Number of distinct cached keys available to [`test_key_pair`].
pub const TEST_KEY_SLOTS: usize = 4;

static KEYSETS: [OnceLock<Keyset>; TEST_KEY_SLOTS] = [const { OnceLock::new() }; TEST_KEY_SLOTS];

/// Returns the cached 2048-bit key material for `slot`, generating it on first use.
///
/// # Panics
///
/// Panics if `slot >= TEST_KEY_SLOTS` or key generation fails.
pub fn test_keyset(slot: usize) -> Keyset {
    KEYSETS[slot]
        .get_or_init(|| {
            let mut rng = StdRng::seed_from_u64(0x5eed_0000 + slot as u64);
            RsaKeyGenerator::new()
                .generate_with_rng(&mut rng, 2048, 2)
                .expect("test key generation failed")
        })
        .clone()
}

/// Returns the cached key material for `slot` stamped with `kid`.
///
/// Two calls with the same slot and different kids share key material,
/// which is handy for testing kid mismatches.
///
/// # Panics
///
/// Panics if `slot >= TEST_KEY_SLOTS`.
pub fn test_key_pair(slot: usize, kid: &str) -> KeyPair {
    test_keyset(slot).into_key_pair(kid)
}

/// Creates a [`MemoryKeystore`] with a seeded selection rng holding one
/// signing key per `kid`, using slots `0..kids.len()`.
///
/// # Panics
///
/// Panics if more than [`TEST_KEY_SLOTS`] kids are requested.
pub fn test_keystore(kids: &[&str]) -> MemoryKeystore {
    let keystore = MemoryKeystore::with_rng(KeystoreConfig::default(), StdRng::seed_from_u64(7));
    for (slot, kid) in kids.iter().enumerate() {
        keystore.insert(test_key_pair(slot, kid)).expect("insert test key");
    }
    keystore
}

/// Assert that a [`KeystoreResult`](crate::KeystoreResult) is a
/// [`KeystoreError::KeyNotFound`](crate::KeystoreError::KeyNotFound).
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use portal_common_keystore::{KeystoreError, KeystoreResult, assert_key_not_found};
///
/// let result: KeystoreResult<()> = Err(KeystoreError::key_not_found("k1"));
/// assert_key_not_found!(result);
/// ```
#[macro_export]
macro_rules! assert_key_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::KeystoreError::KeyNotFound { .. })),
            "expected KeystoreError::KeyNotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::KeystoreError::KeyNotFound { .. })),
            "{}: expected KeystoreError::KeyNotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}
