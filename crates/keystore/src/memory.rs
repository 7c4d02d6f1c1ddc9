//! In-memory rotating keystore.
//!
//! [`MemoryKeystore`] keeps key pairs in a shared map guarded by a
//! [`parking_lot::RwLock`]. Lookups take the read lock; every mutation,
//! including a multi-key rotation, happens under a single write lock so
//! readers observe either the complete old key set or the complete new one.
//!
//! Persisting the keys is left to the caller: [`MemoryKeystore::export_private`]
//! and [`MemoryKeystore::export_public`] hand out [`JwkSet`] documents, and
//! [`MemoryKeystore::from_key_sets`] rebuilds a keystore from them.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};

use crate::{
    config::KeystoreConfig,
    error::{KeystoreError, KeystoreResult},
    jwk::{Jwk, JwkSet},
    keygen::{KeyPair, RsaKeyGenerator},
    keystore::Keystore,
};

/// The role a key currently plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRole {
    /// Used for signing new tokens and for verification.
    Signing,
    /// No longer signs; verifies until the overlap window after `since` ends.
    Retired {
        /// When the key left the signing role.
        since: DateTime<Utc>,
    },
}

#[derive(Clone)]
struct KeyEntry {
    private: Option<Jwk>,
    public: Jwk,
    role: KeyRole,
    created_at: DateTime<Utc>,
}

impl KeyEntry {
    fn is_signing(&self) -> bool {
        self.role == KeyRole::Signing && self.private.is_some()
    }

    /// Multi-prime keys stay in the signing role for export and
    /// verification, but tokens can only be signed with two-prime keys.
    fn can_sign(&self) -> bool {
        self.is_signing() && self.private.as_ref().is_some_and(|jwk| jwk.oth.is_none())
    }

    fn is_verifiable(&self, now: DateTime<Utc>, overlap: TimeDelta) -> bool {
        match self.role {
            KeyRole::Signing => true,
            KeyRole::Retired { since } => {
                since.checked_add_signed(overlap).is_none_or(|until| now < until)
            },
        }
    }
}

/// Rotating keystore held in process memory.
///
/// Clones share the same key set.
///
/// # Examples
///
/// ```no_run
/// use portal_common_keystore::{Keystore, KeystoreConfig, MemoryKeystore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let keystore = MemoryKeystore::new(KeystoreConfig::default());
/// let first = keystore.generate("k1")?;
///
/// // Later: bring in a new key and move k1 to verify-only.
/// let second = keystore.rotate_generated("k2", &["k1"])?;
///
/// assert!(keystore.choose_pubkey("k1").await?.is_some());
/// assert_eq!(keystore.active_kids(), vec![second.kid.clone()]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryKeystore {
    keys: Arc<RwLock<HashMap<String, KeyEntry>>>,
    rng: Arc<Mutex<Box<dyn RngCore + Send>>>,
    generator: RsaKeyGenerator,
    config: KeystoreConfig,
}

impl fmt::Debug for MemoryKeystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryKeystore")
            .field("keys", &self.keys.read().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryKeystore {
    fn default() -> Self {
        Self::new(KeystoreConfig::default())
    }
}

impl MemoryKeystore {
    /// Creates an empty keystore whose random selection is seeded from OS entropy.
    #[must_use]
    pub fn new(config: KeystoreConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Creates an empty keystore drawing random key selections from `rng`.
    #[must_use]
    pub fn with_rng(config: KeystoreConfig, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            rng: Arc::new(Mutex::new(Box::new(rng))),
            generator: RsaKeyGenerator::new(),
            config,
        }
    }

    /// Replaces the key generator used by [`generate`](Self::generate).
    #[must_use]
    pub fn with_generator(mut self, generator: RsaKeyGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Rebuilds a keystore from persisted key sets.
    ///
    /// Every key in `private` becomes a signing key. Keys that only appear in
    /// `public` are loaded as retired, so they verify for one more overlap
    /// window counted from now.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::InvalidKey`] if a key lacks a `kid`, or a private key lacks `d`
    /// - [`KeystoreError::Conflict`] if a `kid` appears twice in `private`
    pub fn from_key_sets(
        config: KeystoreConfig,
        private: &JwkSet,
        public: &JwkSet,
    ) -> KeystoreResult<Self> {
        let now = Utc::now();
        let mut keys = HashMap::new();

        for jwk in &private.keys {
            let pair = KeyPair::from_private(jwk.clone())?;
            if keys.contains_key(&pair.kid) {
                return Err(KeystoreError::conflict(pair.kid));
            }
            keys.insert(
                pair.kid,
                KeyEntry {
                    private: Some(pair.private),
                    public: pair.public,
                    role: KeyRole::Signing,
                    created_at: now,
                },
            );
        }

        for jwk in &public.keys {
            let kid =
                jwk.kid.clone().ok_or_else(|| KeystoreError::invalid_key("public key has no kid"))?;
            keys.entry(kid).or_insert_with(|| KeyEntry {
                private: None,
                public: jwk.to_public(),
                role: KeyRole::Retired { since: now },
                created_at: now,
            });
        }

        let keystore = Self::new(config);
        let loaded = keys.len();
        *keystore.keys.write() = keys;
        tracing::info!(
            audit.action = "load_keys",
            audit.result = "success",
            audit.count = loaded,
            "audit_event"
        );
        Ok(keystore)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &KeystoreConfig {
        &self.config
    }

    fn overlap(&self) -> TimeDelta {
        TimeDelta::from_std(self.config.verify_overlap).unwrap_or(TimeDelta::MAX)
    }

    /// Adds a key pair in the signing role.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::Conflict`] if the `kid` is already present.
    #[tracing::instrument(skip(self, pair), fields(kid = %pair.kid))]
    pub fn insert(&self, pair: KeyPair) -> KeystoreResult<()> {
        let mut keys = self.keys.write();
        if keys.contains_key(&pair.kid) {
            return Err(KeystoreError::conflict(pair.kid));
        }
        let kid = pair.kid.clone();
        keys.insert(pair.kid, signing_entry(pair.private, pair.public));
        drop(keys);

        tracing::info!(
            audit.action = "insert_key",
            audit.resource = %kid,
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    /// Generates a key with the configured size and prime count and inserts it.
    ///
    /// # Errors
    ///
    /// Propagates key generation errors and [`KeystoreError::Conflict`].
    pub fn generate(&self, kid: &str) -> KeystoreResult<KeyPair> {
        let pair = self.generate_pair(kid)?;
        self.insert(pair.clone())?;
        Ok(pair)
    }

    fn generate_pair(&self, kid: &str) -> KeystoreResult<KeyPair> {
        Ok(self
            .generator
            .generate(self.config.default_key_size, self.config.num_primes)?
            .into_key_pair(kid))
    }

    /// Atomically adds `new_key` and retires every key in `retire`.
    ///
    /// Either the whole rotation takes effect or none of it does: a duplicate
    /// `new_key.kid` or an unknown `kid` in `retire` leaves the keystore
    /// untouched. Retiring an already-retired key keeps its original
    /// retirement time.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::Conflict`] if `new_key.kid` already exists
    /// - [`KeystoreError::KeyNotFound`] if a key to retire does not exist
    #[tracing::instrument(skip(self, new_key), fields(new_kid = %new_key.kid))]
    pub fn rotate(&self, new_key: KeyPair, retire: &[&str]) -> KeystoreResult<()> {
        let now = Utc::now();
        let mut keys = self.keys.write();

        if keys.contains_key(&new_key.kid) {
            return Err(KeystoreError::conflict(new_key.kid));
        }
        if let Some(missing) = retire.iter().find(|kid| !keys.contains_key(**kid)) {
            return Err(KeystoreError::key_not_found(*missing));
        }

        for kid in retire {
            if let Some(entry) = keys.get_mut(*kid)
                && entry.role == KeyRole::Signing
            {
                entry.role = KeyRole::Retired { since: now };
            }
        }
        let new_kid = new_key.kid.clone();
        keys.insert(new_key.kid, signing_entry(new_key.private, new_key.public));
        drop(keys);

        tracing::info!(
            audit.action = "rotate_keys",
            audit.resource = %new_kid,
            audit.result = "success",
            audit.retired = ?retire,
            "audit_event"
        );
        Ok(())
    }

    /// Generates a key, then [`rotate`](Self::rotate)s it in.
    ///
    /// # Errors
    ///
    /// Propagates key generation and rotation errors.
    pub fn rotate_generated(&self, kid: &str, retire: &[&str]) -> KeystoreResult<KeyPair> {
        let pair = self.generate_pair(kid)?;
        self.rotate(pair.clone(), retire)?;
        Ok(pair)
    }

    /// Moves a key out of the signing role.
    ///
    /// Idempotent: retiring a retired key keeps its original retirement time.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::KeyNotFound`] if the key does not exist.
    #[tracing::instrument(skip(self))]
    pub fn retire(&self, kid: &str) -> KeystoreResult<()> {
        let mut keys = self.keys.write();
        let entry = keys.get_mut(kid).ok_or_else(|| KeystoreError::key_not_found(kid))?;
        if entry.role == KeyRole::Signing {
            entry.role = KeyRole::Retired { since: Utc::now() };
        }
        drop(keys);

        tracing::info!(
            audit.action = "retire_key",
            audit.resource = %kid,
            audit.result = "success",
            "audit_event"
        );
        Ok(())
    }

    /// Removes retired keys whose overlap window has elapsed.
    ///
    /// Returns the purged key IDs, sorted.
    #[tracing::instrument(skip(self))]
    pub fn purge_expired(&self) -> Vec<String> {
        let now = Utc::now();
        let overlap = self.overlap();
        let mut keys = self.keys.write();

        let mut purged: Vec<String> = keys
            .iter()
            .filter(|(_, entry)| !entry.is_verifiable(now, overlap))
            .map(|(kid, _)| kid.clone())
            .collect();
        for kid in &purged {
            keys.remove(kid);
        }
        drop(keys);
        purged.sort();

        if !purged.is_empty() {
            tracing::info!(
                audit.action = "purge_keys",
                audit.result = "success",
                audit.purged = ?purged,
                "audit_event"
            );
        }
        purged
    }

    /// Returns the role of a key, if present.
    #[must_use]
    pub fn role(&self, kid: &str) -> Option<KeyRole> {
        self.keys.read().get(kid).map(|entry| entry.role)
    }

    /// Returns the IDs of the keys currently in the signing role, sorted.
    #[must_use]
    pub fn active_kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self
            .keys
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_signing())
            .map(|(kid, _)| kid.clone())
            .collect();
        kids.sort();
        kids
    }

    /// Total number of keys held, in any role.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Returns `true` if no keys are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Exports every key that can currently verify tokens, sorted by `kid`.
    #[must_use]
    pub fn export_public(&self) -> JwkSet {
        let now = Utc::now();
        let overlap = self.overlap();
        let keys = self.keys.read();
        let mut public: Vec<(String, Jwk)> = keys
            .iter()
            .filter(|(_, entry)| entry.is_verifiable(now, overlap))
            .map(|(kid, entry)| (kid.clone(), entry.public.clone()))
            .collect();
        public.sort_by(|a, b| a.0.cmp(&b.0));
        JwkSet::new(public.into_iter().map(|(_, jwk)| jwk).collect())
    }

    /// Exports the private halves of the signing keys, sorted by `kid`.
    #[must_use]
    pub fn export_private(&self) -> JwkSet {
        let keys = self.keys.read();
        let mut private: Vec<(String, Jwk)> = keys
            .iter()
            .filter(|(_, entry)| entry.is_signing())
            .filter_map(|(kid, entry)| entry.private.clone().map(|jwk| (kid.clone(), jwk)))
            .collect();
        private.sort_by(|a, b| a.0.cmp(&b.0));
        JwkSet::new(private.into_iter().map(|(_, jwk)| jwk).collect())
    }
}

fn signing_entry(private: Jwk, public: Jwk) -> KeyEntry {
    KeyEntry { private: Some(private), public, role: KeyRole::Signing, created_at: Utc::now() }
}

#[async_trait]
impl Keystore for MemoryKeystore {
    #[tracing::instrument(skip(self))]
    async fn choose_pubkey(&self, kid: &str) -> KeystoreResult<Option<Jwk>> {
        let keys = self.keys.read();
        Ok(keys
            .get(kid)
            .filter(|entry| entry.is_verifiable(Utc::now(), self.overlap()))
            .map(|entry| entry.public.clone()))
    }

    #[tracing::instrument(skip(self))]
    async fn choose_secret(
        &self,
        kid: Option<&str>,
        randomly: bool,
    ) -> KeystoreResult<Option<Jwk>> {
        let keys = self.keys.read();

        if let Some(entry) = kid.and_then(|kid| keys.get(kid)).filter(|entry| entry.can_sign()) {
            return Ok(entry.private.clone());
        }

        let mut active: Vec<(&String, &KeyEntry)> =
            keys.iter().filter(|(_, entry)| entry.can_sign()).collect();
        if active.is_empty() {
            return Ok(None);
        }
        // Oldest first, so a seeded rng picks reproducibly.
        active.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then_with(|| a.0.cmp(b.0)));

        let chosen = if randomly {
            let index = self.rng.lock().gen_range(0..active.len());
            active[index].1
        } else {
            active[active.len() - 1].1
        };
        Ok(chosen.private.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use super::*;
    use crate::jwk::{KTY_RSA, OtherPrimeInfo};

    /// Fake key pair; the memory keystore never inspects key material.
    fn fake_pair(kid: &str) -> KeyPair {
        let private = Jwk {
            kty: KTY_RSA.into(),
            kid: Some(kid.into()),
            alg: Some("RS256".into()),
            n: Some(format!("n-{kid}")),
            e: Some("AQAB".into()),
            d: Some(format!("d-{kid}")),
            ..Jwk::default()
        };
        KeyPair::from_private(private).unwrap()
    }

    fn keystore() -> MemoryKeystore {
        MemoryKeystore::with_rng(KeystoreConfig::default(), StdRng::seed_from_u64(42))
    }

    fn keystore_with_overlap(overlap: Duration) -> MemoryKeystore {
        MemoryKeystore::with_rng(
            KeystoreConfig::builder().verify_overlap(overlap).build(),
            StdRng::seed_from_u64(42),
        )
    }

    #[tokio::test]
    async fn test_insert_and_choose_pubkey() {
        let ks = keystore();
        ks.insert(fake_pair("k1")).unwrap();

        let public = ks.choose_pubkey("k1").await.unwrap().expect("key present");
        assert_eq!(public.kid.as_deref(), Some("k1"));
        assert!(!public.is_private());
    }

    #[tokio::test]
    async fn test_choose_pubkey_missing_returns_none() {
        let ks = keystore();
        assert!(ks.choose_pubkey("nope").await.unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_conflicts() {
        let ks = keystore();
        ks.insert(fake_pair("k1")).unwrap();
        let err = ks.insert(fake_pair("k1")).unwrap_err();
        assert!(matches!(err, KeystoreError::Conflict { ref kid } if kid == "k1"));
    }

    #[tokio::test]
    async fn test_choose_secret_prefers_exact_kid() {
        let ks = keystore();
        ks.insert(fake_pair("k1")).unwrap();
        ks.insert(fake_pair("k2")).unwrap();

        for _ in 0..20 {
            let secret = ks.choose_secret(Some("k2"), true).await.unwrap().unwrap();
            assert_eq!(secret.kid.as_deref(), Some("k2"));
            assert!(secret.is_private());
        }
    }

    #[tokio::test]
    async fn test_choose_secret_ignores_retired_kid() {
        let ks = keystore();
        ks.insert(fake_pair("old")).unwrap();
        ks.insert(fake_pair("new")).unwrap();
        ks.retire("old").unwrap();

        let secret = ks.choose_secret(Some("old"), false).await.unwrap().unwrap();
        assert_eq!(secret.kid.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_choose_secret_random_uses_every_active_key() {
        let ks = keystore();
        for kid in ["a", "b", "c"] {
            ks.insert(fake_pair(kid)).unwrap();
        }

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let secret = ks.choose_secret(None, true).await.unwrap().unwrap();
            seen.insert(secret.kid.unwrap());
        }
        assert_eq!(seen.len(), 3, "random selection should reach every key: {seen:?}");
    }

    #[tokio::test]
    async fn test_choose_secret_skips_multi_prime_keys() {
        let ks = keystore();
        ks.insert(fake_pair("two")).unwrap();
        let mut multi = fake_pair("multi");
        multi.private.oth =
            Some(vec![OtherPrimeInfo { r: "Bw".into(), d: "AQ".into(), t: "AQ".into() }]);
        ks.insert(multi).unwrap();
        assert_eq!(ks.active_kids(), vec!["multi".to_string(), "two".to_string()]);

        for _ in 0..50 {
            let secret = ks.choose_secret(None, true).await.unwrap().unwrap();
            assert_eq!(secret.kid.as_deref(), Some("two"));
        }
        let secret = ks.choose_secret(Some("multi"), true).await.unwrap().unwrap();
        assert_eq!(secret.kid.as_deref(), Some("two"));
        assert!(ks.choose_pubkey("multi").await.unwrap().is_some());

        ks.retire("two").unwrap();
        assert!(ks.choose_secret(None, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_choose_secret_deterministic_returns_newest() {
        let ks = keystore();
        ks.insert(fake_pair("first")).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        ks.insert(fake_pair("second")).unwrap();

        let secret = ks.choose_secret(None, false).await.unwrap().unwrap();
        assert_eq!(secret.kid.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_choose_secret_empty_returns_none() {
        let ks = keystore();
        assert!(ks.choose_secret(None, true).await.unwrap().is_none());
        assert!(ks.choose_secret(Some("k"), false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_retires_and_keeps_verifying() {
        let ks = keystore();
        ks.insert(fake_pair("k1")).unwrap();
        ks.rotate(fake_pair("k2"), &["k1"]).unwrap();

        assert_eq!(ks.active_kids(), vec!["k2".to_string()]);
        assert!(matches!(ks.role("k1"), Some(KeyRole::Retired { .. })));
        assert!(ks.choose_pubkey("k1").await.unwrap().is_some());
        assert!(ks.choose_pubkey("k2").await.unwrap().is_some());
    }

    #[test]
    fn test_rotate_with_unknown_kid_changes_nothing() {
        let ks = keystore();
        ks.insert(fake_pair("k1")).unwrap();

        let err = ks.rotate(fake_pair("k2"), &["k1", "ghost"]).unwrap_err();
        assert!(matches!(err, KeystoreError::KeyNotFound { ref kid } if kid == "ghost"));
        assert_eq!(ks.active_kids(), vec!["k1".to_string()]);
        assert!(ks.role("k2").is_none());
    }

    #[test]
    fn test_rotate_with_duplicate_new_kid_changes_nothing() {
        let ks = keystore();
        ks.insert(fake_pair("k1")).unwrap();
        ks.insert(fake_pair("k2")).unwrap();

        let err = ks.rotate(fake_pair("k2"), &["k1"]).unwrap_err();
        assert!(matches!(err, KeystoreError::Conflict { .. }));
        assert_eq!(ks.role("k1"), Some(KeyRole::Signing));
    }

    #[test]
    fn test_retire_is_idempotent() {
        let ks = keystore();
        ks.insert(fake_pair("k1")).unwrap();
        ks.retire("k1").unwrap();
        let first = ks.role("k1");
        std::thread::sleep(Duration::from_millis(5));
        ks.retire("k1").unwrap();
        assert_eq!(ks.role("k1"), first);
        assert!(matches!(ks.retire("missing"), Err(KeystoreError::KeyNotFound { .. })));
    }

    #[tokio::test]
    async fn test_zero_overlap_stops_verification_and_purges() {
        let ks = keystore_with_overlap(Duration::ZERO);
        ks.insert(fake_pair("k1")).unwrap();
        ks.insert(fake_pair("k2")).unwrap();
        ks.retire("k1").unwrap();

        assert!(ks.choose_pubkey("k1").await.unwrap().is_none());
        assert_eq!(ks.purge_expired(), vec!["k1".to_string()]);
        assert_eq!(ks.len(), 1);
        assert!(ks.purge_expired().is_empty());
    }

    #[test]
    fn test_purge_keeps_keys_within_overlap() {
        let ks = keystore_with_overlap(Duration::from_secs(3600));
        ks.insert(fake_pair("k1")).unwrap();
        ks.retire("k1").unwrap();
        assert!(ks.purge_expired().is_empty());
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn test_export_and_reload() {
        let ks = keystore();
        ks.insert(fake_pair("k1")).unwrap();
        ks.rotate(fake_pair("k2"), &["k1"]).unwrap();

        let private = ks.export_private();
        let public = ks.export_public();
        assert_eq!(private.len(), 1);
        assert!(private.keys.iter().all(Jwk::is_private));
        assert_eq!(public.len(), 2);
        assert!(public.keys.iter().all(|k| !k.is_private()));

        let json = public.to_json().unwrap();
        let reloaded =
            MemoryKeystore::from_key_sets(KeystoreConfig::default(), &private, &JwkSet::from_json(&json).unwrap())
                .unwrap();
        assert_eq!(reloaded.active_kids(), vec!["k2".to_string()]);
        assert!(matches!(reloaded.role("k1"), Some(KeyRole::Retired { .. })));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_from_key_sets_rejects_bad_input() {
        let pair = fake_pair("k1");
        let dup = JwkSet::new(vec![pair.private.clone(), pair.private.clone()]);
        assert!(matches!(
            MemoryKeystore::from_key_sets(KeystoreConfig::default(), &dup, &JwkSet::default()),
            Err(KeystoreError::Conflict { .. })
        ));

        let no_kid = JwkSet::new(vec![Jwk { kty: KTY_RSA.into(), ..Jwk::default() }]);
        assert!(matches!(
            MemoryKeystore::from_key_sets(KeystoreConfig::default(), &JwkSet::default(), &no_kid),
            Err(KeystoreError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_clone_shares_state() {
        let ks = keystore();
        let other = ks.clone();
        ks.insert(fake_pair("k1")).unwrap();
        assert_eq!(other.len(), 1);
    }

    /// Readers running during rotations see either the old or the new
    /// signing set, never a mix with zero or two active keys.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rotation_is_atomic_for_readers() {
        let ks = keystore();
        ks.insert(fake_pair("gen-0")).unwrap();

        let reader = {
            let ks = ks.clone();
            tokio::spawn(async move {
                for _ in 0..2_000 {
                    let active = ks.active_kids();
                    assert_eq!(active.len(), 1, "torn rotation observed: {active:?}");
                    let secret = ks.choose_secret(None, true).await.unwrap();
                    assert!(secret.is_some());
                    tokio::task::yield_now().await;
                }
            })
        };

        for generation in 1..200 {
            let previous = format!("gen-{}", generation - 1);
            ks.rotate(fake_pair(&format!("gen-{generation}")), &[previous.as_str()]).unwrap();
            tokio::task::yield_now().await;
        }

        reader.await.expect("reader should not panic");
    }
}
