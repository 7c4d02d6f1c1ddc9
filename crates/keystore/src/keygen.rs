//! RSA key material generation in JWK layout.
//!
//! [`RsaKeyGenerator`] produces a [`Keyset`]: the private and public halves of
//! a freshly generated RSA key rendered as [`Jwk`]s, together with the key
//! size and the signature algorithm the key is meant for.
//!
//! # Pipeline
//!
//! ```text
//! policy check (size → algorithm, prime count)
//!   → generate distinct primes, n, d           (native integers)
//!   → CRT exponents + coefficient as `qp`, `oth` triples
//!   → cross-check with the `rsa` crate
//!   → rename `qp` → `qi`
//!   → base64url-encode every integer, recursing into `oth`
//! ```
//!
//! # Algorithm Policy
//!
//! The algorithm is looked up in an explicit [`KeySizePolicy`] table. The
//! default table maps 2048 → RS256, 3072 → RS384 and 4096 → RS512; no hash
//! size is ever derived from the modulus length arithmetically.
//!
//! # Example
//!
//! ```no_run
//! use portal_common_keystore::RsaKeyGenerator;
//!
//! let keyset = RsaKeyGenerator::new().generate(2048, 2)?;
//! assert_eq!(keyset.algorithm.as_str(), "RS256");
//! let pair = keyset.into_key_pair("2024-rotation-1");
//! assert!(pair.private.is_private());
//! # Ok::<(), portal_common_keystore::KeystoreError>(())
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr};

use num_bigint_dig::{BigUint, ModInverse, RandPrime};
use rand::{CryptoRng, RngCore, rngs::OsRng};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{KeystoreError, KeystoreResult},
    jwk::{Jwk, KTY_RSA, USE_SIG, encode_uint},
};

/// Public exponent used for every generated key (F4).
pub const PUBLIC_EXPONENT: u32 = 65_537;

/// Default upper bound on the number of primes of a multi-prime key.
pub const DEFAULT_MAX_PRIMES: usize = 5;

/// Attempts at finding a prime set whose product has the requested size.
const MAX_GENERATION_ATTEMPTS: usize = 64;

/// Name the generator uses internally for the first CRT coefficient.
const NATIVE_CRT_COEFFICIENT: &str = "qp";

/// Name the JWK standard uses for the first CRT coefficient.
const WIRE_CRT_COEFFICIENT: &str = "qi";

/// Name of the additional-primes list.
const OTHER_PRIMES: &str = "oth";

/// RSA PKCS#1 v1.5 signature algorithms a generated key can be tagged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    RS512,
}

impl SignatureAlgorithm {
    /// Returns the JOSE algorithm name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = KeystoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            other => Err(KeystoreError::invalid_key(format!("unsupported algorithm '{other}'"))),
        }
    }
}

/// Which modulus sizes may be generated, and which algorithm each one gets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySizePolicy {
    sizes: BTreeMap<usize, SignatureAlgorithm>,
    max_primes: usize,
}

impl Default for KeySizePolicy {
    fn default() -> Self {
        Self::empty()
            .allow(2048, SignatureAlgorithm::RS256)
            .allow(3072, SignatureAlgorithm::RS384)
            .allow(4096, SignatureAlgorithm::RS512)
    }
}

impl KeySizePolicy {
    /// A policy that permits no key size at all.
    #[must_use]
    pub fn empty() -> Self {
        Self { sizes: BTreeMap::new(), max_primes: DEFAULT_MAX_PRIMES }
    }

    /// Permits `bits`-sized keys, tagged with `algorithm`.
    #[must_use]
    pub fn allow(mut self, bits: usize, algorithm: SignatureAlgorithm) -> Self {
        self.sizes.insert(bits, algorithm);
        self
    }

    /// Sets the maximum number of primes (at least 2).
    #[must_use]
    pub fn with_max_primes(mut self, max_primes: usize) -> Self {
        self.max_primes = max_primes.max(2);
        self
    }

    /// Returns the algorithm for a key size.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::UnsupportedKeySize`] if the size is not in the table.
    pub fn algorithm_for(&self, bits: usize) -> KeystoreResult<SignatureAlgorithm> {
        self.sizes.get(&bits).copied().ok_or_else(|| KeystoreError::unsupported_key_size(bits))
    }

    /// Checks a prime count against the policy.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::UnsupportedPrimeCount`] outside `2..=max_primes`.
    pub fn check_primes(&self, num_primes: usize) -> KeystoreResult<()> {
        if (2..=self.max_primes).contains(&num_primes) {
            Ok(())
        } else {
            Err(KeystoreError::unsupported_prime_count(num_primes))
        }
    }

    /// Permitted key sizes in ascending order.
    pub fn supported_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.sizes.keys().copied()
    }
}

/// Output of a key generation run.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyset {
    /// Private key members (`n e d p q dp dq qi`, optional `oth`).
    pub private: Jwk,
    /// Public key members (`n e`).
    pub public: Jwk,
    /// Modulus length in bits.
    pub size: usize,
    /// Algorithm selected by the key size policy.
    pub algorithm: SignatureAlgorithm,
}

impl Keyset {
    /// Stamps both halves with `kid`, `alg` and `use` and returns a [`KeyPair`]
    /// ready to be placed in a keystore.
    #[must_use]
    pub fn into_key_pair(self, kid: impl Into<String>) -> KeyPair {
        let kid = kid.into();
        let stamp = |mut jwk: Jwk| {
            jwk.kty = KTY_RSA.to_string();
            jwk.kid = Some(kid.clone());
            jwk.alg = Some(self.algorithm.as_str().to_string());
            jwk.key_use = Some(USE_SIG.to_string());
            jwk
        };
        let private = stamp(self.private);
        let public = stamp(self.public);
        KeyPair { kid, private, public }
    }
}

/// A signing key and its matching verification key under one `kid`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyPair {
    /// Key identifier shared by both halves.
    pub kid: String,
    /// Private signing key.
    pub private: Jwk,
    /// Public verification key.
    pub public: Jwk,
}

impl KeyPair {
    /// Builds a pair from a private JWK, deriving the public half.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::InvalidKey`] if the key has no `kid` or no
    /// private exponent.
    pub fn from_private(private: Jwk) -> KeystoreResult<Self> {
        let kid = private
            .kid
            .clone()
            .ok_or_else(|| KeystoreError::invalid_key("private key has no kid"))?;
        if !private.is_private() {
            return Err(KeystoreError::invalid_key(format!("key {kid} has no private exponent")));
        }
        let public = private.to_public();
        Ok(Self { kid, private, public })
    }
}

/// A component value in the generator's native representation.
#[derive(Clone, Debug, PartialEq)]
enum NativeValue {
    Int(BigUint),
    List(Vec<NativeComponents>),
}

type NativeComponents = BTreeMap<&'static str, NativeValue>;

/// Native output before wire encoding.
#[derive(Clone, Debug)]
struct NativeKey {
    private: NativeComponents,
    public: NativeComponents,
}

/// Generates RSA key material and renders it as JWKs.
#[derive(Clone, Debug, Default)]
pub struct RsaKeyGenerator {
    policy: KeySizePolicy,
}

impl RsaKeyGenerator {
    /// Creates a generator with the default [`KeySizePolicy`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator with a custom policy.
    #[must_use]
    pub fn with_policy(policy: KeySizePolicy) -> Self {
        Self { policy }
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> &KeySizePolicy {
        &self.policy
    }

    /// Generates a key using operating system entropy.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::UnsupportedKeySize`] if the policy rejects `key_size_in_bits`
    /// - [`KeystoreError::UnsupportedPrimeCount`] if `num_primes` is out of range
    /// - [`KeystoreError::Generation`] on library failure
    pub fn generate(&self, key_size_in_bits: usize, num_primes: usize) -> KeystoreResult<Keyset> {
        self.generate_with_rng(&mut OsRng, key_size_in_bits, num_primes)
    }

    /// Generates a key drawing randomness from `rng`.
    ///
    /// # Errors
    ///
    /// Same as [`generate`](Self::generate).
    #[tracing::instrument(skip(self, rng))]
    pub fn generate_with_rng<R>(
        &self,
        rng: &mut R,
        key_size_in_bits: usize,
        num_primes: usize,
    ) -> KeystoreResult<Keyset>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let algorithm = self.policy.algorithm_for(key_size_in_bits)?;
        self.policy.check_primes(num_primes)?;

        let native = generate_native(rng, key_size_in_bits, num_primes)?;
        let keyset = Keyset {
            private: to_wire(native.private)?,
            public: to_wire(native.public)?,
            size: key_size_in_bits,
            algorithm,
        };

        tracing::debug!(
            size = key_size_in_bits,
            num_primes,
            algorithm = %algorithm,
            "generated RSA key material"
        );
        Ok(keyset)
    }
}

/// Generates primes, private exponent and CRT values under native names.
fn generate_native<R>(rng: &mut R, bits: usize, num_primes: usize) -> KeystoreResult<NativeKey>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let one = BigUint::from(1u32);
    let e = BigUint::from(PUBLIC_EXPONENT);

    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let mut remaining = bits;
        let mut primes = Vec::with_capacity(num_primes);
        for i in 0..num_primes {
            let prime_bits = remaining / (num_primes - i);
            primes.push(rng.gen_prime(prime_bits));
            remaining -= prime_bits;
        }

        if primes.iter().enumerate().any(|(i, p)| primes[..i].contains(p)) {
            continue;
        }

        let n = primes.iter().fold(one.clone(), |acc, p| &acc * p);
        if n.bits() != bits {
            continue;
        }

        let totient = primes.iter().fold(one.clone(), |acc, p| &acc * &(p - &one));
        let Some(d) = e.clone().mod_inverse(&totient).and_then(|d| d.to_biguint()) else {
            continue;
        };

        let validated = RsaPrivateKey::from_components(n.clone(), e.clone(), d.clone(), primes.clone())
            .map_err(|err| KeystoreError::generation_with_source("rsa component check failed", err))?;
        validated
            .validate()
            .map_err(|err| KeystoreError::generation_with_source("generated key is invalid", err))?;

        return native_components(n, e, d, &primes);
    }

    Err(KeystoreError::generation(format!(
        "no suitable {num_primes}-prime set for a {bits}-bit modulus after {MAX_GENERATION_ATTEMPTS} attempts"
    )))
}

fn native_components(
    n: BigUint,
    e: BigUint,
    d: BigUint,
    primes: &[BigUint],
) -> KeystoreResult<NativeKey> {
    let one = BigUint::from(1u32);
    let [p, q, rest @ ..] = primes else {
        return Err(KeystoreError::generation("fewer than two primes"));
    };

    let inverse = |value: &BigUint, modulus: &BigUint| {
        value
            .clone()
            .mod_inverse(modulus)
            .and_then(|v| v.to_biguint())
            .ok_or_else(|| KeystoreError::generation("CRT coefficient does not exist"))
    };

    let mut private = NativeComponents::new();
    private.insert("dp", NativeValue::Int(&d % &(p - &one)));
    private.insert("dq", NativeValue::Int(&d % &(q - &one)));
    private.insert(NATIVE_CRT_COEFFICIENT, NativeValue::Int(inverse(q, p)?));

    if !rest.is_empty() {
        let mut product = p * q;
        let mut others = Vec::with_capacity(rest.len());
        for r in rest {
            let mut info = NativeComponents::new();
            info.insert("r", NativeValue::Int(r.clone()));
            info.insert("d", NativeValue::Int(&d % &(r - &one)));
            info.insert("t", NativeValue::Int(inverse(&product, r)?));
            others.push(info);
            product = &product * r;
        }
        private.insert(OTHER_PRIMES, NativeValue::List(others));
    }

    private.insert("p", NativeValue::Int(p.clone()));
    private.insert("q", NativeValue::Int(q.clone()));
    private.insert("d", NativeValue::Int(d));
    private.insert("n", NativeValue::Int(n.clone()));
    private.insert("e", NativeValue::Int(e.clone()));

    let mut public = NativeComponents::new();
    public.insert("n", NativeValue::Int(n));
    public.insert("e", NativeValue::Int(e));

    Ok(NativeKey { private, public })
}

/// Renames the CRT coefficient and encodes every integer for the wire.
fn to_wire(mut native: NativeComponents) -> KeystoreResult<Jwk> {
    if let Some(coefficient) = native.remove(NATIVE_CRT_COEFFICIENT) {
        native.insert(WIRE_CRT_COEFFICIENT, coefficient);
    }

    let mut object = encode_components(native);
    object.insert("kty".to_string(), Value::String(KTY_RSA.to_string()));
    serde_json::from_value(Value::Object(object))
        .map_err(|e| KeystoreError::serialization_with_source("generated key is not a JWK", e))
}

fn encode_components(components: NativeComponents) -> Map<String, Value> {
    components
        .into_iter()
        .map(|(name, value)| {
            let encoded = match value {
                NativeValue::Int(int) => Value::String(encode_uint(&int)),
                NativeValue::List(items) => Value::Array(
                    items.into_iter().map(|item| Value::Object(encode_components(item))).collect(),
                ),
            };
            (name.to_string(), encoded)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use rstest::rstest;

    use super::*;
    use crate::jwk::decode_uint;

    fn int(components: &NativeComponents, name: &str) -> BigUint {
        match components.get(name) {
            Some(NativeValue::Int(value)) => value.clone(),
            other => panic!("{name} is not an integer: {other:?}"),
        }
    }

    #[rstest]
    #[case(2048, SignatureAlgorithm::RS256)]
    #[case(3072, SignatureAlgorithm::RS384)]
    #[case(4096, SignatureAlgorithm::RS512)]
    fn test_default_policy_table(#[case] bits: usize, #[case] expected: SignatureAlgorithm) {
        assert_eq!(KeySizePolicy::default().algorithm_for(bits).unwrap(), expected);
    }

    #[rstest]
    #[case(512)]
    #[case(1024)]
    #[case(2047)]
    #[case(8192)]
    fn test_unsupported_sizes_rejected(#[case] bits: usize) {
        let result = RsaKeyGenerator::new().generate(bits, 2);
        assert!(matches!(result, Err(KeystoreError::UnsupportedKeySize { bits: b }) if b == bits));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(6)]
    fn test_unsupported_prime_counts_rejected(#[case] primes: usize) {
        let result = RsaKeyGenerator::new().generate(2048, primes);
        assert!(
            matches!(result, Err(KeystoreError::UnsupportedPrimeCount { primes: p }) if p == primes)
        );
    }

    #[test]
    fn test_custom_policy() {
        let policy = KeySizePolicy::empty().allow(3072, SignatureAlgorithm::RS256).with_max_primes(3);
        assert_eq!(policy.algorithm_for(3072).unwrap(), SignatureAlgorithm::RS256);
        assert!(policy.algorithm_for(2048).is_err());
        assert!(policy.check_primes(3).is_ok());
        assert!(policy.check_primes(4).is_err());
        assert_eq!(policy.supported_sizes().collect::<Vec<_>>(), vec![3072]);
    }

    #[test]
    fn test_algorithm_names_round_trip() {
        for alg in [SignatureAlgorithm::RS256, SignatureAlgorithm::RS384, SignatureAlgorithm::RS512] {
            assert_eq!(alg.as_str().parse::<SignatureAlgorithm>().unwrap(), alg);
        }
        assert!("HS256".parse::<SignatureAlgorithm>().is_err());
    }

    #[test]
    fn test_wire_members_decode_to_native_components() {
        let mut rng = StdRng::seed_from_u64(7);
        let native = generate_native(&mut rng, 2048, 2).unwrap();

        let private = to_wire(native.private.clone()).unwrap();
        let public = to_wire(native.public.clone()).unwrap();

        for name in ["n", "e", "d", "p", "q", "dp", "dq"] {
            assert_eq!(private.member_uint(name).unwrap(), int(&native.private, name), "{name}");
        }
        assert_eq!(private.member_uint("qi").unwrap(), int(&native.private, "qp"));
        assert!(!private.extra.contains_key("qp"), "native coefficient name leaked");
        assert!(private.oth.is_none());

        assert_eq!(public.member_uint("n").unwrap(), int(&native.public, "n"));
        assert_eq!(public.member_uint("e").unwrap(), BigUint::from(PUBLIC_EXPONENT));
        assert!(!public.is_private());
    }

    #[test]
    fn test_multi_prime_key_encodes_other_primes() {
        let mut rng = StdRng::seed_from_u64(11);
        let native = generate_native(&mut rng, 2048, 3).unwrap();
        let private = to_wire(native.private.clone()).unwrap();

        let Some(NativeValue::List(raw_others)) = native.private.get(OTHER_PRIMES) else {
            panic!("expected an oth list");
        };
        let others = private.oth.as_ref().expect("oth member");
        assert_eq!(others.len(), 1);
        assert_eq!(raw_others.len(), 1);

        let raw = &raw_others[0];
        assert_eq!(decode_uint(&others[0].r).unwrap(), int(raw, "r"));
        assert_eq!(decode_uint(&others[0].d).unwrap(), int(raw, "d"));
        assert_eq!(decode_uint(&others[0].t).unwrap(), int(raw, "t"));

        // n is the product of all three primes.
        let n = private.member_uint("p").unwrap()
            * private.member_uint("q").unwrap()
            * decode_uint(&others[0].r).unwrap();
        assert_eq!(n, private.member_uint("n").unwrap());
        assert_eq!(n.bits(), 2048);
    }

    #[test]
    fn test_crt_values_are_consistent() {
        let mut rng = StdRng::seed_from_u64(3);
        let keyset = RsaKeyGenerator::new().generate_with_rng(&mut rng, 2048, 2).unwrap();
        let key = &keyset.private;
        let one = BigUint::from(1u32);

        let p = key.member_uint("p").unwrap();
        let q = key.member_uint("q").unwrap();
        let d = key.member_uint("d").unwrap();
        let qi = key.member_uint("qi").unwrap();

        assert_eq!(key.member_uint("dp").unwrap(), &d % &(&p - &one));
        assert_eq!(key.member_uint("dq").unwrap(), &d % &(&q - &one));
        assert_eq!((&qi * &q) % &p, one);
        assert_eq!(keyset.size, 2048);
        assert_eq!(keyset.algorithm, SignatureAlgorithm::RS256);
    }

    #[test]
    fn test_into_key_pair_stamps_metadata() {
        let mut rng = StdRng::seed_from_u64(5);
        let pair = RsaKeyGenerator::new()
            .generate_with_rng(&mut rng, 2048, 2)
            .unwrap()
            .into_key_pair("k-2024");

        for jwk in [&pair.private, &pair.public] {
            assert_eq!(jwk.kid.as_deref(), Some("k-2024"));
            assert_eq!(jwk.alg.as_deref(), Some("RS256"));
            assert_eq!(jwk.key_use.as_deref(), Some("sig"));
            assert_eq!(jwk.kty, "RSA");
        }
        assert_eq!(pair.public, pair.private.to_public());

        let rebuilt = KeyPair::from_private(pair.private.clone()).unwrap();
        assert_eq!(rebuilt, pair);
    }

    #[test]
    fn test_key_pair_from_public_key_rejected() {
        let public = Jwk { kty: KTY_RSA.into(), kid: Some("k".into()), ..Jwk::default() };
        assert!(matches!(KeyPair::from_private(public), Err(KeystoreError::InvalidKey { .. })));
    }
}
