//! JSON Web Key wire types.
//!
//! [`Jwk`] and [`JwkSet`] follow RFC 7517 / RFC 7518 member names. Numeric
//! RSA members are unsigned big-endian integers encoded as base64url without
//! padding; [`encode_uint`] and [`decode_uint`] convert between that form
//! and [`BigUint`].

use std::{collections::BTreeMap, fmt};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use num_bigint_dig::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{KeystoreError, KeystoreResult};

/// Key type for RSA keys.
pub const KTY_RSA: &str = "RSA";

/// Public key use value for signature keys.
pub const USE_SIG: &str = "sig";

/// Encodes an unsigned integer as base64url (no padding), big-endian.
///
/// Zero encodes as a single zero octet (`"AA"`).
#[must_use]
pub fn encode_uint(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

/// Decodes a base64url (no padding) big-endian unsigned integer.
///
/// # Errors
///
/// Returns [`KeystoreError::InvalidKey`] if the input is not valid base64url
/// or is empty.
pub fn decode_uint(encoded: &str) -> KeystoreResult<BigUint> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| KeystoreError::invalid_key(format!("invalid base64url integer: {e}")))?;
    if bytes.is_empty() {
        return Err(KeystoreError::invalid_key("empty integer member"));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

/// One entry of the `oth` (other primes info) member of a multi-prime RSA key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherPrimeInfo {
    /// Prime factor.
    pub r: String,
    /// Factor CRT exponent.
    pub d: String,
    /// Factor CRT coefficient.
    pub t: String,
}

impl fmt::Debug for OtherPrimeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtherPrimeInfo([REDACTED])")
    }
}

/// A single JSON Web Key.
///
/// Only the members this workspace reads are typed; anything else in a
/// fetched document is kept in [`extra`](Self::extra) so keys survive a
/// round trip unchanged.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (`"RSA"` for keys produced here).
    pub kty: String,

    /// Key identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Signature algorithm the key is intended for (e.g. `"RS256"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Intended use (`"sig"` or `"enc"`).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    /// Modulus.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// Public exponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    /// Private exponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// First prime factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    /// Second prime factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// First factor CRT exponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    /// Second factor CRT exponent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    /// First CRT coefficient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    /// Additional primes of a multi-prime key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oth: Option<Vec<OtherPrimeInfo>>,

    /// Members not modelled above.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Jwk {
    /// Returns `true` if the key carries the private exponent.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// Returns `true` if the key may be used for signatures.
    ///
    /// Keys without a `use` member are treated as signature keys.
    #[must_use]
    pub fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().is_none_or(|u| u == USE_SIG)
    }

    /// Returns a copy with every private member removed.
    #[must_use]
    pub fn to_public(&self) -> Jwk {
        Jwk {
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            oth: None,
            ..self.clone()
        }
    }

    /// Returns the named RSA integer member (`n`, `e`, `d`, `p`, `q`, `dp`,
    /// `dq` or `qi`).
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::InvalidKey`] if the member is absent or is
    /// not an RSA integer member.
    pub fn member(&self, name: &str) -> KeystoreResult<&str> {
        let value = match name {
            "n" => &self.n,
            "e" => &self.e,
            "d" => &self.d,
            "p" => &self.p,
            "q" => &self.q,
            "dp" => &self.dp,
            "dq" => &self.dq,
            "qi" => &self.qi,
            other => {
                return Err(KeystoreError::invalid_key(format!("'{other}' is not an RSA member")));
            },
        };
        value.as_deref().ok_or_else(|| {
            KeystoreError::invalid_key(format!(
                "key {} is missing member '{name}'",
                self.kid.as_deref().unwrap_or("<no kid>")
            ))
        })
    }

    /// Decodes the named RSA integer member.
    ///
    /// # Errors
    ///
    /// Fails if the member is absent or not valid base64url.
    pub fn member_uint(&self, name: &str) -> KeystoreResult<BigUint> {
        decode_uint(self.member(name)?)
    }
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .field("use", &self.key_use)
            .field("n", &self.n)
            .field("e", &self.e)
            .field("private", &self.is_private())
            .finish_non_exhaustive()
    }
}

/// A JSON Web Key Set document (`{"keys": [...]}`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JwkSet {
    /// The keys in the set.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Creates a key set from a list of keys.
    #[must_use]
    pub fn new(keys: Vec<Jwk>) -> Self {
        Self { keys }
    }

    /// Finds the key with the given `kid`.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Returns the keys usable for signature verification: those with a
    /// `kid` and a `use` of `"sig"` or none at all.
    #[must_use]
    pub fn signing_keys(&self) -> Vec<Jwk> {
        self.keys.iter().filter(|k| k.kid.is_some() && k.is_signing_key()).cloned().collect()
    }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Parses a key set from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::Serialization`] if the document is not a
    /// valid key set.
    pub fn from_json(json: &str) -> KeystoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| KeystoreError::serialization_with_source("invalid JWK set document", e))
    }

    /// Serializes the key set to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`KeystoreError::Serialization`] on encoder failure.
    pub fn to_json(&self) -> KeystoreResult<String> {
        serde_json::to_string(self)
            .map_err(|e| KeystoreError::serialization_with_source("failed to encode JWK set", e))
    }
}
