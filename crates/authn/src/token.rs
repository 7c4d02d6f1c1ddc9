//! Mutable wrapper around a compact signed token.
//!
//! A [`Token`] holds the header and payload of a JWS compact token as
//! [`ChangeTrackingMap`]s, the compact string they came from (if any), and a
//! tri-state [`Validity`].
//!
//! # Lifecycle
//!
//! ```text
//! inbound:  Token::parse(compact) → verify(keystore, audience) → Valid | Invalid
//! outbound: Token::new() → payload_mut().set(..) → default_claims(..) → encode(keystore)
//! ```
//!
//! [`encode`](Token::encode) returns the stored compact string untouched when
//! nothing was modified, and otherwise re-signs with a key drawn from the
//! keystore. It does not replace the stored string; callers adopt the new
//! one with [`set_encoded`](Token::set_encoded).
//!
//! # Example
//!
//! ```no_run
//! use portal_common_authn::Token;
//! use portal_common_keystore::{KeystoreConfig, MemoryKeystore};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let keystore = MemoryKeystore::new(KeystoreConfig::default());
//! keystore.generate("k1")?;
//!
//! let mut token = Token::new();
//! token.payload_mut().set("acc_id", 7);
//! token.default_claims(
//!     [("typ", json!("JWT"))],
//!     [("aud", json!("staff")), ("exp", json!(4_102_444_800_u64))],
//! );
//! let compact = token.encode(&keystore).await?;
//!
//! let mut inbound = Token::new();
//! let claims = inbound.verify(&keystore, Some("staff"), Some(&compact), true).await?;
//! assert_eq!(claims.and_then(|c| c.get("acc_id").cloned()), Some(json!(7)));
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::Validation;
use portal_common_keystore::{Jwk, Keystore};
use serde_json::{Map, Value};

use crate::{
    error::{AuthError, Result},
    keys::{to_decoding_key, to_encoding_key},
    tracked::ChangeTrackingMap,
    validation::{validate_algorithm, validate_key_algorithm},
};

/// Payload claim that identifies the account a token belongs to.
pub const ACC_ID_CLAIM: &str = "acc_id";

/// Verification state of a [`Token`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Validity {
    /// Not verified since construction or since the encoded form was last set.
    #[default]
    Unset,
    /// The last verification succeeded.
    Valid,
    /// The last verification failed.
    Invalid,
}

/// A compact signed token with change tracking.
#[derive(Clone, Debug, Default)]
pub struct Token {
    header: ChangeTrackingMap,
    payload: ChangeTrackingMap,
    encoded: Option<String>,
    validity: Validity,
    destroyed: bool,
}

impl Token {
    /// Creates an empty token under construction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a compact token without verifying it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTokenFormat`] if the string is not a
    /// three-part compact token with JSON object header and payload.
    pub fn parse(compact: &str) -> Result<Self> {
        let mut token = Self::new();
        token.set_encoded(compact)?;
        Ok(token)
    }

    /// Replaces the encoded form, re-reading header and payload from it.
    ///
    /// Tracking state and validity are reset. On error the token is left
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTokenFormat`] for malformed input.
    pub fn set_encoded(&mut self, compact: impl Into<String>) -> Result<()> {
        let compact = compact.into();
        let (header, payload) = decompose(&compact)?;
        self.header = ChangeTrackingMap::from_entries(header);
        self.payload = ChangeTrackingMap::from_entries(payload);
        self.encoded = Some(compact);
        self.validity = Validity::Unset;
        Ok(())
    }

    /// Drops the encoded form and resets header, payload and validity.
    pub fn clear_encoded(&mut self) {
        self.header = ChangeTrackingMap::new();
        self.payload = ChangeTrackingMap::new();
        self.encoded = None;
        self.validity = Validity::Unset;
    }

    /// The compact string this token was last set from.
    #[must_use]
    pub fn encoded(&self) -> Option<&str> {
        self.encoded.as_deref()
    }

    /// Token header.
    #[must_use]
    pub fn header(&self) -> &ChangeTrackingMap {
        &self.header
    }

    /// Mutable token header.
    pub fn header_mut(&mut self) -> &mut ChangeTrackingMap {
        &mut self.header
    }

    /// Token payload (claims).
    #[must_use]
    pub fn payload(&self) -> &ChangeTrackingMap {
        &self.payload
    }

    /// Mutable token payload.
    pub fn payload_mut(&mut self) -> &mut ChangeTrackingMap {
        &mut self.payload
    }

    /// Returns `true` if the header or payload changed since the token was
    /// constructed or its encoded form was last set.
    #[must_use]
    pub fn modified(&self) -> bool {
        self.header.modified() || self.payload.modified()
    }

    /// Current verification state.
    #[must_use]
    pub fn validity(&self) -> Validity {
        self.validity
    }

    /// Returns `true` if the last verification succeeded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    /// Whether the owning session has been marked for removal.
    #[must_use]
    pub fn destroyed(&self) -> bool {
        self.destroyed
    }

    /// Marks the owning session for removal. Nothing here acts on the flag.
    pub fn set_destroyed(&mut self, destroyed: bool) {
        self.destroyed = destroyed;
    }

    /// The `acc_id` claim, if present.
    #[must_use]
    pub fn acc_id(&self) -> Option<&Value> {
        self.payload.get(ACC_ID_CLAIM)
    }

    /// Fills in header and payload members that are not already set.
    pub fn default_claims<H, P, K1, K2>(&mut self, header_fields: H, payload_fields: P)
    where
        H: IntoIterator<Item = (K1, Value)>,
        P: IntoIterator<Item = (K2, Value)>,
        K1: Into<String>,
        K2: Into<String>,
    {
        self.header.merge_defaults(header_fields, false);
        self.payload.merge_defaults(payload_fields, false);
    }

    /// Verifies the token against a key from `keystore`.
    ///
    /// If `unverified` is given it first replaces the encoded form. The
    /// token's validity is [`Validity::Invalid`] unless verification fully
    /// succeeds.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(claims))` when the token verifies
    /// - `Ok(None)` when no key matches the token's `kid`, or verification
    ///   fails and `raise_if_failed` is not set
    ///
    /// # Errors
    ///
    /// - [`AuthError::Keystore`] if the key lookup itself fails
    /// - [`AuthError::InternalConsistency`] if the verified claims differ from
    ///   the current payload, regardless of `raise_if_failed`
    /// - with `raise_if_failed`: [`AuthError::KeyNotFound`] or the
    ///   verification failure
    #[tracing::instrument(skip(self, keystore, unverified))]
    pub async fn verify<K>(
        &mut self,
        keystore: &K,
        audience: Option<&str>,
        unverified: Option<&str>,
        raise_if_failed: bool,
    ) -> Result<Option<Map<String, Value>>>
    where
        K: Keystore + ?Sized,
    {
        self.validity = Validity::Invalid;
        if let Some(compact) = unverified {
            let parsed = self.set_encoded(compact);
            self.validity = Validity::Invalid;
            if let Err(err) = parsed {
                tracing::warn!(error = %err, "unparseable token on verification");
                return failed(err, raise_if_failed);
            }
        }
        let Some(encoded) = self.encoded.clone() else {
            return failed(AuthError::invalid_token_format("token has no encoded form"), raise_if_failed);
        };

        let alg = self.header.get_str("alg").unwrap_or_default().to_owned();
        let Some(kid) = self.header.get_str("kid").map(str::to_owned) else {
            tracing::warn!(alg = %alg, "token header has no kid");
            return failed(AuthError::invalid_token_format("token header has no kid"), raise_if_failed);
        };

        let Some(key) = keystore.choose_pubkey(&kid).await? else {
            tracing::warn!(unverified_kid = %kid, alg = %alg, "public key not found on verification");
            if raise_if_failed {
                return Err(AuthError::key_not_found(kid));
            }
            return Ok(None);
        };

        match verify_compact(&encoded, &key, &alg, audience) {
            Ok(verified) => {
                if verified != *self.payload.as_map() {
                    tracing::error!(
                        kid = %kid,
                        alg = %alg,
                        "verified claims disagree with unverified payload"
                    );
                    return Err(AuthError::internal_consistency(
                        self.payload.as_map().clone(),
                        verified,
                    ));
                }
                self.validity = Validity::Valid;
                Ok(Some(verified))
            },
            Err(err) => {
                tracing::warn!(
                    encoded = %encoded,
                    kid = %kid,
                    alg = %alg,
                    pubkey = ?key.to_public(),
                    error = %err,
                    "token verification failed"
                );
                failed(err, raise_if_failed)
            },
        }
    }

    /// Returns the compact form of this token, signing it if needed.
    ///
    /// An unmodified token that already has an encoded form returns that
    /// form unchanged. Otherwise a secret is chosen from `keystore`
    /// (preferring the header's `kid`), the header's `kid` and `alg` are set
    /// from it, and header plus payload are signed. All other header members
    /// are kept.
    ///
    /// The stored encoded form is not replaced.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingClaim`] if the payload has no `acc_id`
    /// - [`AuthError::Signing`] if no usable secret is found or signing fails
    /// - [`AuthError::Keystore`] if the key lookup fails
    #[tracing::instrument(skip(self, keystore))]
    pub async fn encode<K>(&mut self, keystore: &K) -> Result<String>
    where
        K: Keystore + ?Sized,
    {
        if !self.modified()
            && let Some(encoded) = &self.encoded
        {
            return Ok(encoded.clone());
        }
        if !self.payload.contains_key(ACC_ID_CLAIM) {
            return Err(AuthError::missing_claim(ACC_ID_CLAIM));
        }

        let requested = self.header.get_str("kid").map(str::to_owned);
        let secret = keystore
            .choose_secret(requested.as_deref(), true)
            .await?
            .ok_or_else(|| AuthError::signing("no usable secret key in keystore"))?;
        let kid = secret.kid.clone().ok_or_else(|| AuthError::signing("secret key has no kid"))?;
        let alg = secret
            .alg
            .clone()
            .ok_or_else(|| AuthError::signing(format!("secret key {kid} has no alg")))?;
        let algorithm = validate_algorithm(&alg).map_err(|e| AuthError::signing(e.to_string()))?;

        match requested.as_deref() {
            Some(previous) if previous != kid => {
                tracing::info!(unverified_kid = %previous, verified_kid = %kid, "token re-signed with a different key");
            },
            _ => tracing::debug!(kid = %kid, alg = %alg, "signing token"),
        }

        let encoding_key = to_encoding_key(&secret)?;
        self.header.set("kid", kid);
        self.header.set("alg", alg);

        let header = serde_json::to_vec(self.header.as_map())
            .map_err(|e| AuthError::signing(format!("header serialization failed: {e}")))?;
        let payload = serde_json::to_vec(self.payload.as_map())
            .map_err(|e| AuthError::signing(format!("payload serialization failed: {e}")))?;
        let message =
            format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(payload));
        let signature = jsonwebtoken::crypto::sign(message.as_bytes(), &encoding_key, algorithm)
            .map_err(|e| AuthError::signing(e.to_string()))?;

        Ok(format!("{message}.{signature}"))
    }
}

fn failed(err: AuthError, raise_if_failed: bool) -> Result<Option<Map<String, Value>>> {
    if raise_if_failed { Err(err) } else { Ok(None) }
}

/// Splits a compact token into its unverified header and payload objects.
fn decompose(compact: &str) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let mut parts = compact.split('.');
    let (Some(header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::invalid_token_format("JWT must have 3 parts separated by dots"));
    };
    Ok((decode_segment(header, "header")?, decode_segment(payload, "payload")?))
}

fn decode_segment(segment: &str, name: &str) -> Result<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode JWT {name}: {e}"))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to parse JWT {name}: {e}")))
}

/// Checks algorithm, signature, expiry, audience and `acc_id`, returning
/// the verified claims.
fn verify_compact(
    encoded: &str,
    key: &Jwk,
    alg: &str,
    audience: Option<&str>,
) -> Result<Map<String, Value>> {
    let algorithm = validate_algorithm(alg)?;
    validate_key_algorithm(key, alg)?;
    let decoding_key = to_decoding_key(key)?;

    let mut validation = Validation::new(algorithm);
    // Time claims are checked in `validate_time_claims`, which rejects
    // values that are not integers instead of skipping them.
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let claims = jsonwebtoken::decode::<Map<String, Value>>(encoded, &decoding_key, &validation)?
        .claims;
    validate_time_claims(&claims, Utc::now().timestamp())?;
    validate_audience(&claims, audience)?;
    if !claims.contains_key(ACC_ID_CLAIM) {
        return Err(AuthError::missing_claim(ACC_ID_CLAIM));
    }
    Ok(claims)
}

/// `exp` and `nbf` are optional, but when present they must be integer
/// timestamps. A token expires at `exp` itself, with no leeway.
fn validate_time_claims(claims: &Map<String, Value>, now: i64) -> Result<()> {
    if let Some(exp) = timestamp_claim(claims, "exp")?
        && exp <= now
    {
        return Err(AuthError::TokenExpired);
    }
    if let Some(nbf) = timestamp_claim(claims, "nbf")?
        && nbf > now
    {
        return Err(AuthError::TokenNotYetValid);
    }
    Ok(())
}

fn timestamp_claim(claims: &Map<String, Value>, name: &str) -> Result<Option<i64>> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            AuthError::invalid_token_format(format!("{name} claim must be an integer, got {value}"))
        }),
    }
}

/// A token carrying `aud` must name the expected audience; a token without
/// one is only accepted when no audience is expected.
fn validate_audience(claims: &Map<String, Value>, expected: Option<&str>) -> Result<()> {
    match (claims.get("aud"), expected) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(AuthError::missing_claim("aud")),
        (Some(_), None) => {
            Err(AuthError::invalid_audience("token has an audience but none was expected"))
        },
        (Some(Value::String(aud)), Some(expected)) if aud == expected => Ok(()),
        (Some(Value::Array(auds)), Some(expected))
            if auds.iter().any(|aud| aud.as_str() == Some(expected)) =>
        {
            Ok(())
        },
        (Some(aud), Some(expected)) => {
            Err(AuthError::invalid_audience(format!("expected '{expected}', got {aud}")))
        },
    }
}
