//! Helpers shared by the authn integration tests.

#![allow(dead_code, clippy::expect_used)]

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use portal_common_authn::Token;
use portal_common_keystore::{JwkSet, KeyPair, Keystore};
use serde_json::{Value, json};

/// Audience used by the signed tokens below.
pub const AUDIENCE: &str = "staff-portal";

/// Asserts that a `Result<T, AuthError>` is an `Err` matching the given variant.
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err(portal_common_authn::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err(portal_common_authn::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

/// Unix timestamp `seconds` from now (negative for the past).
pub fn timestamp_in(seconds: i64) -> i64 {
    Utc::now().timestamp() + seconds
}

/// Creates a raw compact token from arbitrary header and payload JSON with
/// the given signature segment.
pub fn craft_raw_jwt(header: &Value, payload: &Value, signature: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).expect("header json"));
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).expect("payload json"));
    format!("{header}.{payload}.{signature}")
}

/// A new token for `acc_id` with a one-hour expiry and [`AUDIENCE`].
pub fn new_token(acc_id: i64) -> Token {
    let mut token = Token::new();
    token.payload_mut().set("acc_id", acc_id);
    token.default_claims(
        [("typ", json!("JWT"))],
        [("aud", json!(AUDIENCE)), ("exp", json!(timestamp_in(3600)))],
    );
    token
}

/// Signs a fresh token for `acc_id` with a key drawn from `keystore`.
pub async fn signed_token<K: Keystore + ?Sized>(keystore: &K, acc_id: i64) -> String {
    new_token(acc_id).encode(keystore).await.expect("encode test token")
}

/// Serves the public halves of `pairs` as a key set document.
pub fn jwks_body(pairs: &[&KeyPair]) -> Value {
    let set = JwkSet::new(pairs.iter().map(|pair| pair.public.clone()).collect());
    serde_json::to_value(set).expect("key set json")
}
