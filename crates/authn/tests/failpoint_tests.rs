#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the authn crate.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p portal-common-authn --features failpoints --test failpoint_tests
//! ```

mod common;

use common::{AUDIENCE, jwks_body, signed_token};
use portal_common_authn::{AuthError, RemoteJwksConfig, RemoteJwksKeystore, Token};
use portal_common_keystore::{
    KeystoreError,
    testutil::{test_key_pair, test_keystore},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

async fn setup_remote() -> (MockServer, RemoteJwksKeystore) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[&test_key_pair(0, "k1")])))
        .mount(&server)
        .await;

    let config =
        RemoteJwksConfig::builder().url(format!("{}/jwks", server.uri())).allow_http(true).build();
    let remote = RemoteJwksKeystore::new(config).expect("failed to build keystore");
    (server, remote)
}

#[tokio::test]
async fn key_set_fetch_failpoint_returns_error() {
    let scenario = fail::FailScenario::setup();
    let (_server, remote) = setup_remote().await;

    // Enable fail point: the fetch fails before any request is sent
    fail::cfg("remote-jwks-before-fetch", "return").expect("failed to configure fail point");

    let result = remote.count().await;
    assert!(matches!(result, Err(KeystoreError::KeySetFetch { .. })));
    assert_eq!(remote.fetch_count(), 0);

    let compact = signed_token(&test_keystore(&["k1"]), 1).await;
    let mut token = Token::new();
    let verified = token.verify(&remote, Some(AUDIENCE), Some(&compact), false).await;
    assert!(matches!(verified, Err(AuthError::Keystore(KeystoreError::KeySetFetch { .. }))));
    assert!(!token.is_valid());

    // The injected failure was not cached
    fail::remove("remote-jwks-before-fetch");
    assert_eq!(remote.count().await.expect("fetch after removal"), 1);
    assert_eq!(remote.fetch_count(), 1);

    scenario.teardown();
}

#[tokio::test]
async fn key_set_fetch_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    let (_server, remote) = setup_remote().await;

    // No fail point configured: the fetch goes through
    let result = remote.count().await;
    assert!(result.is_ok(), "fetch should succeed without fail point");
    assert_eq!(remote.fetch_count(), 1);

    scenario.teardown();
}
