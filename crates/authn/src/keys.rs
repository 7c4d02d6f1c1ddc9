//! Conversion of JSON Web Keys into `jsonwebtoken` signing and verification keys.

use jsonwebtoken::{DecodingKey, EncodingKey};
use portal_common_keystore::Jwk;
use rsa::{RsaPrivateKey, pkcs1::EncodeRsaPrivateKey};
use zeroize::Zeroizing;

use crate::error::AuthError;

/// Builds a verification key from the `n` and `e` members of `jwk`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidPublicKey`] if either member is missing or is
/// not valid base64url.
pub fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    let n = jwk.member("n").map_err(|e| AuthError::invalid_public_key(e.to_string()))?;
    let e = jwk.member("e").map_err(|e| AuthError::invalid_public_key(e.to_string()))?;
    DecodingKey::from_rsa_components(n, e)
        .map_err(|e| AuthError::invalid_public_key(format!("Invalid RSA components: {e}")))
}

/// Builds a signing key from the private members of `jwk`.
///
/// The key is checked with the `rsa` crate and handed to `jsonwebtoken` as
/// PKCS#1 DER. The intermediate DER buffer is zeroized on drop.
///
/// # Errors
///
/// Returns [`AuthError::Signing`] if the key is public-only, multi-prime,
/// or fails validation.
pub fn to_encoding_key(jwk: &Jwk) -> Result<EncodingKey, AuthError> {
    let kid = jwk.kid.as_deref().unwrap_or("<no kid>");
    if jwk.oth.as_ref().is_some_and(|oth| !oth.is_empty()) {
        return Err(AuthError::signing(format!("key {kid} is multi-prime and cannot sign")));
    }

    let member = |name: &str| {
        jwk.member_uint(name).map_err(|e| AuthError::signing(e.to_string()))
    };
    let private = RsaPrivateKey::from_components(
        member("n")?,
        member("e")?,
        member("d")?,
        vec![member("p")?, member("q")?],
    )
    .map_err(|e| AuthError::signing(format!("key {kid} rejected: {e}")))?;
    private.validate().map_err(|e| AuthError::signing(format!("key {kid} rejected: {e}")))?;

    let der = private
        .to_pkcs1_der()
        .map_err(|e| AuthError::signing(format!("key {kid} cannot be encoded: {e}")))?;
    let der = Zeroizing::new(der.as_bytes().to_vec());
    Ok(EncodingKey::from_rsa_der(&der))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use portal_common_keystore::{OtherPrimeInfo, testutil::test_key_pair};

    use super::*;

    #[test]
    fn test_decoding_key_from_public_half() {
        let pair = test_key_pair(0, "k1");
        assert!(to_decoding_key(&pair.public).is_ok());
    }

    #[test]
    fn test_decoding_key_missing_modulus() {
        let mut public = test_key_pair(0, "k1").public;
        public.n = None;
        assert!(matches!(to_decoding_key(&public), Err(AuthError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_encoding_key_from_private_half() {
        let pair = test_key_pair(0, "k1");
        assert!(to_encoding_key(&pair.private).is_ok());
    }

    #[test]
    fn test_encoding_key_rejects_public_half() {
        let pair = test_key_pair(0, "k1");
        assert!(matches!(to_encoding_key(&pair.public), Err(AuthError::Signing(_))));
    }

    #[test]
    fn test_encoding_key_rejects_multi_prime() {
        let mut private = test_key_pair(0, "k1").private;
        private.oth = Some(vec![OtherPrimeInfo {
            r: "AQAB".into(),
            d: "AQAB".into(),
            t: "AQAB".into(),
        }]);
        let result = to_encoding_key(&private);
        assert!(matches!(result, Err(AuthError::Signing(ref msg)) if msg.contains("multi-prime")));
    }

    #[test]
    fn test_encoding_key_rejects_mismatched_components() {
        let mut private = test_key_pair(0, "k1").private;
        private.d = test_key_pair(1, "k2").private.d;
        assert!(matches!(to_encoding_key(&private), Err(AuthError::Signing(_))));
    }
}
