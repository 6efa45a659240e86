//! Shared-secret signature verification for build-system calls

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::errors::ControlError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC-SHA256 signature
pub const SIGNATURE_HEADER: &str = "x-caravel-signature";

/// Compute the signature for `payload`. For requests without a body the
/// payload is the request path.
pub fn sign(secret: &SecretString, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature over `payload` in constant time
pub fn verify(
    secret: &SecretString,
    payload: &[u8],
    provided: &str,
) -> Result<(), ControlError> {
    let provided = hex::decode(provided.trim())
        .map_err(|_| ControlError::Unauthorized("malformed signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&provided)
        .map_err(|_| ControlError::Unauthorized("signature mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let secret = SecretString::from("topsecret");
        let signature = sign(&secret, b"{\"deploymentId\":\"d-1\"}");
        verify(&secret, b"{\"deploymentId\":\"d-1\"}", &signature).unwrap();
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let signature = sign(&SecretString::from("a"), b"body");
        let err = verify(&SecretString::from("b"), b"body", &signature).unwrap_err();
        assert!(matches!(err, ControlError::Unauthorized(_)));
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let secret = SecretString::from("topsecret");
        let signature = sign(&secret, b"body");
        assert!(verify(&secret, b"tampered", &signature).is_err());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let secret = SecretString::from("topsecret");
        assert!(verify(&secret, b"body", "not-hex").is_err());
    }
}
