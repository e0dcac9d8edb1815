//! Cryptographic utilities for payment signature verification.
//!
//! Razorpay signs both the checkout callback and its webhooks with
//! HMAC-SHA256, hex-encoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return hex-encoded result.
///
/// # Panics
///
/// This function will never panic in practice. The `expect` call is guarded by
/// the invariant that HMAC-SHA256 accepts keys of any size per RFC 2104.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &[u8]) -> String {
    hex::encode(keyed(secret, message).finalize().into_bytes())
}

/// Verify a hex-encoded HMAC-SHA256 signature in constant time.
///
/// Returns `false` for signatures that are not valid hex.
#[must_use]
pub fn verify_hmac_sha256_hex(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    keyed(secret, message).verify_slice(&signature).is_ok()
}

/// Message Razorpay signs for a completed checkout.
#[must_use]
pub fn payment_signature_payload(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}

fn keyed(secret: &str, message: &[u8]) -> HmacSha256 {
    // INVARIANT: HMAC-SHA256 accepts keys of any size per RFC 2104, so
    // `new_from_slice` only fails if the Hmac implementation is broken.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message);
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_produces_correct_length() {
        let result = hmac_sha256_hex("key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(result.len(), 64); // SHA256 = 32 bytes = 64 hex chars
    }

    #[test]
    fn hmac_sha256_matches_rfc_vector() {
        // RFC 4231 test case 2
        let result = hmac_sha256_hex("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            result,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_accepts_own_signature() {
        let payload = payment_signature_payload("order_1", "pay_1");
        let signature = hmac_sha256_hex("secret", payload.as_bytes());
        assert!(verify_hmac_sha256_hex("secret", payload.as_bytes(), &signature));
    }

    #[test]
    fn verify_rejects_tampering() {
        let signature = hmac_sha256_hex("secret", b"order_1|pay_1");
        assert!(!verify_hmac_sha256_hex("secret", b"order_1|pay_2", &signature));
        assert!(!verify_hmac_sha256_hex("other", b"order_1|pay_1", &signature));
        assert!(!verify_hmac_sha256_hex("secret", b"order_1|pay_1", "not-hex"));
        assert!(!verify_hmac_sha256_hex("secret", b"order_1|pay_1", &signature[..10]));
    }
}
