//! Webhook signature verification.
//!
//! Meta signs webhook deliveries with an HMAC-SHA256 of the raw body keyed
//! by the app secret, sent as `X-Hub-Signature-256: sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Validate an HMAC-SHA256 signature against the shared secret.
///
/// Accepts `sha256=<hex_digest>` or a bare `<hex_digest>`.
/// Uses constant-time comparison to prevent timing attacks.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return true; // No secret configured = no validation
    }

    let sig_hex = signature.strip_prefix("sha256=").unwrap_or(signature);

    let provided_bytes = match hex::decode(sig_hex) {
        Ok(b) => b,
        Err(_) => return false, // Invalid hex = reject
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);

    // Constant-time comparison via `verify_slice`
    mac.verify_slice(&provided_bytes).is_ok()
}

/// Compute the `sha256=<hex>` signature for a payload. Test helper and
/// outbound-callback signing.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
