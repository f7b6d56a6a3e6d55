//! HMAC-SHA256 signing of outbound webhook bodies.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub mod headers {
    pub const SIGNATURE: &str = "X-Webhook-Signature";
    pub const WEBHOOK_ID: &str = "X-Webhook-ID";
    pub const EVENT: &str = "X-Webhook-Event";
    pub const TIMESTAMP: &str = "X-Webhook-Timestamp";
}

/// Hex-encoded HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = sign(secret, body);
    !expected.is_empty() && expected.as_bytes().ct_eq(signature.trim().as_bytes()).into()
}
