//! GitHub webhook signature verification (`X-Hub-Signature-256`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";
/// "sha256=" followed by 64 hex characters.
const SIGNATURE_HEADER_LEN: usize = SIGNATURE_PREFIX.len() + 64;

/// Computes the raw HMAC-SHA256 of `payload` keyed with `secret`.
#[cfg(test)]
pub(crate) fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a digest the way GitHub sends it: `sha256=<lowercase hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(signature))
}

/// Checks a GitHub signature header against the raw request body.
///
/// The header must be byte-for-byte the `sha256=<lowercase hex>` form of the
/// expected digest. Absent, malformed, or wrong-length headers are rejected
/// before the digest comparison, which runs in constant time.
pub fn verify_signature(payload: &[u8], signature_header: Option<&str>, secret: &[u8]) -> bool {
    let Some(header) = signature_header else {
        return false;
    };
    if header.len() != SIGNATURE_HEADER_LEN {
        return false;
    }
    let Some(hex_sig) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    // Uppercase hex would decode to the same bytes but is not what we emit.
    if !hex_sig
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return false;
    }
    let Ok(provided) = hex::decode(hex_sig) else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    // Constant-time comparison via the HMAC library
    mac.verify_slice(&provided).is_ok()
}
