//! URL signing.
//!
//! Implements HMAC-SHA256 signing and verification of proxied target URLs.
//! The emitted form is lowercase hexadecimal; verification is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Signs a message, returning the lowercase hex HMAC-SHA256 digest.
///
/// # Panics
///
/// Panics if HMAC initialization fails (invalid key length), though this is
/// statically prevented because HMAC accepts any key size.
#[must_use]
pub fn hash(msg: &[u8], key: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(msg);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded HMAC-SHA256 signature over `msg`.
///
/// Accepts upper- or lowercase hex. Returns `false` for malformed hex.
#[must_use]
pub fn verify(msg: &[u8], hash_hex: &[u8], key: &[u8]) -> bool {
    let expected = match hex::decode(hash_hex) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "hmac parameter is not valid hex");
            return false;
        }
    };
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(msg);
    mac.verify_slice(&expected).is_ok()
}
