//! Session secrets and their stored form.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of randomness in a session secret (128 bits).
pub const SECRET_BYTES: usize = 16;

/// Generate a new random session secret, hex-encoded.
pub fn generate_secret() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Derive the value persisted for a secret.
///
/// Keyed with the server secret so a leaked table cannot be matched against
/// presented tokens without the key as well.
pub fn derive_token(key: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(secret.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
