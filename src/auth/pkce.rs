//! PKCE (RFC 7636) verification. Only the `S256` method is accepted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const S256: &str = "S256";

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Checks `verifier` against the stored `challenge` in constant time.
/// Any method other than `S256`, including `plain`, fails.
pub fn verify(verifier: &str, challenge: &str, method: &str) -> bool {
    if method != S256 {
        return false;
    }
    let computed = challenge_for(verifier);
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}
