use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sha2::{Digest, Sha256};

/// Prefix distinguishing access tokens from every other credential.
pub const ACCESS_TOKEN_PREFIX: &str = "tga_";
/// Prefix distinguishing refresh tokens.
pub const REFRESH_TOKEN_PREFIX: &str = "tgr_";

// 64 alphanumeric characters carry ~381 bits of entropy.
const TOKEN_LENGTH: usize = 64;

pub fn generate_random_token(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

pub fn generate_access_token() -> String {
    format!("{ACCESS_TOKEN_PREFIX}{}", generate_random_token(TOKEN_LENGTH))
}

pub fn generate_refresh_token() -> String {
    format!("{REFRESH_TOKEN_PREFIX}{}", generate_random_token(TOKEN_LENGTH))
}

pub fn generate_authorization_code() -> String {
    generate_random_token(TOKEN_LENGTH)
}

/// Digest under which codes and tokens are stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
