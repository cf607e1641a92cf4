// ABOUTME: User auth token format and password-based token derivation.
// ABOUTME: A token is 42 bytes (user id, key, padding) in 56 characters of base64.

use crate::error::{ClusterError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Length of an ASCII auth token.
pub const AUTH_TOKEN_LEN: usize = 56;

/// Length of a decoded auth token.
pub const AUTH_TOKEN_BIN_LEN: usize = 42;

const USER_ID_LEN: usize = 20;
const USER_KEY_LEN: usize = 20;
const KEY_INFO: &[u8] = b"sx user key";

/// True if `token` looks like an auth token: 56 base64 characters decoding to 42 bytes.
pub fn is_valid_token(token: &str) -> bool {
    token.len() == AUTH_TOKEN_LEN
        && STANDARD
            .decode(token)
            .map(|bytes| Zeroizing::new(bytes).len() == AUTH_TOKEN_BIN_LEN)
            .unwrap_or(false)
}

/// Derives a user token from a password.
///
/// The user id is taken from the profile name and the key is HKDF-SHA256 of
/// the password salted with the cluster UUID, so the same password yields
/// different tokens on different clusters.
pub fn derive_token(uuid: &str, profile: &str, password: &[u8]) -> Result<String> {
    if uuid.is_empty() {
        return Err(ClusterError::MissingUuid);
    }

    let user_id = Sha256::digest(profile.as_bytes());

    let mut key = Zeroizing::new([0u8; USER_KEY_LEN]);
    Hkdf::<Sha256>::new(Some(uuid.as_bytes()), password)
        .expand(KEY_INFO, &mut key[..])
        .map_err(|_| ClusterError::InvalidToken("key derivation failed"))?;

    let mut raw = Zeroizing::new([0u8; AUTH_TOKEN_BIN_LEN]);
    raw[..USER_ID_LEN].copy_from_slice(&user_id[..USER_ID_LEN]);
    raw[USER_ID_LEN..USER_ID_LEN + USER_KEY_LEN].copy_from_slice(&key[..]);

    Ok(STANDARD.encode(&raw[..]))
}
