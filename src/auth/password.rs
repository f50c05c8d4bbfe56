//! Password hashing with argon2id PHC-encoded strings.
//!
//! The encoded string embeds the algorithm identifier, cost parameters and
//! base64 salt/digest, so records hashed under older defaults keep
//! verifying after the defaults move. Digest comparison is constant-time
//! inside the argon2 crate; any parse failure is reported as a plain
//! verification failure rather than a distinct error.

use anyhow::{anyhow, bail, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use rand::{rngs::OsRng, RngCore};

const MIN_PASSWORD_LEN: usize = 8;
const SALT_LEN: usize = 16;

/// Hash `password` into a self-describing PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("password must be at least {MIN_PASSWORD_LEN} characters");
    }
    let mut salt_bytes = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| anyhow!("generate salt: {e}"))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!("encode salt: {e}"))?;
    let encoded = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("hash password: {e}"))?
        .to_string();
    Ok(encoded)
}

/// Verify `candidate` against a stored PHC string.
/// Malformed encodings verify as `false` instead of surfacing parse detail.
#[must_use]
pub fn verify_password(encoded: &str, candidate: &str) -> bool {
    match PasswordHash::new(encoded) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Burn a verification against a throwaway hash. Login uses this when the
/// account does not exist so response timing stays close to the real
/// verification path.
pub fn verify_password_stub(candidate: &str) {
    static STUB: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    let stub = STUB.get_or_init(|| hash_password("lanshare-timing-stub").unwrap_or_default());
    let _ = verify_password(stub, candidate);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "correct horse battery staple"));
        assert!(!verify_password(&hash, "bad pass"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(hash_password("short").is_err());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("correct horse battery staple").expect("hash");
        let b = hash_password("correct horse battery staple").expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_encoding_fails_closed() {
        assert!(!verify_password("not-a-phc-string", "anything"));
        assert!(!verify_password("", "anything"));
    }
}
