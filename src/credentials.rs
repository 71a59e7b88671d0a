//! Password hashing for user accounts.
//!
//! PBKDF2-HMAC-SHA256 with a random per-user salt. The stored hash blob is the
//! iteration count (big-endian u32) followed by the derived key, so raising the
//! configured cost never invalidates existing passwords.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const KEY_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;
pub const MIN_PASSWORD_CHARS: usize = 8;

pub struct PasswordHash {
    pub hash: Vec<u8>,
    pub salt: Vec<u8>,
}

pub fn hash_password(password: &str, iterations: u32) -> PasswordHash {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);

    let key = derive(password, &salt, iterations);
    let mut hash = Vec::with_capacity(4 + KEY_LENGTH);
    hash.extend_from_slice(&iterations.to_be_bytes());
    hash.extend_from_slice(&key);

    PasswordHash {
        hash,
        salt: salt.to_vec(),
    }
}

/// Constant-time check of `password` against a stored hash blob.
pub fn verify_password(password: &str, stored_hash: &[u8], salt: &[u8]) -> bool {
    if stored_hash.len() != 4 + KEY_LENGTH {
        return false;
    }
    let (cost, expected) = stored_hash.split_at(4);
    let iterations = u32::from_be_bytes([cost[0], cost[1], cost[2], cost[3]]);
    if iterations == 0 {
        return false;
    }
    let actual = derive(password, salt, iterations);
    actual.ct_eq(expected).into()
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        ));
    }
    Ok(())
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low cost keeps the suite fast; the format is the same at any cost.
    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn correct_password_verifies() {
        let stored = hash_password("correct horse", TEST_ITERATIONS);
        assert!(verify_password("correct horse", &stored.hash, &stored.salt));
        assert!(!verify_password("wrong horse", &stored.hash, &stored.salt));
    }

    #[test]
    fn salts_differ_per_hash() {
        let a = hash_password("same", TEST_ITERATIONS);
        let b = hash_password("same", TEST_ITERATIONS);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn cost_travels_with_the_hash() {
        let cheap = hash_password("pw-12345", 500);
        assert_eq!(&cheap.hash[..4], &500u32.to_be_bytes());
        assert!(verify_password("pw-12345", &cheap.hash, &cheap.salt));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("x", &[], b"salt"));
        assert!(!verify_password("x", &[0u8; 4 + KEY_LENGTH], b"salt"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }
}
