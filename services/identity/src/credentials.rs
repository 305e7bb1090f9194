//! Password hashing and token key generation

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::Rng;
use std::fmt::Write;

/// Length of an issued token key, in hex characters.
pub const TOKEN_KEY_LEN: usize = 40;

/// Hash a plaintext password into a PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Check a plaintext password against a stored hash. A malformed hash never
/// verifies.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// A fresh random token key: 20 random bytes rendered as lowercase hex.
pub fn generate_token_key() -> String {
    let bytes: [u8; TOKEN_KEY_LEN / 2] = rand::thread_rng().r#gen();
    let mut key = String::with_capacity(TOKEN_KEY_LEN);
    for byte in bytes {
        let _ = write!(key, "{:02x}", byte);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_verify_only_the_original_password() {
        let hash = hash_password("s3cret!").unwrap();
        assert_ne!(hash, "s3cret!");
        assert!(verify_password("s3cret!", &hash));
        assert!(!verify_password("S3cret!", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn token_keys_are_forty_hex_chars_and_distinct() {
        let a = generate_token_key();
        let b = generate_token_key();
        assert_eq!(a.len(), TOKEN_KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }
}
