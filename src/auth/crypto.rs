//! # Cryptographic Utilities
//!
//! Password hashing, session token generation and secret comparison.
//!
//! Passwords are only ever stored as Argon2id PHC strings, session tokens
//! only as SHA-256 digests, and configured secrets are compared in constant
//! time.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::errors::{AuthError, AuthResult};

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::HashingFailed)
}

/// Verify a password against its stored PHC hash
pub fn verify_password(user_id: &str, password: &str, hash: &str) -> AuthResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AuthError::MalformedHash(user_id.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Whether `hash` parses as a PHC string
pub fn is_valid_hash(hash: &str) -> bool {
    PasswordHash::new(hash).is_ok()
}

/// Generate a 256-bit random session token, URL-safe base64
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token for storage using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Constant-time comparison of two strings
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_and_verify() {
        let hash = hash_password("secure_password_123").unwrap();

        assert_ne!(hash, "secure_password_123");
        assert!(is_valid_hash(&hash));
        assert!(verify_password("alice", "secure_password_123", &hash).unwrap());
        assert!(!verify_password("alice", "wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_password_hash_is_salted() {
        let hash1 = hash_password("same_password").unwrap();
        let hash2 = hash_password("same_password").unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_malformed_hash() {
        let result = verify_password("alice", "pw", "not-a-phc-string");
        assert!(matches!(result, Err(AuthError::MalformedHash(user)) if user == "alice"));
    }

    #[test]
    fn test_token_generation() {
        let token1 = generate_token();
        let token2 = generate_token();

        assert_ne!(token1, token2);
        // 32 bytes, unpadded base64
        assert_eq!(token1.len(), 43);
        assert!(!token1.contains('+') && !token1.contains('/'));
    }

    #[test]
    fn test_token_hash_deterministic() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[test]
    fn test_constant_time_str_eq() {
        assert!(constant_time_str_eq("key", "key"));
        assert!(!constant_time_str_eq("key", "kez"));
        assert!(!constant_time_str_eq("key", "keys"));
    }
}
