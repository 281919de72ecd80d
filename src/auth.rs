//! Authentication
//!
//! Every endpoint except `register`/`user_login` takes `user_name` +
//! `password`. The deployed form of this system authenticates by a direct
//! equality check against the catalog's `user_info` table rather than a
//! token/session scheme — "a demonstration, not production-grade" per the
//! design notes. We still hash passwords at rest with argon2id so the
//! catalog file itself isn't a plaintext credential store, but the
//! authentication step remains a single equality check, with no sessions,
//! tokens, or expiry.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};

/// Hash a password using argon2id with a random salt.
pub fn hash_password(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("argon2 hashing should not fail")
        .to_string()
}

/// Check a plaintext password against a stored argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Identity attached to an authenticated request. Carried through handlers
/// so downstream components (retrieval's visibility filter, catalog
/// ownership checks) know who is asking.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub user_id: i64,
    pub user_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn hash_uses_unique_salts() {
        let h1 = hash_password("same");
        let h2 = hash_password("same");
        assert_ne!(h1, h2);
        assert!(verify_password("same", &h1));
        assert!(verify_password("same", &h2));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_password("any", "not-a-hash"));
    }
}
