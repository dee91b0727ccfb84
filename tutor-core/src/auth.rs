//! Password hashing for the credential store.
//!
//! Thin wrapper over bcrypt: secrets are salted and hashed on registration
//! and verified on login. Plaintext is never stored or logged.

use bcrypt::{hash, verify, DEFAULT_COST};

/// Hash a plaintext secret with a fresh salt.
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

/// Check a plaintext secret against a stored hash. A malformed stored hash
/// counts as a verification failure rather than an error surface for the
/// caller to branch on.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    verify(password, hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify_round_trips() {
        let hashed = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hashed));
    }

    #[test]
    fn test_verify_rejects_wrong_password() {
        let hashed = hash_password("secret-one").unwrap();
        assert!(!verify_password("secret-two", &hashed));
        assert!(!verify_password("", &hashed));
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("same-secret").unwrap();
        let b = hash_password("same-secret").unwrap();
        assert_ne!(a, b, "two hashes of the same secret must differ by salt");
    }

    #[test]
    fn test_verify_with_garbage_hash_is_false() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
