//! Security Utilities
//!
//! Password hashing and opaque token generation.

use std::sync::Arc;

use bcrypt::{hash, verify, DEFAULT_COST};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::utils::error::{AppError, AppResult};

/// Default bcrypt cost for password hashing
pub const DEFAULT_BCRYPT_COST: u32 = DEFAULT_COST;

/// Adaptive, salted credential hashing
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, bcrypt::BcryptError>;

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, bcrypt::BcryptError>;
}

/// bcrypt-backed [`PasswordHasher`]
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<String, bcrypt::BcryptError> {
        hash(plaintext, self.cost)
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, bcrypt::BcryptError> {
        verify(plaintext, digest)
    }
}

/// Hash a password on the blocking pool
pub async fn hash_password(hasher: Arc<dyn PasswordHasher>, plaintext: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password hashing error: {}", e)))
}

/// Verify a password on the blocking pool
pub async fn verify_password(
    hasher: Arc<dyn PasswordHasher>,
    plaintext: String,
    digest: String,
) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &digest))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password hashing error: {}", e)))
}

/// Generate `byte_len` bytes from the OS RNG, hex encoded
pub fn generate_token_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_hex() {
        let token1 = generate_token_hex(32);
        let token2 = generate_token_hex(32);

        assert_eq!(token1.len(), 64);
        assert!(token1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token1, token2);

        assert_eq!(generate_token_hex(64).len(), 128);
    }

    #[test]
    fn test_password_hashing() {
        let hasher = BcryptHasher::new(4);
        let digest = hasher.hash("test_password_123").unwrap();

        assert_ne!(digest, "test_password_123");
        assert!(hasher.verify("test_password_123", &digest).unwrap());
        assert!(!hasher.verify("wrong_password", &digest).unwrap());
    }

    #[tokio::test]
    async fn test_blocking_hash_and_verify() {
        let hasher: Arc<dyn PasswordHasher> = Arc::new(BcryptHasher::new(4));
        let digest = hash_password(hasher.clone(), "pw".to_string()).await.unwrap();

        assert!(verify_password(hasher.clone(), "pw".to_string(), digest.clone())
            .await
            .unwrap());
        assert!(!verify_password(hasher, "other".to_string(), digest)
            .await
            .unwrap());
    }

    #[test]
    fn test_bcrypt_cost_validation() {
        #[allow(clippy::assertions_on_constants)]
        {
            assert!(DEFAULT_BCRYPT_COST >= 4, "bcrypt cost too low for security");
            assert!(DEFAULT_BCRYPT_COST <= 31, "bcrypt cost too high");
        }
    }
}
