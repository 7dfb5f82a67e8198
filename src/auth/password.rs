//! Password Hashing
//! Mission: Keep bcrypt work off the async executor

use anyhow::{Context, Result};
use bcrypt::DEFAULT_COST;

/// Hash a password on the blocking pool. bcrypt at DEFAULT_COST takes tens of
/// milliseconds, long enough to stall other requests if run inline.
pub async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, DEFAULT_COST))
        .await
        .context("Hash task aborted")?
        .context("Failed to hash password")
}

/// Verify a password against a stored hash on the blocking pool.
pub async fn verify_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("Verify task aborted")?
        .context("Failed to verify password")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("Abcd1234".to_string()).await.unwrap();
        assert_ne!(hash, "Abcd1234");

        assert!(verify_password("Abcd1234".to_string(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password("wrong".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let h1 = hash_password("Abcd1234".to_string()).await.unwrap();
        let h2 = hash_password("Abcd1234".to_string()).await.unwrap();
        assert_ne!(h1, h2);
    }
}
