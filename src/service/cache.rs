//! Cache invalidation hint.
//!
//! Mutations of users announce themselves with `invalidate("users")`. The
//! hint has no correctness role, so failures are logged and dropped.

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;

pub const USERS_CACHE_KEY: &str = "users";

#[derive(Error, Debug)]
#[error("Cache invalidation failed: {0}")]
pub struct CacheError(pub String);

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;
}

/// Invalidator for deployments without a shared cache
pub struct NoopCacheInvalidator;

#[async_trait]
impl CacheInvalidator for NoopCacheInvalidator {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        debug!("Cache invalidation for '{}' skipped: no cache configured", key);
        Ok(())
    }
}

/// Send the hint, logging instead of propagating a failure
pub async fn invalidate_quietly(cache: &dyn CacheInvalidator, key: &str) {
    if let Err(e) = cache.invalidate(key).await {
        warn!("{}; continuing", e);
    }
}
