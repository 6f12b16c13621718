//! Test doubles shared by the service tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::database::TransactionManager;
use crate::service::auth::AuthService;
use crate::service::cache::{CacheError, CacheInvalidator};
use crate::service::email::{EmailDispatcher, EmailError, EmailKind, JobHandle};
use crate::utils::security::{BcryptHasher, PasswordHasher};

/// bcrypt at its minimum cost
pub(crate) fn test_hasher() -> Arc<dyn PasswordHasher> {
    Arc::new(BcryptHasher::new(4))
}

/// Auth service over `pool` with a fast hasher and a recording cache
pub(crate) fn auth_service(pool: PgPool, email: Arc<dyn EmailDispatcher>) -> AuthService {
    AuthService::new(
        TransactionManager::new(pool),
        AuthConfig {
            bcrypt_cost: 4,
            ..AuthConfig::default()
        },
        test_hasher(),
        email,
        Arc::new(RecordingCache::default()),
    )
}

/// Keeps every enqueued email in memory
#[derive(Default)]
pub(crate) struct RecordingDispatcher {
    jobs: Mutex<Vec<(EmailKind, String)>>,
}

impl RecordingDispatcher {
    pub(crate) fn jobs(&self) -> Vec<(EmailKind, String)> {
        self.jobs.lock().unwrap().clone()
    }

    /// Token of the latest verification email sent to `recipient`
    pub(crate) fn verification_token(&self, recipient: &str) -> Option<String> {
        self.jobs().into_iter().rev().find_map(|(kind, to)| match kind {
            EmailKind::Verification { token } if to == recipient => Some(token),
            _ => None,
        })
    }

    /// Token of the latest password reset email sent to `recipient`
    pub(crate) fn reset_token(&self, recipient: &str) -> Option<String> {
        self.jobs().into_iter().rev().find_map(|(kind, to)| match kind {
            EmailKind::PasswordReset { token } if to == recipient => Some(token),
            _ => None,
        })
    }
}

#[async_trait]
impl EmailDispatcher for RecordingDispatcher {
    async fn enqueue(&self, kind: EmailKind, recipient: &str) -> Result<JobHandle, EmailError> {
        self.jobs.lock().unwrap().push((kind, recipient.to_string()));
        Ok(JobHandle { id: Uuid::new_v4() })
    }
}

/// Rejects every enqueue
pub(crate) struct FailingDispatcher;

#[async_trait]
impl EmailDispatcher for FailingDispatcher {
    async fn enqueue(&self, _kind: EmailKind, _recipient: &str) -> Result<JobHandle, EmailError> {
        Err(EmailError::QueueClosed)
    }
}

/// Records invalidated keys
#[derive(Default)]
pub(crate) struct RecordingCache {
    keys: Mutex<Vec<String>>,
}

impl RecordingCache {
    pub(crate) fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingCache {
    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}
