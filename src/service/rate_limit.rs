//! Rate Limiting Service
//!
//! Login throttling derived from the login attempt log. There is no separate
//! counter storage: the decision is a count of failed attempts for an email
//! over a sliding window anchored at the time of evaluation.

use chrono::{Duration, Utc};

use crate::config::AuthConfig;
use crate::repository::LoginAttemptRepository;

/// Throttling threshold and window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_failed_attempts: i64,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_failed_attempts: i64, window: Duration) -> Self {
        Self {
            max_failed_attempts,
            window,
        }
    }

    pub fn is_exceeded(&self, failed_attempts: i64) -> bool {
        failed_attempts >= self.max_failed_attempts
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(5, Duration::minutes(15))
    }
}

impl From<&AuthConfig> for RateLimitPolicy {
    fn from(config: &AuthConfig) -> Self {
        Self::new(config.login_max_failed_attempts, config.login_window())
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    attempts: LoginAttemptRepository,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, attempts: LoginAttemptRepository) -> Self {
        Self { policy, attempts }
    }

    /// Failed attempts for `email` within the last `window`
    pub async fn recent_failed_attempts(
        &self,
        email: &str,
        window: Duration,
    ) -> Result<i64, sqlx::Error> {
        self.attempts
            .count_failed_since(email, Utc::now() - window)
            .await
    }

    /// True when further logins for `email` must be refused
    pub async fn is_throttled(&self, email: &str) -> Result<bool, sqlx::Error> {
        let failed = self.recent_failed_attempts(email, self.policy.window).await?;
        Ok(self.policy.is_exceeded(failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TransactionManager;
    use crate::models::auth::{ClientInfo, FailureReason, NewLoginAttempt};
    use sqlx::PgPool;

    #[test]
    fn test_policy_threshold() {
        let policy = RateLimitPolicy::default();
        assert!(!policy.is_exceeded(0));
        assert!(!policy.is_exceeded(4));
        assert!(policy.is_exceeded(5));
        assert!(policy.is_exceeded(9));
    }

    #[test]
    fn test_policy_from_config() {
        let config = AuthConfig {
            login_max_failed_attempts: 3,
            login_window_minutes: 10,
            ..AuthConfig::default()
        };
        let policy = RateLimitPolicy::from(&config);
        assert_eq!(policy, RateLimitPolicy::new(3, Duration::minutes(10)));
    }

    #[sqlx::test]
    async fn test_throttles_after_threshold(pool: PgPool) {
        let attempts = LoginAttemptRepository::new(TransactionManager::new(pool));
        let limiter = RateLimiter::new(RateLimitPolicy::default(), attempts.clone());
        let client = ClientInfo::default();

        for _ in 0..4 {
            attempts
                .record(NewLoginAttempt::failed(
                    None,
                    "limited@example.com",
                    &client,
                    FailureReason::UserNotFound,
                ))
                .await
                .unwrap();
        }
        assert!(!limiter.is_throttled("limited@example.com").await.unwrap());

        // Successes do not reset the window
        attempts
            .record(NewLoginAttempt {
                success: true,
                failure_reason: None,
                ..NewLoginAttempt::failed(
                    None,
                    "limited@example.com",
                    &client,
                    FailureReason::UserNotFound,
                )
            })
            .await
            .unwrap();
        attempts
            .record(NewLoginAttempt::failed(
                None,
                "limited@example.com",
                &client,
                FailureReason::UserNotFound,
            ))
            .await
            .unwrap();

        assert!(limiter.is_throttled("limited@example.com").await.unwrap());
        assert!(!limiter.is_throttled("other@example.com").await.unwrap());
    }
}
