//! Login Attempt Log
//!
//! Append-only. Rows are inserted and eventually pruned, never updated.

use chrono::{DateTime, Utc};
use sqlx::Error;

use crate::database::TransactionManager;
use crate::models::auth::{LoginAttempt, NewLoginAttempt};

#[derive(Clone)]
pub struct LoginAttemptRepository {
    db: TransactionManager,
}

impl LoginAttemptRepository {
    pub fn new(db: TransactionManager) -> Self {
        Self { db }
    }

    pub async fn record(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, LoginAttempt>(
            r#"
            INSERT INTO login_attempts (user_id, email, ip_address, user_agent, success, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, email, ip_address, user_agent, success, failure_reason, attempted_at
            "#,
        )
        .bind(attempt.user_id)
        .bind(attempt.email)
        .bind(attempt.ip_address)
        .bind(attempt.user_agent)
        .bind(attempt.success)
        .bind(attempt.failure_reason.map(|reason| reason.as_str()))
        .fetch_one(conn.executor())
        .await
    }

    /// Failed attempts for `email` at or after `since`
    pub async fn count_failed_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM login_attempts
            WHERE email = $1 AND success = FALSE AND attempted_at >= $2
            "#,
        )
        .bind(email)
        .bind(since)
        .fetch_one(conn.executor())
        .await?;
        Ok(count)
    }

    pub async fn recent_by_email(&self, email: &str, limit: i64) -> Result<Vec<LoginAttempt>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, LoginAttempt>(
            r#"
            SELECT id, user_id, email, ip_address, user_agent, success, failure_reason, attempted_at
            FROM login_attempts
            WHERE email = $1
            ORDER BY attempted_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(email)
        .bind(limit)
        .fetch_all(conn.executor())
        .await
    }

    pub async fn recent_by_ip(&self, ip_address: &str, limit: i64) -> Result<Vec<LoginAttempt>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, LoginAttempt>(
            r#"
            SELECT id, user_id, email, ip_address, user_agent, success, failure_reason, attempted_at
            FROM login_attempts
            WHERE ip_address = $1
            ORDER BY attempted_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(ip_address)
        .bind(limit)
        .fetch_all(conn.executor())
        .await
    }

    pub async fn count_for_email(&self, email: &str) -> Result<i64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM login_attempts WHERE email = $1")
            .bind(email)
            .fetch_one(conn.executor())
            .await?;
        Ok(count)
    }

    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query("DELETE FROM login_attempts WHERE attempted_at < $1")
            .bind(cutoff)
            .execute(conn.executor())
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::{ClientInfo, FailureReason};
    use chrono::Duration;
    use sqlx::PgPool;

    fn client() -> ClientInfo {
        ClientInfo::new(Some("10.0.0.1".to_string()), Some("test-agent".to_string()))
    }

    async fn backdate(pool: &PgPool, id: i64, minutes: i64) {
        sqlx::query("UPDATE login_attempts SET attempted_at = NOW() - make_interval(mins => $2::int) WHERE id = $1")
            .bind(id)
            .bind(minutes as i32)
            .execute(pool)
            .await
            .unwrap();
    }

    #[sqlx::test]
    async fn test_count_failed_respects_window(pool: PgPool) {
        let attempts = LoginAttemptRepository::new(TransactionManager::new(pool.clone()));
        let email = "window@example.com";

        let old = attempts
            .record(NewLoginAttempt::failed(None, email, &client(), FailureReason::UserNotFound))
            .await
            .unwrap();
        backdate(&pool, old.id, 30).await;

        attempts
            .record(NewLoginAttempt::failed(None, email, &client(), FailureReason::UserNotFound))
            .await
            .unwrap();
        attempts
            .record(NewLoginAttempt {
                user_id: None,
                email: email.to_string(),
                ip_address: "10.0.0.1".to_string(),
                user_agent: None,
                success: true,
                failure_reason: None,
            })
            .await
            .unwrap();

        let since = Utc::now() - Duration::minutes(15);
        assert_eq!(attempts.count_failed_since(email, since).await.unwrap(), 1);
        assert_eq!(attempts.count_for_email(email).await.unwrap(), 3);
    }

    #[sqlx::test]
    async fn test_recent_queries_and_pruning(pool: PgPool) {
        let attempts = LoginAttemptRepository::new(TransactionManager::new(pool.clone()));

        let stored = attempts
            .record(NewLoginAttempt::failed(None, "a@x.com", &client(), FailureReason::InvalidPassword))
            .await
            .unwrap();
        assert_eq!(stored.failure_reason.as_deref(), Some("invalid_password"));

        attempts
            .record(NewLoginAttempt::failed(None, "b@x.com", &client(), FailureReason::UserNotFound))
            .await
            .unwrap();

        assert_eq!(attempts.recent_by_email("a@x.com", 10).await.unwrap().len(), 1);
        assert_eq!(attempts.recent_by_ip("10.0.0.1", 10).await.unwrap().len(), 2);
        assert_eq!(attempts.recent_by_ip("10.0.0.1", 1).await.unwrap().len(), 1);

        backdate(&pool, stored.id, 60 * 24 * 40).await;
        let cutoff = Utc::now() - Duration::days(30);
        assert_eq!(attempts.delete_older_than(cutoff).await.unwrap(), 1);
        assert!(attempts.recent_by_email("a@x.com", 10).await.unwrap().is_empty());
    }
}
