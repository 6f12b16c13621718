//! Email Verification Store

use chrono::{DateTime, Utc};
use sqlx::Error;

use crate::database::TransactionManager;
use crate::models::auth::EmailVerification;

#[derive(Clone)]
pub struct EmailVerificationRepository {
    db: TransactionManager,
}

impl EmailVerificationRepository {
    pub fn new(db: TransactionManager) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: i64,
        token: &str,
        ip_address: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<EmailVerification, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, EmailVerification>(
            r#"
            INSERT INTO email_verifications (user_id, token, ip_address, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token, expires_at, used, used_at, ip_address,
                      created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(ip_address)
        .bind(expires_at)
        .fetch_one(conn.executor())
        .await
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<EmailVerification>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, EmailVerification>(
            r#"
            SELECT id, user_id, token, expires_at, used, used_at, ip_address,
                   created_at, updated_at
            FROM email_verifications
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(conn.executor())
        .await
    }

    /// Flip `used` on a verification row; false when already redeemed
    pub async fn mark_email_verification_used(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query(
            r#"
            UPDATE email_verifications
            SET used = TRUE, used_at = $2, updated_at = $2
            WHERE id = $1 AND used = FALSE
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(conn.executor())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn invalidate_pending_for_user(
        &self,
        user_id: i64,
        except_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query(
            r#"
            UPDATE email_verifications
            SET used = TRUE, used_at = $3, updated_at = $3
            WHERE user_id = $1 AND id <> $2 AND used = FALSE
            "#,
        )
        .bind(user_id)
        .bind(except_id)
        .bind(now)
        .execute(conn.executor())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query("DELETE FROM email_verifications WHERE expires_at <= $1")
            .bind(now)
            .execute(conn.executor())
            .await?;
        Ok(result.rows_affected())
    }
}
