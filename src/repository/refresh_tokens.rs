//! Refresh Token Store

use chrono::{DateTime, Utc};
use sqlx::Error;

use crate::database::TransactionManager;
use crate::models::auth::RefreshToken;

#[derive(Clone)]
pub struct RefreshTokenRepository {
    db: TransactionManager,
}

impl RefreshTokenRepository {
    pub fn new(db: TransactionManager) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: i64,
        token: &str,
        device_info: Option<&str>,
        ip_address: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, token, device_info, ip_address, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, token, device_info, ip_address, expires_at,
                      revoked, revoked_at, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(device_info)
        .bind(ip_address)
        .bind(expires_at)
        .fetch_one(conn.executor())
        .await
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token, device_info, ip_address, expires_at,
                   revoked, revoked_at, created_at, updated_at
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(conn.executor())
        .await
    }

    /// Revoke the token only if no one else has; true for the single winner
    pub async fn revoke_if_active(&self, id: i64, now: DateTime<Utc>) -> Result<bool, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2, updated_at = $2
            WHERE id = $1 AND revoked = FALSE
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(conn.executor())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn revoke_by_token(&self, token: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2, updated_at = $2
            WHERE token = $1 AND revoked = FALSE
            "#,
        )
        .bind(token)
        .bind(now)
        .execute(conn.executor())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn revoke_all_for_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = $2, updated_at = $2
            WHERE user_id = $1 AND revoked = FALSE
            "#,
        )
        .bind(user_id)
        .bind(now)
        .execute(conn.executor())
        .await?;
        Ok(result.rows_affected())
    }

    /// Unrevoked tokens of the user, expired ones included
    pub async fn count_unrevoked_for_user(&self, user_id: i64) -> Result<i64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id)
        .fetch_one(conn.executor())
        .await?;
        Ok(count)
    }

    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(conn.executor())
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::PgPool;

    async fn seed_user(pool: &PgPool) -> i64 {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (email, password_hash) VALUES ('tokens@example.com', 'x') RETURNING id",
        )
        .fetch_one(pool)
        .await
        .unwrap();
        id
    }

    #[sqlx::test]
    async fn test_revoke_if_active_has_one_winner(pool: PgPool) {
        let user_id = seed_user(&pool).await;
        let tokens = RefreshTokenRepository::new(TransactionManager::new(pool));
        let now = Utc::now();

        let token = tokens
            .create(user_id, "t1", None, None, now + Duration::days(7))
            .await
            .unwrap();

        assert!(tokens.revoke_if_active(token.id, now).await.unwrap());
        assert!(!tokens.revoke_if_active(token.id, now).await.unwrap());

        let stored = tokens.find_by_token("t1").await.unwrap().unwrap();
        assert!(stored.revoked);
        assert!(stored.revoked_at.is_some());
    }

    #[sqlx::test]
    async fn test_revoke_all_and_delete_expired(pool: PgPool) {
        let user_id = seed_user(&pool).await;
        let tokens = RefreshTokenRepository::new(TransactionManager::new(pool));
        let now = Utc::now();

        tokens.create(user_id, "live", None, None, now + Duration::days(1)).await.unwrap();
        tokens.create(user_id, "stale", None, None, now - Duration::days(1)).await.unwrap();
        assert_eq!(tokens.count_unrevoked_for_user(user_id).await.unwrap(), 2);

        assert_eq!(tokens.delete_expired(now).await.unwrap(), 1);
        assert_eq!(tokens.revoke_all_for_user(user_id, now).await.unwrap(), 1);
        assert_eq!(tokens.count_unrevoked_for_user(user_id).await.unwrap(), 0);

        // Already revoked
        assert!(!tokens.revoke_by_token("live", now).await.unwrap());
    }
}
