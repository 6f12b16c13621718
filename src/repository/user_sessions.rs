//! User Session Store

use chrono::{DateTime, Utc};
use sqlx::Error;

use crate::database::TransactionManager;
use crate::models::auth::UserSession;

#[derive(Clone)]
pub struct UserSessionRepository {
    db: TransactionManager,
}

impl UserSessionRepository {
    pub fn new(db: TransactionManager) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: i64,
        session_id: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<UserSession, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, UserSession>(
            r#"
            INSERT INTO user_sessions (user_id, session_id, ip_address, user_agent, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, session_id, ip_address, user_agent, last_activity,
                      expires_at, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .bind(ip_address)
        .bind(user_agent)
        .bind(expires_at)
        .fetch_one(conn.executor())
        .await
    }

    /// Unexpired sessions, most recently active first
    pub async fn active_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserSession>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, UserSession>(
            r#"
            SELECT id, user_id, session_id, ip_address, user_agent, last_activity,
                   expires_at, created_at, updated_at
            FROM user_sessions
            WHERE user_id = $1 AND expires_at > $2
            ORDER BY last_activity DESC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(conn.executor())
        .await
    }

    pub async fn touch(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query(
            r#"
            UPDATE user_sessions
            SET last_activity = $2, updated_at = $2
            WHERE session_id = $1 AND expires_at > $2
            "#,
        )
        .bind(session_id)
        .bind(now)
        .execute(conn.executor())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn remove_all_for_user(&self, user_id: i64) -> Result<u64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(conn.executor())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(conn.executor())
            .await?;
        Ok(result.rows_affected())
    }

    /// Drop sessions with no activity since `cutoff`
    pub async fn delete_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let result = sqlx::query("DELETE FROM user_sessions WHERE last_activity < $1")
            .bind(cutoff)
            .execute(conn.executor())
            .await?;
        Ok(result.rows_affected())
    }
}
