//! User Store

use sqlx::Error;

use crate::database::TransactionManager;
use crate::models::user::{NewUser, UserChanges, UserWithPassword};

#[derive(Clone)]
pub struct UserRepository {
    db: TransactionManager,
}

impl UserRepository {
    pub fn new(db: TransactionManager) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<UserWithPassword>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, UserWithPassword>(
            r#"
            SELECT id, name, email, password_hash, active, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn.executor())
        .await
    }

    /// Lookup by normalized email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserWithPassword>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, UserWithPassword>(
            r#"
            SELECT id, name, email, password_hash, active, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(conn.executor())
        .await
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(conn.executor())
                .await?;
        Ok(exists)
    }

    /// Insert a user; a duplicate email fails on `users_email_key`
    pub async fn create(&self, user: NewUser) -> Result<UserWithPassword, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, UserWithPassword>(
            r#"
            INSERT INTO users (name, email, password_hash, active)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, password_hash, active, created_at, updated_at
            "#,
        )
        .bind(user.name)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.active)
        .fetch_one(conn.executor())
        .await
    }

    /// Apply a partial update, returning `None` for an unknown id
    pub async fn update(
        &self,
        id: i64,
        changes: UserChanges,
    ) -> Result<Option<UserWithPassword>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, UserWithPassword>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                active = COALESCE($5, active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, password_hash, active, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.password_hash)
        .bind(changes.active)
        .fetch_optional(conn.executor())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::is_unique_violation;
    use sqlx::PgPool;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: Some("Repo User".to_string()),
            email: email.to_string(),
            password_hash: "digest".to_string(),
            active: false,
        }
    }

    #[sqlx::test]
    async fn test_create_and_find(pool: PgPool) {
        let users = UserRepository::new(TransactionManager::new(pool));

        let created = users.create(new_user("repo@example.com")).await.unwrap();
        assert!(!created.active);

        let by_email = users.find_by_email("repo@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let by_id = users.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "repo@example.com");

        assert!(users.email_exists("repo@example.com").await.unwrap());
        assert!(!users.email_exists("other@example.com").await.unwrap());
    }

    #[sqlx::test]
    async fn test_duplicate_email_hits_constraint(pool: PgPool) {
        let users = UserRepository::new(TransactionManager::new(pool));

        users.create(new_user("dup@example.com")).await.unwrap();
        let err = users.create(new_user("dup@example.com")).await.unwrap_err();

        assert!(is_unique_violation(&err, "users_email_key"));
    }

    #[sqlx::test]
    async fn test_partial_update_keeps_unset_fields(pool: PgPool) {
        let users = UserRepository::new(TransactionManager::new(pool));
        let created = users.create(new_user("partial@example.com")).await.unwrap();

        let updated = users
            .update(
                created.id,
                UserChanges {
                    active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert!(updated.active);
        assert_eq!(updated.name.as_deref(), Some("Repo User"));
        assert_eq!(updated.password_hash, "digest");

        let missing = users.update(created.id + 1000, UserChanges::default()).await.unwrap();
        assert!(missing.is_none());
    }
}
