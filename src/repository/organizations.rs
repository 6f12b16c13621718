//! Organization Store

use sqlx::Error;

use crate::database::TransactionManager;
use crate::models::organization::{NewOrganization, Organization};

#[derive(Clone)]
pub struct OrganizationRepository {
    db: TransactionManager,
}

impl OrganizationRepository {
    pub fn new(db: TransactionManager) -> Self {
        Self { db }
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM organizations WHERE slug = $1)")
                .bind(slug)
                .fetch_one(conn.executor())
                .await?;
        Ok(exists)
    }

    pub async fn create(&self, organization: NewOrganization) -> Result<Organization, Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (name, slug, description, avatar_url, owner_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, slug, description, avatar_url, owner_id, created_at, updated_at
            "#,
        )
        .bind(organization.name)
        .bind(organization.slug)
        .bind(organization.description)
        .bind(organization.avatar_url)
        .bind(organization.owner_id)
        .fetch_one(conn.executor())
        .await
    }

    pub async fn add_member(&self, organization_id: i64, user_id: i64) -> Result<(), Error> {
        let mut conn = self.db.resolve_connection().await?;
        sqlx::query("INSERT INTO organization_members (organization_id, user_id) VALUES ($1, $2)")
            .bind(organization_id)
            .bind(user_id)
            .execute(conn.executor())
            .await?;
        Ok(())
    }

    pub async fn member_ids(&self, organization_id: i64) -> Result<Vec<i64>, Error> {
        let mut conn = self.db.resolve_connection().await?;
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT user_id FROM organization_members WHERE organization_id = $1 ORDER BY id",
        )
        .bind(organization_id)
        .fetch_all(conn.executor())
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
