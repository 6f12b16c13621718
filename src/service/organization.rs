//! Organization Service
//!
//! Organizations are owned by whoever creates them. The owner is read from
//! the ambient session identity, never from the request.

use log::info;
use thiserror::Error;

use crate::context::SessionContext;
use crate::database::TransactionManager;
use crate::models::{
    organization::{NewOrganization, Organization},
    requests::CreateOrganizationRequest,
};
use crate::repository::OrganizationRepository;
use crate::utils::{
    error::{is_unique_violation, AppError},
    validation::generate_slug_candidate,
};

#[derive(Error, Debug)]
pub enum OrganizationServiceError {
    #[error("Slug already in use")]
    SlugAlreadyExists,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl From<OrganizationServiceError> for AppError {
    fn from(err: OrganizationServiceError) -> Self {
        match err {
            OrganizationServiceError::SlugAlreadyExists => {
                AppError::Conflict("Slug already in use".to_string())
            }
            OrganizationServiceError::NotAuthenticated => {
                AppError::Unauthorized("Not authenticated".to_string())
            }
            OrganizationServiceError::DatabaseError(e) => AppError::Database(e),
        }
    }
}

pub type OrganizationServiceResult<T> = Result<T, OrganizationServiceError>;

#[derive(Clone)]
pub struct OrganizationService {
    db: TransactionManager,
    organizations: OrganizationRepository,
}

impl OrganizationService {
    pub fn new(db: TransactionManager) -> Self {
        Self {
            organizations: OrganizationRepository::new(db.clone()),
            db,
        }
    }

    pub async fn slug_exists(&self, slug: &str) -> OrganizationServiceResult<bool> {
        Ok(self.organizations.slug_exists(slug).await?)
    }

    /// Creates an organization owned by the ambient identity
    ///
    /// The owner also becomes the first member.
    pub async fn create_organization(
        &self,
        request: CreateOrganizationRequest,
    ) -> OrganizationServiceResult<Organization> {
        let owner =
            SessionContext::current_identity().ok_or(OrganizationServiceError::NotAuthenticated)?;

        let organizations = &self.organizations;
        let organization = self
            .db
            .run_in_scope(move || async move {
                let slug = match request.slug {
                    Some(slug) => {
                        if organizations.slug_exists(&slug).await? {
                            return Err(OrganizationServiceError::SlugAlreadyExists);
                        }
                        slug
                    }
                    None => loop {
                        let candidate = generate_slug_candidate();
                        if !organizations.slug_exists(&candidate).await? {
                            break candidate;
                        }
                    },
                };

                let organization = organizations
                    .create(NewOrganization {
                        name: request.name,
                        slug,
                        description: request.description,
                        avatar_url: request.avatar_url,
                        owner_id: owner.user_id,
                    })
                    .await
                    .map_err(|e| {
                        if is_unique_violation(&e, "organizations_slug_key") {
                            OrganizationServiceError::SlugAlreadyExists
                        } else {
                            OrganizationServiceError::DatabaseError(e)
                        }
                    })?;

                organizations.add_member(organization.id, owner.user_id).await?;
                Ok(organization)
            })
            .await?;

        info!(
            "Organization {} ({}) created by user {}",
            organization.id, organization.slug, organization.owner_id
        );
        Ok(organization)
    }
}
