//! User Service Implementation
//!
//! User management: lookup, creation and partial updates. Passwords are
//! hashed off the async executor, and every mutation sends the `users`
//! cache invalidation hint.

use std::sync::Arc;

use thiserror::Error;

use crate::database::TransactionManager;
use crate::models::{
    requests::{CreateUserRequest, UpdateUserRequest},
    user::{NewUser, User, UserChanges, UserWithPassword},
};
use crate::repository::UserRepository;
use crate::service::cache::{invalidate_quietly, CacheInvalidator, USERS_CACHE_KEY};
use crate::utils::{
    error::{is_unique_violation, AppError},
    security::{hash_password, PasswordHasher},
    validation::normalize_email,
};

/// Custom error types for the user service
#[derive(Error, Debug)]
pub enum UserServiceError {
    /// User with the specified identifier was not found
    #[error("User not found")]
    UserNotFound,

    /// Attempted to use an email that belongs to another account
    #[error("Email already exists")]
    EmailAlreadyExists,

    /// Database operation failed
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Password hashing operation failed
    #[error("Password hashing error: {0}")]
    HashingError(String),
}

impl From<UserServiceError> for AppError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::UserNotFound => AppError::NotFound("User not found".to_string()),
            UserServiceError::EmailAlreadyExists => {
                AppError::Conflict("Email already exists".to_string())
            }
            UserServiceError::DatabaseError(e) => AppError::Database(e),
            UserServiceError::HashingError(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type for user service operations
pub type UserServiceResult<T> = Result<T, UserServiceError>;

fn map_email_conflict(err: sqlx::Error) -> UserServiceError {
    if is_unique_violation(&err, "users_email_key") {
        UserServiceError::EmailAlreadyExists
    } else {
        UserServiceError::DatabaseError(err)
    }
}

#[derive(Clone)]
pub struct UserService {
    db: TransactionManager,
    users: UserRepository,
    hasher: Arc<dyn PasswordHasher>,
    cache: Arc<dyn CacheInvalidator>,
}

impl UserService {
    pub fn new(
        db: TransactionManager,
        hasher: Arc<dyn PasswordHasher>,
        cache: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            users: UserRepository::new(db.clone()),
            db,
            hasher,
            cache,
        }
    }

    pub async fn find_by_id(&self, id: i64) -> UserServiceResult<Option<User>> {
        Ok(self.users.find_by_id(id).await?.map(User::from))
    }

    pub async fn find_by_email(&self, email: &str) -> UserServiceResult<Option<User>> {
        let email = normalize_email(email);
        Ok(self.users.find_by_email(&email).await?.map(User::from))
    }

    /// Lookup including the credential hash, for login
    pub(crate) async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> UserServiceResult<Option<UserWithPassword>> {
        Ok(self.users.find_by_email(email).await?)
    }

    pub(crate) async fn hash(&self, password: String) -> UserServiceResult<String> {
        hash_password(self.hasher.clone(), password)
            .await
            .map_err(|e| UserServiceError::HashingError(e.to_string()))
    }

    /// Creates a new user account; users are active unless stated otherwise
    pub async fn create_user(&self, request: CreateUserRequest) -> UserServiceResult<User> {
        let email = normalize_email(&request.email);
        let password_hash = self.hash(request.password).await?;
        let new_user = NewUser {
            name: request.name,
            email,
            password_hash,
            active: request.active.unwrap_or(true),
        };

        let users = &self.users;
        let user = self
            .db
            .run_in_scope(move || async move {
                if users.email_exists(&new_user.email).await? {
                    return Err(UserServiceError::EmailAlreadyExists);
                }
                users.create(new_user).await.map_err(map_email_conflict)
            })
            .await?;

        invalidate_quietly(self.cache.as_ref(), USERS_CACHE_KEY).await;
        Ok(user.into())
    }

    /// Updates the given fields of an existing user
    pub async fn update_user(
        &self,
        user_id: i64,
        request: UpdateUserRequest,
    ) -> UserServiceResult<User> {
        let password_hash = match request.password {
            Some(password) => Some(self.hash(password).await?),
            None => None,
        };
        let changes = UserChanges {
            name: request.name,
            email: request.email.as_deref().map(normalize_email),
            password_hash,
            active: request.active,
        };

        let users = &self.users;
        let user = self
            .db
            .run_in_scope(move || async move {
                if let Some(email) = &changes.email {
                    if let Some(existing) = users.find_by_email(email).await? {
                        if existing.id != user_id {
                            return Err(UserServiceError::EmailAlreadyExists);
                        }
                    }
                }

                users
                    .update(user_id, changes)
                    .await
                    .map_err(map_email_conflict)?
                    .ok_or(UserServiceError::UserNotFound)
            })
            .await?;

        invalidate_quietly(self.cache.as_ref(), USERS_CACHE_KEY).await;
        Ok(user.into())
    }
}
