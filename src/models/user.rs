//! User Model
//!
//! Core user data structures and type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::SessionIdentity;

/// User representation for external responses
///
/// This struct represents a user profile without the credential hash.
/// All datetime fields use UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Surrogate identifier assigned by the store
    pub id: i64,

    /// User's display name
    pub name: Option<String>,

    /// User's email address (unique, normalized)
    pub email: String,

    /// False until the email address is verified
    pub active: bool,

    /// Timestamp when the user account was created
    pub created_at: DateTime<Utc>,

    /// Timestamp when the user was last modified
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Identity to install in the session context for this user
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity::new(self.id, self.email.clone())
    }
}

/// Internal user representation including the credential hash
///
/// Used for database operations that need the hash. Never returned from the
/// public service API.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserWithPassword {
    pub id: i64,
    pub name: Option<String>,
    pub email: String,

    /// bcrypt hashed password
    pub password_hash: String,

    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserWithPassword> for User {
    /// Strips the password hash so it is never exposed
    fn from(user: UserWithPassword) -> Self {
        User {
            id: user.id,
            name: user.name,
            email: user.email,
            active: user.active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Columns to write when creating a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
}

/// Partial update; `None` keeps the stored value
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_with_password_conversion() {
        let user_with_password = UserWithPassword {
            id: 42,
            name: Some("Test User".to_string()),
            email: "test@example.com".to_string(),
            password_hash: "hashed_password".to_string(),
            active: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let user: User = user_with_password.into();

        assert_eq!(user.id, 42);
        assert_eq!(user.name.as_deref(), Some("Test User"));
        assert!(!user.active);

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_user_identity() {
        let user = User {
            id: 5,
            name: None,
            email: "five@example.com".to_string(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(user.identity(), SessionIdentity::new(5, "five@example.com"));
    }
}
