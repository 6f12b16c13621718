//! Service Layer
//!
//! Business logic of the auth core, composed over the credential stores.

pub mod auth;
pub mod cache;
pub mod email;
pub mod organization;
pub mod rate_limit;
pub mod tokens;
pub mod user;

// Re-export services
pub use auth::{AuthService, AuthServiceError};
pub use email::{EmailDispatcher, EmailQueue, SmtpMailer};
pub use organization::{OrganizationService, OrganizationServiceError};
pub use rate_limit::RateLimiter;
pub use tokens::TokenManager;
pub use user::{UserService, UserServiceError};
