//! Auth Core Library
//!
//! The authentication and identity core of a multi-tenant backend: account
//! registration, credential login, refresh token rotation, password recovery
//! and email verification over PostgreSQL.
//!
//! # Features
//!
//! - **Ambient transactions**: every lifecycle operation runs as one
//!   transaction scope that nested store calls join without parameter threading
//! - **Ambient session identity**: the caller's identity travels with the
//!   request's future, isolated from concurrent requests
//! - **Login throttling**: derived from the login attempt log, evaluated
//!   inside the login transaction
//! - **Opaque tokens**: OS-random refresh, reset and verification tokens with
//!   rotation-on-use and single-use redemption
//! - **Best-effort email**: a bounded queue with retrying SMTP delivery
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use auth_core::{
//!     config::AppConfig,
//!     database::TransactionManager,
//!     models::{ClientInfo, LoginRequest, RegisterRequest},
//!     service::{cache::NoopCacheInvalidator, email::{EmailQueue, LogMailer}, AuthService},
//!     utils::security::BcryptHasher,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let pool = config.database.create_pool().await?;
//!     let (email, _worker) = EmailQueue::start(Arc::new(LogMailer), 64, 3);
//!
//!     let auth = AuthService::new(
//!         TransactionManager::new(pool),
//!         config.auth.clone(),
//!         Arc::new(BcryptHasher::new(config.auth.bcrypt_cost)),
//!         Arc::new(email),
//!         Arc::new(NoopCacheInvalidator),
//!     );
//!
//!     let client = ClientInfo::new(Some("203.0.113.7".to_string()), None);
//!     auth.register(
//!         RegisterRequest {
//!             name: Some("Alice".to_string()),
//!             email: "alice@example.com".to_string(),
//!             password: "correct horse battery staple".to_string(),
//!         },
//!         client.clone(),
//!     )
//!     .await?;
//!
//!     // Fails with UserInactive until the verification link is followed
//!     let _ = auth
//!         .login(
//!             LoginRequest {
//!                 email: "alice@example.com".to_string(),
//!                 password: "correct horse battery staple".to_string(),
//!             },
//!             client,
//!         )
//!         .await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Context**: task-local ambient session identity
//! - **Database**: pool setup and the ambient transaction scope
//! - **Repository**: one credential store per table
//! - **Service**: token lifecycle, rate limiting, users, organizations and
//!   the auth orchestrator
//! - **Utils**: error taxonomy, hashing and token generation

/// Configuration management for all service settings
pub mod config;

/// Ambient per-request session identity
pub mod context;

/// Database connection management and the transaction scope
pub mod database;

/// Data models and request/response structures
pub mod models;

/// Credential stores over the provisioned schema
pub mod repository;

/// Business logic services
pub mod service;

/// Shared utilities for security, validation, and error handling
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenient access
pub use context::{SessionContext, SessionIdentity};
pub use database::{DatabaseConfig, DatabasePool, TransactionManager};
pub use models::{
    ClientInfo, CreateOrganizationRequest, CreateUserRequest, LoginRequest, LoginResponse,
    Organization, RefreshResponse, RegisterRequest, ResetPasswordRequest, UpdateUserRequest, User,
};
pub use service::{
    AuthService, AuthServiceError, OrganizationService, OrganizationServiceError, UserService,
    UserServiceError,
};
pub use utils::error::{AppError, AppResult, ErrorResponse};

// Re-export configuration system
pub use config::{env, AppConfig, AuthConfig, ConfigError, EmailConfig};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
