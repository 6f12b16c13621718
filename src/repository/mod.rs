//! Credential Store
//!
//! One store per table. Every store holds the shared [`TransactionManager`]
//! and resolves its connection per call, so the same store code runs inside
//! an ambient transaction or in autocommit mode.

pub mod email_verifications;
pub mod login_attempts;
pub mod organizations;
pub mod password_resets;
pub mod refresh_tokens;
pub mod user_sessions;
pub mod users;

pub use email_verifications::EmailVerificationRepository;
pub use login_attempts::LoginAttemptRepository;
pub use organizations::OrganizationRepository;
pub use password_resets::PasswordResetRepository;
pub use refresh_tokens::RefreshTokenRepository;
pub use user_sessions::UserSessionRepository;
pub use users::UserRepository;

use crate::database::TransactionManager;

/// Every credential store wired to one transaction manager
#[derive(Clone)]
pub struct Stores {
    pub users: UserRepository,
    pub refresh_tokens: RefreshTokenRepository,
    pub password_resets: PasswordResetRepository,
    pub email_verifications: EmailVerificationRepository,
    pub login_attempts: LoginAttemptRepository,
    pub sessions: UserSessionRepository,
}

impl Stores {
    pub fn new(db: &TransactionManager) -> Self {
        Self {
            users: UserRepository::new(db.clone()),
            refresh_tokens: RefreshTokenRepository::new(db.clone()),
            password_resets: PasswordResetRepository::new(db.clone()),
            email_verifications: EmailVerificationRepository::new(db.clone()),
            login_attempts: LoginAttemptRepository::new(db.clone()),
            sessions: UserSessionRepository::new(db.clone()),
        }
    }
}
