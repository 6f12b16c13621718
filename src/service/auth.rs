//! Authentication Service
//!
//! The auth orchestrator. Each lifecycle operation runs as one transaction
//! scope over the credential stores, so a failure anywhere leaves no partial
//! state behind.
//!
//! Login is the one operation whose rejections still commit: the scope
//! resolves to a [`LoginOutcome`] so that failed-attempt rows are written
//! before the authentication error is raised to the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use thiserror::Error;

use crate::config::{AuthConfig, MAX_LOGIN_ATTEMPT_RETENTION_DAYS};
use crate::context::SessionContext;
use crate::database::TransactionManager;
use crate::models::{
    auth::{
        CleanupReport, ClientInfo, FailureReason, LoginAttempt, LoginResponse, NewLoginAttempt,
        RefreshResponse, RevocationSummary, UserSession,
    },
    requests::{CreateUserRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, UpdateUserRequest},
    user::User,
};
use crate::repository::Stores;
use crate::service::{
    cache::CacheInvalidator,
    email::{EmailDispatcher, EmailKind},
    rate_limit::{RateLimitPolicy, RateLimiter},
    tokens::{TokenManager, TokenPolicy},
    user::{UserService, UserServiceError},
};
use crate::utils::{
    error::{AppError, ErrorResponse},
    security::{generate_token_hex, verify_password, PasswordHasher},
    validation::normalize_email,
};

/// Random bytes in a server-tracked session id
const SESSION_ID_BYTES: usize = 32;

/// Custom error types for the authentication service
#[derive(Error, Debug)]
pub enum AuthServiceError {
    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Too many login attempts. Try again in a few minutes")]
    TooManyAttempts,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User is inactive")]
    UserInactive,

    #[error("Invalid or expired token")]
    InvalidRefreshToken,

    #[error("Invalid or expired token")]
    InvalidResetToken,

    #[error("Invalid or expired token")]
    InvalidVerificationToken,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Retention must be between 1 and {max} days, got {0}", max = MAX_LOGIN_ATTEMPT_RETENTION_DAYS)]
    InvalidRetention(i64),

    #[error("Password hashing error: {0}")]
    HashingError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AuthServiceError {
    /// Fine-grained stable code for client branching
    pub fn reason(&self) -> &'static str {
        match self {
            AuthServiceError::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            AuthServiceError::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            AuthServiceError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthServiceError::UserInactive => "USER_INACTIVE",
            AuthServiceError::InvalidRefreshToken
            | AuthServiceError::InvalidResetToken
            | AuthServiceError::InvalidVerificationToken => "INVALID_TOKEN",
            AuthServiceError::NotAuthenticated => "NOT_AUTHENTICATED",
            AuthServiceError::InvalidRetention(_) => "INVALID_RETENTION",
            AuthServiceError::HashingError(_) | AuthServiceError::DatabaseError(_) => {
                "INTERNAL_ERROR"
            }
        }
    }
}

impl From<UserServiceError> for AuthServiceError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::EmailAlreadyExists => AuthServiceError::EmailAlreadyExists,
            // Token rows reference their user, so a missing user means the token is stale
            UserServiceError::UserNotFound => AuthServiceError::InvalidRefreshToken,
            UserServiceError::DatabaseError(e) => AuthServiceError::DatabaseError(e),
            UserServiceError::HashingError(msg) => AuthServiceError::HashingError(msg),
        }
    }
}

impl From<AuthServiceError> for AppError {
    fn from(err: AuthServiceError) -> Self {
        let message = err.to_string();
        match err {
            AuthServiceError::EmailAlreadyExists => AppError::Conflict(message),
            AuthServiceError::TooManyAttempts
            | AuthServiceError::InvalidCredentials
            | AuthServiceError::UserInactive
            | AuthServiceError::InvalidRefreshToken
            | AuthServiceError::NotAuthenticated => AppError::Unauthorized(message),
            AuthServiceError::InvalidResetToken
            | AuthServiceError::InvalidVerificationToken
            | AuthServiceError::InvalidRetention(_) => AppError::BadRequest(message),
            AuthServiceError::HashingError(msg) => AppError::Internal(msg),
            AuthServiceError::DatabaseError(e) => AppError::Database(e),
        }
    }
}

impl From<AuthServiceError> for ErrorResponse {
    fn from(err: AuthServiceError) -> Self {
        let reason = err.reason();
        let app: AppError = err.into();
        ErrorResponse::with_reason(app.error_code(), &app.public_message(), reason)
    }
}

/// Result type for authentication service operations
pub type AuthServiceResult<T> = Result<T, AuthServiceError>;

/// What the login scope commits before the result reaches the caller
enum LoginOutcome {
    Authenticated(LoginResponse),
    Rejected(AuthServiceError),
}

#[derive(Clone)]
pub struct AuthService {
    db: TransactionManager,
    stores: Stores,
    user_service: UserService,
    tokens: TokenManager,
    rate_limiter: RateLimiter,
    hasher: Arc<dyn PasswordHasher>,
    email: Arc<dyn EmailDispatcher>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        db: TransactionManager,
        config: AuthConfig,
        hasher: Arc<dyn PasswordHasher>,
        email: Arc<dyn EmailDispatcher>,
        cache: Arc<dyn CacheInvalidator>,
    ) -> Self {
        let stores = Stores::new(&db);
        let tokens = TokenManager::new(
            TokenPolicy::from(&config),
            stores.refresh_tokens.clone(),
            stores.password_resets.clone(),
            stores.email_verifications.clone(),
        );
        let rate_limiter =
            RateLimiter::new(RateLimitPolicy::from(&config), stores.login_attempts.clone());
        let user_service = UserService::new(db.clone(), hasher.clone(), cache);

        Self {
            db,
            stores,
            user_service,
            tokens,
            rate_limiter,
            hasher,
            email,
            config,
        }
    }

    pub fn users(&self) -> &UserService {
        &self.user_service
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Registers an inactive account and sends its verification email
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: ClientInfo,
    ) -> AuthServiceResult<User> {
        let this = self;
        self.db
            .run_in_scope(move || async move {
                let email = normalize_email(&request.email);
                if this.user_service.find_by_email(&email).await?.is_some() {
                    return Err(AuthServiceError::EmailAlreadyExists);
                }

                let user = this
                    .user_service
                    .create_user(CreateUserRequest {
                        name: request.name,
                        email,
                        password: request.password,
                        active: Some(false),
                    })
                    .await?;

                this.stores
                    .login_attempts
                    .record(NewLoginAttempt {
                        user_id: Some(user.id),
                        email: user.email.clone(),
                        ip_address: client.ip_or_unknown(),
                        user_agent: Some("registration".to_string()),
                        success: true,
                        failure_reason: None,
                    })
                    .await?;

                let verification = this.tokens.issue_email_verification(user.id, &client).await?;
                this.enqueue_quietly(
                    EmailKind::Verification {
                        token: verification.token,
                    },
                    &user.email,
                )
                .await;

                info!("Registered user {}", user.id);
                Ok(user)
            })
            .await
    }

    /// Verifies credentials and issues a refresh token and a tracked session
    pub async fn login(
        &self,
        request: LoginRequest,
        client: ClientInfo,
    ) -> AuthServiceResult<LoginResponse> {
        let this = self;
        let email = normalize_email(&request.email);
        let outcome = self
            .db
            .run_in_scope(move || async move {
                this.attempt_login(&email, request.password, &client).await
            })
            .await?;

        match outcome {
            LoginOutcome::Authenticated(response) => Ok(response),
            LoginOutcome::Rejected(err) => Err(err),
        }
    }

    async fn attempt_login(
        &self,
        email: &str,
        password: String,
        client: &ClientInfo,
    ) -> AuthServiceResult<LoginOutcome> {
        // Throttling is decided before any lookup and leaves no attempt row
        if self.rate_limiter.is_throttled(email).await? {
            warn!("Login throttled for {}", email);
            return Ok(LoginOutcome::Rejected(AuthServiceError::TooManyAttempts));
        }

        let Some(user) = self.user_service.find_credentials_by_email(email).await? else {
            self.record_failure(None, email, client, FailureReason::UserNotFound)
                .await?;
            return Ok(LoginOutcome::Rejected(AuthServiceError::InvalidCredentials));
        };

        if !user.active {
            self.record_failure(Some(user.id), email, client, FailureReason::UserInactive)
                .await?;
            return Ok(LoginOutcome::Rejected(AuthServiceError::UserInactive));
        }

        let valid = verify_password(self.hasher.clone(), password, user.password_hash.clone())
            .await
            .map_err(|e| AuthServiceError::HashingError(e.to_string()))?;
        if !valid {
            self.record_failure(Some(user.id), email, client, FailureReason::InvalidPassword)
                .await?;
            return Ok(LoginOutcome::Rejected(AuthServiceError::InvalidCredentials));
        }

        self.stores
            .login_attempts
            .record(NewLoginAttempt::succeeded(user.id, email, client))
            .await?;

        let refresh = self.tokens.issue_refresh_token(user.id, client).await?;
        let session_id = generate_token_hex(SESSION_ID_BYTES);
        self.stores
            .sessions
            .create(
                user.id,
                &session_id,
                client.ip_address.as_deref(),
                client.user_agent.as_deref(),
                refresh.expires_at,
            )
            .await?;

        info!("User {} logged in", user.id);
        Ok(LoginOutcome::Authenticated(LoginResponse {
            user: user.into(),
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
            session_id,
        }))
    }

    async fn record_failure(
        &self,
        user_id: Option<i64>,
        email: &str,
        client: &ClientInfo,
        reason: FailureReason,
    ) -> AuthServiceResult<()> {
        debug!("Login failed for {}: {}", email, reason);
        self.stores
            .login_attempts
            .record(NewLoginAttempt::failed(user_id, email, client, reason))
            .await?;
        Ok(())
    }

    /// Rotates a refresh token: the presented one is revoked and a successor issued
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        client: ClientInfo,
    ) -> AuthServiceResult<RefreshResponse> {
        let this = self;
        self.db
            .run_in_scope(move || async move {
                let consumed = this
                    .tokens
                    .consume_refresh_token(refresh_token)
                    .await?
                    .ok_or(AuthServiceError::InvalidRefreshToken)?;

                let user = this
                    .user_service
                    .find_by_id(consumed.user_id)
                    .await?
                    .ok_or(AuthServiceError::InvalidRefreshToken)?;

                if !user.active {
                    return Err(AuthServiceError::UserInactive);
                }

                let successor_client = ClientInfo {
                    ip_address: client.ip_address,
                    user_agent: client.user_agent.or(consumed.device_info),
                };
                let successor = this
                    .tokens
                    .issue_refresh_token(user.id, &successor_client)
                    .await?;

                debug!("Rotated refresh token for user {}", user.id);
                Ok(RefreshResponse {
                    user,
                    refresh_token: successor.token,
                    refresh_token_expires_at: successor.expires_at,
                })
            })
            .await
    }

    /// Revokes the presented refresh token; absent or unknown tokens are a no-op
    pub async fn logout(&self, refresh_token: Option<&str>) -> AuthServiceResult<()> {
        let Some(token) = refresh_token else {
            return Ok(());
        };

        let tokens = &self.tokens;
        let revoked = self
            .db
            .run_in_scope(move || async move {
                Ok::<_, AuthServiceError>(tokens.revoke_refresh_token(token).await?)
            })
            .await?;

        if revoked {
            debug!("Refresh token revoked on logout");
        }
        Ok(())
    }

    /// Sends a reset email; unknown emails succeed without side effects
    pub async fn request_password_reset(
        &self,
        email: &str,
        client: ClientInfo,
    ) -> AuthServiceResult<()> {
        let this = self;
        let email = normalize_email(email);
        self.db
            .run_in_scope(move || async move {
                let Some(user) = this.user_service.find_by_email(&email).await? else {
                    debug!("Password reset requested for unknown email");
                    return Ok(());
                };

                let reset = this.tokens.issue_password_reset(user.id, &client).await?;
                this.enqueue_quietly(EmailKind::PasswordReset { token: reset.token }, &user.email)
                    .await;
                Ok::<_, AuthServiceError>(())
            })
            .await
    }

    /// Redeems a reset token, sets the new password and signs the user out everywhere
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AuthServiceResult<()> {
        let this = self;
        self.db
            .run_in_scope(move || async move {
                let reset = this
                    .tokens
                    .redeem_password_reset(&request.token)
                    .await?
                    .ok_or(AuthServiceError::InvalidResetToken)?;

                this.user_service
                    .update_user(
                        reset.user_id,
                        UpdateUserRequest {
                            password: Some(request.new_password),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| match e {
                        UserServiceError::UserNotFound => AuthServiceError::InvalidResetToken,
                        other => other.into(),
                    })?;

                let summary = this.revoke_access(reset.user_id).await?;
                info!(
                    "Password reset for user {}; revoked {} refresh tokens",
                    reset.user_id, summary.refresh_tokens
                );
                Ok(())
            })
            .await
    }

    /// Redeems a verification token, activates the user and sends the welcome email
    pub async fn verify_email(&self, token: &str) -> AuthServiceResult<User> {
        let this = self;
        self.db
            .run_in_scope(move || async move {
                let verification = this
                    .tokens
                    .redeem_email_verification(token)
                    .await?
                    .ok_or(AuthServiceError::InvalidVerificationToken)?;

                let user = this
                    .user_service
                    .update_user(
                        verification.user_id,
                        UpdateUserRequest {
                            active: Some(true),
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| match e {
                        UserServiceError::UserNotFound => AuthServiceError::InvalidVerificationToken,
                        other => other.into(),
                    })?;

                let name = user.name.clone().unwrap_or_else(|| user.email.clone());
                this.enqueue_quietly(EmailKind::Welcome { name }, &user.email)
                    .await;

                info!("Verified email for user {}", user.id);
                Ok(user)
            })
            .await
    }

    /// The user if it exists and is active; anything else is absent
    pub async fn validate_session(&self, user_id: i64) -> AuthServiceResult<Option<User>> {
        let user = self.user_service.find_by_id(user_id).await?;
        Ok(user.filter(|user| user.active))
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Signs the ambient identity out of every device
    pub async fn logout_everywhere(&self) -> AuthServiceResult<RevocationSummary> {
        let identity =
            SessionContext::current_identity().ok_or(AuthServiceError::NotAuthenticated)?;
        self.revoke_user_access(identity.user_id).await
    }

    /// Revokes every refresh token and drops every session of a user
    pub async fn revoke_user_access(&self, user_id: i64) -> AuthServiceResult<RevocationSummary> {
        let this = self;
        let summary = self
            .db
            .run_in_scope(move || async move { this.revoke_access(user_id).await })
            .await?;

        info!(
            "Revoked {} refresh tokens and {} sessions for user {}",
            summary.refresh_tokens, summary.sessions, user_id
        );
        Ok(summary)
    }

    async fn revoke_access(&self, user_id: i64) -> AuthServiceResult<RevocationSummary> {
        Ok(RevocationSummary {
            refresh_tokens: self.tokens.revoke_all_refresh_tokens(user_id).await?,
            sessions: self.stores.sessions.remove_all_for_user(user_id).await?,
        })
    }

    /// Records activity on a live session; false for unknown or expired ones
    pub async fn touch_session(&self, session_id: &str) -> AuthServiceResult<bool> {
        Ok(self.stores.sessions.touch(session_id, Utc::now()).await?)
    }

    pub async fn active_sessions(&self, user_id: i64) -> AuthServiceResult<Vec<UserSession>> {
        Ok(self
            .stores
            .sessions
            .active_for_user(user_id, Utc::now())
            .await?)
    }

    // ========================================================================
    // Audit and maintenance
    // ========================================================================

    pub async fn recent_login_attempts(
        &self,
        email: &str,
        limit: i64,
    ) -> AuthServiceResult<Vec<LoginAttempt>> {
        let email = normalize_email(email);
        Ok(self.stores.login_attempts.recent_by_email(&email, limit).await?)
    }

    pub async fn recent_login_attempts_by_ip(
        &self,
        ip_address: &str,
        limit: i64,
    ) -> AuthServiceResult<Vec<LoginAttempt>> {
        Ok(self
            .stores
            .login_attempts
            .recent_by_ip(ip_address, limit)
            .await?)
    }

    /// Prunes expired tokens and sessions, idle sessions and old login attempts
    ///
    /// `retention_days` must lie in `1..=MAX_LOGIN_ATTEMPT_RETENTION_DAYS`.
    pub async fn clean_expired_data(&self, retention_days: i64) -> AuthServiceResult<CleanupReport> {
        if !(1..=MAX_LOGIN_ATTEMPT_RETENTION_DAYS).contains(&retention_days) {
            return Err(AuthServiceError::InvalidRetention(retention_days));
        }
        let retention = Duration::try_days(retention_days)
            .ok_or(AuthServiceError::InvalidRetention(retention_days))?;

        let stores = &self.stores;
        let inactivity = self.config.session_inactivity();
        let report = self
            .db
            .run_in_scope(move || async move {
                let now = Utc::now();
                let attempts_cutoff = now
                    .checked_sub_signed(retention)
                    .ok_or(AuthServiceError::InvalidRetention(retention_days))?;
                let inactive_cutoff = now
                    .checked_sub_signed(inactivity)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);

                Ok::<_, AuthServiceError>(CleanupReport {
                    refresh_tokens: stores.refresh_tokens.delete_expired(now).await?,
                    password_resets: stores.password_resets.delete_expired(now).await?,
                    email_verifications: stores.email_verifications.delete_expired(now).await?,
                    expired_sessions: stores.sessions.delete_expired(now).await?,
                    inactive_sessions: stores.sessions.delete_inactive(inactive_cutoff).await?,
                    login_attempts: stores.login_attempts.delete_older_than(attempts_cutoff).await?,
                })
            })
            .await?;

        info!("Cleanup removed {} rows: {:?}", report.total(), report);
        Ok(report)
    }

    /// Cleanup with the configured login-attempt retention
    pub async fn clean_expired_data_with_defaults(&self) -> AuthServiceResult<CleanupReport> {
        self.clean_expired_data(self.config.login_attempt_retention_days)
            .await
    }

    async fn enqueue_quietly(&self, kind: EmailKind, recipient: &str) {
        let template = kind.template_name();
        match self.email.enqueue(kind, recipient).await {
            Ok(handle) => debug!("Queued {} email as job {}", template, handle.id),
            Err(e) => warn!("Failed to enqueue {} email for {}: {}", template, recipient, e),
        }
    }
}
