//! Token Lifecycle Manager
//!
//! Issues, redeems and revokes the three opaque token kinds. Every token is
//! a hex-encoded run of OS-random bytes with no embedded structure. A token
//! that fails validation is reported as absent, whatever the reason.
//!
//! Redemption relies on conditional updates (`WHERE revoked = FALSE`,
//! `WHERE used = FALSE`), so a token can be consumed exactly once even when
//! two scopes race on it. Callers run these operations inside the
//! orchestrator's transaction scope so that rotation is atomic.

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

use crate::config::AuthConfig;
use crate::models::auth::{
    ClientInfo, EmailVerification, PasswordReset, RefreshToken, TokenState,
};
use crate::repository::{EmailVerificationRepository, PasswordResetRepository, RefreshTokenRepository};
use crate::utils::security::generate_token_hex;

/// The opaque token families managed by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Refresh,
    PasswordReset,
    EmailVerification,
}

impl TokenKind {
    /// Random bytes per token before hex encoding
    pub fn byte_len(self) -> usize {
        match self {
            TokenKind::Refresh => 64,
            TokenKind::PasswordReset | TokenKind::EmailVerification => 32,
        }
    }

    pub fn generate(self) -> String {
        generate_token_hex(self.byte_len())
    }
}

/// Time-to-live per token kind
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub refresh_ttl: Duration,
    pub password_reset_ttl: Duration,
    pub email_verification_ttl: Duration,
}

impl TokenPolicy {
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::PasswordReset => self.password_reset_ttl,
            TokenKind::EmailVerification => self.email_verification_ttl,
        }
    }

    pub fn expires_at(&self, kind: TokenKind, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + self.ttl(kind)
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for TokenPolicy {
    fn from(config: &AuthConfig) -> Self {
        Self {
            refresh_ttl: config.refresh_token_ttl(),
            password_reset_ttl: config.password_reset_ttl(),
            email_verification_ttl: config.email_verification_ttl(),
        }
    }
}

#[derive(Clone)]
pub struct TokenManager {
    policy: TokenPolicy,
    refresh_tokens: RefreshTokenRepository,
    password_resets: PasswordResetRepository,
    email_verifications: EmailVerificationRepository,
}

impl TokenManager {
    pub fn new(
        policy: TokenPolicy,
        refresh_tokens: RefreshTokenRepository,
        password_resets: PasswordResetRepository,
        email_verifications: EmailVerificationRepository,
    ) -> Self {
        Self {
            policy,
            refresh_tokens,
            password_resets,
            email_verifications,
        }
    }

    // ========================================================================
    // Refresh tokens
    // ========================================================================

    pub async fn issue_refresh_token(
        &self,
        user_id: i64,
        client: &ClientInfo,
    ) -> Result<RefreshToken, sqlx::Error> {
        let token = TokenKind::Refresh.generate();
        let expires_at = self.policy.expires_at(TokenKind::Refresh, Utc::now());
        self.refresh_tokens
            .create(
                user_id,
                &token,
                client.user_agent.as_deref(),
                client.ip_address.as_deref(),
                expires_at,
            )
            .await
    }

    /// Validate and revoke a presented refresh token
    ///
    /// Returns the consumed row, or `None` when the token is unknown, expired,
    /// revoked, or was consumed concurrently.
    pub async fn consume_refresh_token(
        &self,
        presented: &str,
    ) -> Result<Option<RefreshToken>, sqlx::Error> {
        let now = Utc::now();
        let Some(token) = self.refresh_tokens.find_by_token(presented).await? else {
            return Ok(None);
        };

        match token.state(now) {
            TokenState::Issued => {}
            TokenState::Revoked => {
                warn!(
                    "Revoked refresh token presented for user {}; possible token reuse",
                    token.user_id
                );
                return Ok(None);
            }
            _ => return Ok(None),
        }

        if !self.refresh_tokens.revoke_if_active(token.id, now).await? {
            warn!(
                "Refresh token for user {} was consumed concurrently",
                token.user_id
            );
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Revoke one refresh token; false when it was unknown or already revoked
    pub async fn revoke_refresh_token(&self, presented: &str) -> Result<bool, sqlx::Error> {
        self.refresh_tokens.revoke_by_token(presented, Utc::now()).await
    }

    pub async fn revoke_all_refresh_tokens(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let revoked = self
            .refresh_tokens
            .revoke_all_for_user(user_id, Utc::now())
            .await?;
        debug!("Revoked {} refresh tokens for user {}", revoked, user_id);
        Ok(revoked)
    }

    // ========================================================================
    // Password resets
    // ========================================================================

    pub async fn issue_password_reset(
        &self,
        user_id: i64,
        client: &ClientInfo,
    ) -> Result<PasswordReset, sqlx::Error> {
        let token = TokenKind::PasswordReset.generate();
        let expires_at = self.policy.expires_at(TokenKind::PasswordReset, Utc::now());
        self.password_resets
            .create(user_id, &token, client.ip_address.as_deref(), expires_at)
            .await
    }

    /// Redeem a reset token and invalidate the user's other pending resets
    pub async fn redeem_password_reset(
        &self,
        presented: &str,
    ) -> Result<Option<PasswordReset>, sqlx::Error> {
        let now = Utc::now();
        let Some(reset) = self.password_resets.find_by_token(presented).await? else {
            return Ok(None);
        };

        if !reset.state(now).is_valid() {
            return Ok(None);
        }

        if !self.password_resets.mark_password_reset_used(reset.id, now).await? {
            return Ok(None);
        }

        self.password_resets
            .invalidate_pending_for_user(reset.user_id, reset.id, now)
            .await?;

        Ok(Some(reset))
    }

    // ========================================================================
    // Email verifications
    // ========================================================================

    pub async fn issue_email_verification(
        &self,
        user_id: i64,
        client: &ClientInfo,
    ) -> Result<EmailVerification, sqlx::Error> {
        let token = TokenKind::EmailVerification.generate();
        let expires_at = self
            .policy
            .expires_at(TokenKind::EmailVerification, Utc::now());
        self.email_verifications
            .create(user_id, &token, client.ip_address.as_deref(), expires_at)
            .await
    }

    /// Redeem a verification token and invalidate the user's other pending ones
    pub async fn redeem_email_verification(
        &self,
        presented: &str,
    ) -> Result<Option<EmailVerification>, sqlx::Error> {
        let now = Utc::now();
        let Some(verification) = self.email_verifications.find_by_token(presented).await? else {
            return Ok(None);
        };

        if !verification.state(now).is_valid() {
            return Ok(None);
        }

        if !self
            .email_verifications
            .mark_email_verification_used(verification.id, now)
            .await?
        {
            return Ok(None);
        }

        self.email_verifications
            .invalidate_pending_for_user(verification.user_id, verification.id, now)
            .await?;

        Ok(Some(verification))
    }
}
