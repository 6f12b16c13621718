//! Authentication Models
//!
//! Rows for refresh tokens, password resets, email verifications, login
//! attempts and server-tracked sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::user::User;

/// Lifecycle state of any single-use or rotating token
///
/// `Issued` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Issued,
    Redeemed,
    Revoked,
    Expired,
}

impl TokenState {
    pub fn is_valid(self) -> bool {
        self == TokenState::Issued
    }
}

/// Refresh token row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.revoked {
            TokenState::Revoked
        } else if self.expires_at <= now {
            TokenState::Expired
        } else {
            TokenState::Issued
        }
    }
}

/// Password reset row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PasswordReset {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PasswordReset {
    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.used {
            TokenState::Redeemed
        } else if self.expires_at <= now {
            TokenState::Expired
        } else {
            TokenState::Issued
        }
    }
}

/// Email verification row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmailVerification {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailVerification {
    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.used {
            TokenState::Redeemed
        } else if self.expires_at <= now {
            TokenState::Expired
        } else {
            TokenState::Issued
        }
    }
}

/// Why a login attempt was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UserNotFound,
    UserInactive,
    InvalidPassword,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::UserNotFound => "user_not_found",
            FailureReason::UserInactive => "user_inactive",
            FailureReason::InvalidPassword => "invalid_password",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only login attempt row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LoginAttempt {
    pub id: i64,
    pub user_id: Option<i64>,
    pub email: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Attempt to append to the log
#[derive(Debug, Clone)]
pub struct NewLoginAttempt {
    pub user_id: Option<i64>,
    pub email: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
}

impl NewLoginAttempt {
    pub fn succeeded(user_id: i64, email: &str, client: &ClientInfo) -> Self {
        Self {
            user_id: Some(user_id),
            email: email.to_string(),
            ip_address: client.ip_or_unknown(),
            user_agent: client.user_agent.clone(),
            success: true,
            failure_reason: None,
        }
    }

    pub fn failed(
        user_id: Option<i64>,
        email: &str,
        client: &ClientInfo,
        reason: FailureReason,
    ) -> Self {
        Self {
            user_id,
            email: email.to_string(),
            ip_address: client.ip_or_unknown(),
            user_agent: client.user_agent.clone(),
            success: false,
            failure_reason: Some(reason),
        }
    }
}

/// Server-tracked session row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSession {
    pub id: i64,
    pub user_id: i64,
    pub session_id: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Device/network metadata of the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    pub(crate) fn ip_or_unknown(&self) -> String {
        self.ip_address
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub user: User,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub session_id: String,
}

/// Result of a successful refresh
#[derive(Debug, Clone)]
pub struct RefreshResponse {
    pub user: User,
    pub refresh_token: String,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// What a forced sign-out removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevocationSummary {
    pub refresh_tokens: u64,
    pub sessions: u64,
}

/// Row counts removed by the maintenance cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub refresh_tokens: u64,
    pub password_resets: u64,
    pub email_verifications: u64,
    pub expired_sessions: u64,
    pub inactive_sessions: u64,
    pub login_attempts: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.refresh_tokens
            + self.password_resets
            + self.email_verifications
            + self.expired_sessions
            + self.inactive_sessions
            + self.login_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn refresh_token(expires_in: Duration, revoked: bool) -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            id: 1,
            user_id: 1,
            token: "abc".to_string(),
            device_info: None,
            ip_address: None,
            expires_at: now + expires_in,
            revoked,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn password_reset(expires_in: Duration, used: bool) -> PasswordReset {
        let now = Utc::now();
        PasswordReset {
            id: 1,
            user_id: 1,
            token: "def".to_string(),
            expires_at: now + expires_in,
            used,
            used_at: None,
            ip_address: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_refresh_token_states() {
        let now = Utc::now();
        assert_eq!(refresh_token(Duration::days(7), false).state(now), TokenState::Issued);
        assert_eq!(refresh_token(Duration::days(7), true).state(now), TokenState::Revoked);
        assert_eq!(refresh_token(Duration::minutes(-1), false).state(now), TokenState::Expired);
        // Revocation wins over expiry
        assert_eq!(refresh_token(Duration::minutes(-1), true).state(now), TokenState::Revoked);
    }

    #[test]
    fn test_password_reset_states() {
        let now = Utc::now();
        assert!(password_reset(Duration::hours(1), false).state(now).is_valid());
        assert_eq!(password_reset(Duration::hours(1), true).state(now), TokenState::Redeemed);
        assert_eq!(password_reset(Duration::seconds(-1), false).state(now), TokenState::Expired);
    }

    #[test]
    fn test_failure_reason_codes() {
        assert_eq!(FailureReason::UserNotFound.as_str(), "user_not_found");
        assert_eq!(FailureReason::UserInactive.as_str(), "user_inactive");
        assert_eq!(FailureReason::InvalidPassword.to_string(), "invalid_password");
    }

    #[test]
    fn test_login_attempt_builders() {
        let client = ClientInfo::new(None, Some("curl/8".to_string()));

        let ok = NewLoginAttempt::succeeded(9, "a@x.com", &client);
        assert!(ok.success);
        assert_eq!(ok.ip_address, "unknown");

        let failed = NewLoginAttempt::failed(None, "b@x.com", &client, FailureReason::UserNotFound);
        assert!(!failed.success);
        assert_eq!(failed.user_id, None);
        assert_eq!(failed.failure_reason, Some(FailureReason::UserNotFound));
    }

    #[test]
    fn test_cleanup_report_total() {
        let report = CleanupReport {
            refresh_tokens: 2,
            login_attempts: 3,
            ..Default::default()
        };
        assert_eq!(report.total(), 5);
    }
}
