//! Configuration Module
//!
//! Centralized configuration for the auth core: database pool, token
//! lifetimes and throttling policy, and the optional email transport.

use chrono::Duration;
use thiserror::Error;

use crate::database::DatabaseConfig;

/// Environment variable helpers
pub mod env {
    use std::env;

    /// Get environment variable as string with default
    pub fn get_string(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get environment variable as boolean with default
    pub fn get_bool(key: &str, default: bool) -> bool {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u16 with default
    pub fn get_u16(key: &str, default: u16) -> u16 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u32 with default
    pub fn get_u32(key: &str, default: u32) -> u32 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u64 with default
    pub fn get_u64(key: &str, default: u64) -> u64 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as usize with default
    pub fn get_usize(key: &str, default: usize) -> usize {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as i64 with default
    pub fn get_i64(key: &str, default: i64) -> i64 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Check if environment variable is set
    pub fn is_set(key: &str) -> bool {
        env::var(key).is_ok()
    }

    /// Get a required environment variable
    pub fn get_required(key: &str) -> Result<String, super::ConfigError> {
        env::var(key).map_err(|_| super::ConfigError::Missing(key.to_string()))
    }
}

/// Configuration loading and validation errors
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Longest accepted refresh token lifetime
pub const MAX_REFRESH_TOKEN_TTL_DAYS: i64 = 365;
/// Longest accepted password reset lifetime (one week)
pub const MAX_PASSWORD_RESET_TTL_MINUTES: i64 = 7 * 24 * 60;
/// Longest accepted email verification lifetime (thirty days)
pub const MAX_EMAIL_VERIFICATION_TTL_HOURS: i64 = 30 * 24;
/// Widest accepted throttling window (one day)
pub const MAX_LOGIN_WINDOW_MINUTES: i64 = 24 * 60;
/// Longest accepted login attempt retention (ten years)
pub const MAX_LOGIN_ATTEMPT_RETENTION_DAYS: i64 = 3650;
/// Longest accepted session inactivity (one year)
pub const MAX_SESSION_INACTIVITY_HOURS: i64 = 365 * 24;

/// Token lifetimes, hashing cost and login throttling
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// bcrypt cost factor
    pub bcrypt_cost: u32,

    pub refresh_token_ttl_days: i64,
    pub password_reset_ttl_minutes: i64,
    pub email_verification_ttl_hours: i64,

    /// Failed attempts inside the window that trigger throttling
    pub login_max_failed_attempts: i64,
    pub login_window_minutes: i64,

    /// How long login attempts are retained by the cleanup job
    pub login_attempt_retention_days: i64,

    /// Sessions idle for longer are pruned by the cleanup job
    pub session_inactivity_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: 12,
            refresh_token_ttl_days: 7,
            password_reset_ttl_minutes: 60,
            email_verification_ttl_hours: 24,
            login_max_failed_attempts: 5,
            login_window_minutes: 15,
            login_attempt_retention_days: 30,
            session_inactivity_hours: 24,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bcrypt_cost: env::get_u32("BCRYPT_COST", defaults.bcrypt_cost),
            refresh_token_ttl_days: env::get_i64(
                "REFRESH_TOKEN_TTL_DAYS",
                defaults.refresh_token_ttl_days,
            ),
            password_reset_ttl_minutes: env::get_i64(
                "PASSWORD_RESET_TTL_MINUTES",
                defaults.password_reset_ttl_minutes,
            ),
            email_verification_ttl_hours: env::get_i64(
                "EMAIL_VERIFICATION_TTL_HOURS",
                defaults.email_verification_ttl_hours,
            ),
            login_max_failed_attempts: env::get_i64(
                "LOGIN_MAX_FAILED_ATTEMPTS",
                defaults.login_max_failed_attempts,
            ),
            login_window_minutes: env::get_i64("LOGIN_WINDOW_MINUTES", defaults.login_window_minutes),
            login_attempt_retention_days: env::get_i64(
                "LOGIN_ATTEMPT_RETENTION_DAYS",
                defaults.login_attempt_retention_days,
            ),
            session_inactivity_hours: env::get_i64(
                "SESSION_INACTIVITY_HOURS",
                defaults.session_inactivity_hours,
            ),
        }
    }

    // Getters clamp to the accepted range

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::days(self.refresh_token_ttl_days.clamp(0, MAX_REFRESH_TOKEN_TTL_DAYS))
    }

    pub fn password_reset_ttl(&self) -> Duration {
        Duration::minutes(
            self.password_reset_ttl_minutes
                .clamp(0, MAX_PASSWORD_RESET_TTL_MINUTES),
        )
    }

    pub fn email_verification_ttl(&self) -> Duration {
        Duration::hours(
            self.email_verification_ttl_hours
                .clamp(0, MAX_EMAIL_VERIFICATION_TTL_HOURS),
        )
    }

    pub fn login_window(&self) -> Duration {
        Duration::minutes(self.login_window_minutes.clamp(0, MAX_LOGIN_WINDOW_MINUTES))
    }

    pub fn session_inactivity(&self) -> Duration {
        Duration::hours(
            self.session_inactivity_hours
                .clamp(0, MAX_SESSION_INACTIVITY_HOURS),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::Invalid(format!(
                "bcrypt cost must be between 4 and 31, got {}",
                self.bcrypt_cost
            )));
        }

        let bounded = [
            ("refresh_token_ttl_days", self.refresh_token_ttl_days, MAX_REFRESH_TOKEN_TTL_DAYS),
            (
                "password_reset_ttl_minutes",
                self.password_reset_ttl_minutes,
                MAX_PASSWORD_RESET_TTL_MINUTES,
            ),
            (
                "email_verification_ttl_hours",
                self.email_verification_ttl_hours,
                MAX_EMAIL_VERIFICATION_TTL_HOURS,
            ),
            ("login_max_failed_attempts", self.login_max_failed_attempts, i64::MAX),
            ("login_window_minutes", self.login_window_minutes, MAX_LOGIN_WINDOW_MINUTES),
            (
                "login_attempt_retention_days",
                self.login_attempt_retention_days,
                MAX_LOGIN_ATTEMPT_RETENTION_DAYS,
            ),
            (
                "session_inactivity_hours",
                self.session_inactivity_hours,
                MAX_SESSION_INACTIVITY_HOURS,
            ),
        ];
        for (name, value, max) in bounded {
            if value <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
            if value > max {
                return Err(ConfigError::Invalid(format!(
                    "{} must be at most {}, got {}",
                    name, max, value
                )));
            }
        }

        Ok(())
    }
}

/// Email service configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,

    /// Base URL used to build links in email templates
    pub app_base_url: String,

    /// Bounded queue capacity between enqueue and the delivery worker
    pub queue_capacity: usize,

    /// Delivery attempts per job before it is dropped
    pub max_delivery_attempts: u32,
}

impl EmailConfig {
    /// Load from the environment; `None` when SMTP is not configured
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        if !env::is_set("SMTP_HOST") {
            return Ok(None);
        }

        Ok(Some(Self {
            smtp_host: env::get_required("SMTP_HOST")?,
            smtp_port: env::get_u16("SMTP_PORT", 587),
            smtp_username: env::get_required("SMTP_USERNAME")?,
            smtp_password: env::get_required("SMTP_PASSWORD")?,
            from_email: env::get_required("FROM_EMAIL")?,
            from_name: env::get_string("FROM_NAME", "Auth Core"),
            app_base_url: env::get_string("APP_BASE_URL", "http://localhost:3000"),
            queue_capacity: env::get_usize("EMAIL_QUEUE_CAPACITY", 256),
            max_delivery_attempts: env::get_u32("EMAIL_MAX_DELIVERY_ATTEMPTS", 3),
        }))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "email queue capacity must be greater than 0".to_string(),
            ));
        }
        if self.max_delivery_attempts == 0 {
            return Err(ConfigError::Invalid(
                "email delivery attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Application configuration combining all service configurations
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub email: Option<EmailConfig>,
}

impl AppConfig {
    /// Load complete application configuration from environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database: DatabaseConfig::from_env()
                .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            auth: AuthConfig::from_env(),
            email: EmailConfig::from_env()?,
        })
    }

    /// Validate the complete configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "Database min_connections cannot be greater than max_connections".to_string(),
            ));
        }

        self.auth.validate()?;

        if let Some(email) = &self.email {
            email.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            email: None,
        }
    }

    #[test]
    fn test_auth_config_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.bcrypt_cost, 12);
        assert_eq!(config.refresh_token_ttl(), Duration::days(7));
        assert_eq!(config.password_reset_ttl(), Duration::hours(1));
        assert_eq!(config.email_verification_ttl(), Duration::hours(24));
        assert_eq!(config.login_max_failed_attempts, 5);
        assert_eq!(config.login_window(), Duration::minutes(15));
        assert_eq!(config.login_attempt_retention_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_cost() {
        let mut config = AuthConfig::default();
        config.bcrypt_cost = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.bcrypt_cost = 32;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_limits() {
        let mut config = AuthConfig::default();
        config.login_max_failed_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("login_max_failed_attempts"));
    }

    #[test]
    fn test_rejects_oversized_durations() {
        let mut config = AuthConfig::default();
        config.login_attempt_retention_days = i64::MAX / 1000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("login_attempt_retention_days"));

        let mut config = AuthConfig::default();
        config.refresh_token_ttl_days = MAX_REFRESH_TOKEN_TTL_DAYS + 1;
        assert!(config.validate().is_err());

        config.refresh_token_ttl_days = MAX_REFRESH_TOKEN_TTL_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_getters_do_not_overflow_unvalidated_values() {
        let config = AuthConfig {
            refresh_token_ttl_days: i64::MAX,
            password_reset_ttl_minutes: i64::MAX,
            email_verification_ttl_hours: i64::MIN,
            login_window_minutes: i64::MAX,
            session_inactivity_hours: i64::MAX,
            ..AuthConfig::default()
        };

        assert_eq!(config.refresh_token_ttl(), Duration::days(MAX_REFRESH_TOKEN_TTL_DAYS));
        assert_eq!(
            config.password_reset_ttl(),
            Duration::minutes(MAX_PASSWORD_RESET_TTL_MINUTES)
        );
        assert_eq!(config.email_verification_ttl(), Duration::zero());
        assert_eq!(config.login_window(), Duration::minutes(MAX_LOGIN_WINDOW_MINUTES));
        assert_eq!(
            config.session_inactivity(),
            Duration::hours(MAX_SESSION_INACTIVITY_HOURS)
        );
    }

    #[test]
    fn test_app_config_validation() {
        assert!(app_config().validate().is_ok());

        let mut config = app_config();
        config.database.min_connections = 50;
        assert!(config.validate().is_err());

        let mut config = app_config();
        config.email = Some(EmailConfig {
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
            smtp_username: "user".to_string(),
            smtp_password: "pass".to_string(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Auth Core".to_string(),
            app_base_url: "http://localhost:3000".to_string(),
            queue_capacity: 0,
            max_delivery_attempts: 3,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_helpers() {
        assert!(env::get_bool("AUTH_CORE_NONEXISTENT_BOOL", true));
        assert_eq!(env::get_u32("AUTH_CORE_NONEXISTENT_U32", 42), 42);
        assert_eq!(env::get_string("AUTH_CORE_NONEXISTENT_STRING", "default"), "default");
        assert_eq!(
            env::get_required("AUTH_CORE_NONEXISTENT_REQUIRED"),
            Err(ConfigError::Missing("AUTH_CORE_NONEXISTENT_REQUIRED".to_string()))
        );
    }
}
