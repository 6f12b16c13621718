//! Auth Core Administration CLI
//!
//! Maintenance functions that run outside request handling: schema
//! migrations, the expired-data cleanup job, forced sign-out of a user,
//! login audit lookups and an SMTP smoke test.

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use log::info;

use auth_core::{
    config::{AppConfig, MAX_LOGIN_ATTEMPT_RETENTION_DAYS},
    database::TransactionManager,
    service::{
        cache::NoopCacheInvalidator,
        email::{EmailDispatcher, EmailKind, EmailQueue, LogMailer, SmtpMailer},
        AuthService,
    },
    utils::security::BcryptHasher,
};

/// Auth core administration CLI
#[derive(Parser)]
#[command(name = "auth-admin", about = "Auth core administration CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Delete expired tokens and sessions and prune old login attempts
    Cleanup(CleanupArgs),
    /// Revoke every refresh token and session of a user
    RevokeUserTokens(RevokeArgs),
    /// Show recent login attempts for an email or an IP address
    Attempts(AttemptsArgs),
    /// Check database connectivity
    Health,
    /// Send a welcome email through the configured SMTP transport
    TestEmail(TestEmailArgs),
}

#[derive(Args)]
struct CleanupArgs {
    /// Keep login attempts for this many days (defaults to LOGIN_ATTEMPT_RETENTION_DAYS)
    #[arg(long)]
    retention_days: Option<i64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RevokeArgs {
    /// User ID
    user_id: i64,
}

#[derive(Args)]
struct AttemptsArgs {
    /// Filter by email
    #[arg(long, conflicts_with = "ip", required_unless_present = "ip")]
    email: Option<String>,

    /// Filter by IP address
    #[arg(long)]
    ip: Option<String>,

    /// Maximum number of rows
    #[arg(short, long, default_value = "20")]
    limit: i64,

    /// Print the attempts as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct TestEmailArgs {
    /// Recipient address
    to: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    config.validate()?;

    if let Commands::TestEmail(args) = &cli.command {
        return send_test_email(&config, &args.to).await;
    }

    let pool = config
        .database
        .create_pool()
        .await
        .context("Failed to connect to the database")?;

    if let Commands::Migrate = cli.command {
        sqlx::migrate!("./migrations").run(&pool).await?;
        println!("Migrations applied");
        return Ok(());
    }

    if let Commands::Health = cli.command {
        let (one,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await?;
        println!("Database connection OK ({})", one);
        return Ok(());
    }

    // Maintenance commands send no email
    let (email, _worker) = EmailQueue::start(Arc::new(LogMailer), 1, 1);
    let service = AuthService::new(
        TransactionManager::new(pool),
        config.auth.clone(),
        Arc::new(BcryptHasher::new(config.auth.bcrypt_cost)),
        Arc::new(email),
        Arc::new(NoopCacheInvalidator),
    );

    match cli.command {
        Commands::Cleanup(args) => cleanup(&service, &config, args).await?,
        Commands::RevokeUserTokens(args) => revoke_user_tokens(&service, args).await?,
        Commands::Attempts(args) => show_attempts(&service, args).await?,
        Commands::Migrate | Commands::Health | Commands::TestEmail(_) => {}
    }

    Ok(())
}

async fn cleanup(service: &AuthService, config: &AppConfig, args: CleanupArgs) -> anyhow::Result<()> {
    let retention_days = args
        .retention_days
        .unwrap_or(config.auth.login_attempt_retention_days);
    if !(1..=MAX_LOGIN_ATTEMPT_RETENTION_DAYS).contains(&retention_days) {
        anyhow::bail!(
            "--retention-days must be between 1 and {}",
            MAX_LOGIN_ATTEMPT_RETENTION_DAYS
        );
    }

    info!("Running cleanup with {} day login attempt retention", retention_days);
    let report = service.clean_expired_data(retention_days).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Cleanup complete, {} rows removed", report.total());
    println!("   Refresh tokens:      {}", report.refresh_tokens);
    println!("   Password resets:     {}", report.password_resets);
    println!("   Email verifications: {}", report.email_verifications);
    println!("   Expired sessions:    {}", report.expired_sessions);
    println!("   Inactive sessions:   {}", report.inactive_sessions);
    println!("   Login attempts:      {}", report.login_attempts);

    Ok(())
}

async fn revoke_user_tokens(service: &AuthService, args: RevokeArgs) -> anyhow::Result<()> {
    let summary = service.revoke_user_access(args.user_id).await?;

    println!(
        "User {}: revoked {} refresh tokens, removed {} sessions",
        args.user_id, summary.refresh_tokens, summary.sessions
    );

    Ok(())
}

async fn show_attempts(service: &AuthService, args: AttemptsArgs) -> anyhow::Result<()> {
    let attempts = match (&args.email, &args.ip) {
        (Some(email), _) => service.recent_login_attempts(email, args.limit).await?,
        (None, Some(ip)) => service.recent_login_attempts_by_ip(ip, args.limit).await?,
        (None, None) => anyhow::bail!("either --email or --ip is required"),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&attempts)?);
        return Ok(());
    }

    if attempts.is_empty() {
        println!("No login attempts found.");
        return Ok(());
    }

    println!(
        "{:<20} {:<30} {:<16} {:<8} {:<18}",
        "Time", "Email", "IP", "Result", "Reason"
    );
    println!("{}", "-".repeat(94));

    for attempt in attempts {
        println!(
            "{:<20} {:<30} {:<16} {:<8} {:<18}",
            attempt.attempted_at.format("%Y-%m-%d %H:%M:%S"),
            truncate_string(&attempt.email, 29),
            attempt.ip_address,
            if attempt.success { "ok" } else { "failed" },
            attempt.failure_reason.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

async fn send_test_email(config: &AppConfig, to: &str) -> anyhow::Result<()> {
    let Some(email_config) = &config.email else {
        anyhow::bail!("SMTP_HOST is not set; nothing to test");
    };

    let mailer = SmtpMailer::new(email_config)?;
    let (queue, worker) = EmailQueue::from_config(Arc::new(mailer), email_config);
    let handle = queue
        .enqueue(
            EmailKind::Welcome {
                name: "Test".to_string(),
            },
            to,
        )
        .await?;

    // Closing the queue lets the worker drain and exit
    drop(queue);
    worker.await?;

    println!("Email job {} processed; see the log for the delivery result", handle.id);
    Ok(())
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
