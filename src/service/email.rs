//! Email Service
//!
//! Outbound email is fire-and-forget from the lifecycle operations: they call
//! [`EmailDispatcher::enqueue`] and move on. [`EmailQueue`] is the production
//! dispatcher, a bounded channel drained by a background worker that hands
//! each job to a [`Mailer`] with retries. [`SmtpMailer`] renders the embedded
//! `tera` templates and sends through `lettre`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use lettre::{
    message::{header, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EmailConfig;

/// Email kinds and their payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailKind {
    Verification { token: String },
    PasswordReset { token: String },
    Welcome { name: String },
}

impl EmailKind {
    pub fn template_name(&self) -> &'static str {
        match self {
            EmailKind::Verification { .. } => "verification",
            EmailKind::PasswordReset { .. } => "password_reset",
            EmailKind::Welcome { .. } => "welcome",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            EmailKind::Verification { .. } => "Verify Your Email Address",
            EmailKind::PasswordReset { .. } => "Reset Your Password",
            EmailKind::Welcome { .. } => "Welcome! Your account is now active",
        }
    }
}

/// One queued email
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub id: Uuid,
    pub kind: EmailKind,
    pub recipient: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Receipt returned by [`EmailDispatcher::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: Uuid,
}

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email queue is full")]
    QueueFull,

    #[error("Email queue is closed")]
    QueueClosed,

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to send email: {0}")]
    Transport(String),
}

/// Enqueue contract consumed by the lifecycle operations
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn enqueue(&self, kind: EmailKind, recipient: &str) -> Result<JobHandle, EmailError>;
}

/// Delivers one job; called by the queue worker
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, job: &EmailJob) -> Result<(), EmailError>;
}

/// Mailer that only logs, for deployments without SMTP
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, job: &EmailJob) -> Result<(), EmailError> {
        info!(
            "Email {} ({}) to {} not sent: no SMTP transport configured",
            job.id,
            job.kind.template_name(),
            job.recipient
        );
        Ok(())
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Bounded in-process email queue
#[derive(Clone)]
pub struct EmailQueue {
    sender: mpsc::Sender<EmailJob>,
}

impl EmailQueue {
    /// Spawn the delivery worker and return the queue feeding it
    ///
    /// The worker exits once every `EmailQueue` clone has been dropped and the
    /// remaining jobs are drained.
    pub fn start(
        mailer: Arc<dyn Mailer>,
        capacity: usize,
        max_attempts: u32,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, mailer, max_attempts.max(1)));
        (Self { sender }, worker)
    }

    pub fn from_config(mailer: Arc<dyn Mailer>, config: &EmailConfig) -> (Self, JoinHandle<()>) {
        Self::start(mailer, config.queue_capacity, config.max_delivery_attempts)
    }
}

#[async_trait]
impl EmailDispatcher for EmailQueue {
    async fn enqueue(&self, kind: EmailKind, recipient: &str) -> Result<JobHandle, EmailError> {
        let job = EmailJob {
            id: Uuid::new_v4(),
            kind,
            recipient: recipient.to_string(),
            enqueued_at: Utc::now(),
        };
        let handle = JobHandle { id: job.id };

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EmailError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EmailError::QueueClosed,
        })?;

        debug!("Enqueued email job {}", handle.id);
        Ok(handle)
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<EmailJob>,
    mailer: Arc<dyn Mailer>,
    max_attempts: u32,
) {
    while let Some(job) = receiver.recv().await {
        deliver_with_retry(mailer.as_ref(), &job, max_attempts).await;
    }
    debug!("Email worker stopped");
}

async fn deliver_with_retry(mailer: &dyn Mailer, job: &EmailJob, max_attempts: u32) -> bool {
    for attempt in 1..=max_attempts {
        match mailer.deliver(job).await {
            Ok(()) => {
                info!("Email job {} delivered to {}", job.id, job.recipient);
                return true;
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Email job {} attempt {}/{} failed: {}",
                    job.id, attempt, max_attempts, e
                );
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
            Err(e) => {
                error!(
                    "Email job {} dropped after {} attempts: {}",
                    job.id, max_attempts, e
                );
            }
        }
    }
    false
}

// ============================================================================
// Templates and SMTP delivery
// ============================================================================

/// Rendered subject and bodies of one email
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Embedded `tera` templates for every [`EmailKind`]
pub struct EmailTemplates {
    tera: Tera,
    app_name: String,
    app_base_url: String,
}

impl EmailTemplates {
    pub fn new(app_name: &str, app_base_url: &str) -> Result<Self, EmailError> {
        let mut tera = Tera::default();
        let templates = [
            ("verification.html", VERIFICATION_HTML),
            ("verification.txt", VERIFICATION_TEXT),
            ("password_reset.html", PASSWORD_RESET_HTML),
            ("password_reset.txt", PASSWORD_RESET_TEXT),
            ("welcome.html", WELCOME_HTML),
            ("welcome.txt", WELCOME_TEXT),
        ];
        for (name, body) in templates {
            tera.add_raw_template(name, body)
                .map_err(|e| EmailError::Template(format!("{}: {}", name, e)))?;
        }

        Ok(Self {
            tera,
            app_name: app_name.to_string(),
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn render(&self, kind: &EmailKind) -> Result<RenderedEmail, EmailError> {
        let mut context = Context::new();
        context.insert("app_name", &self.app_name);
        context.insert("current_year", &Utc::now().year());

        match kind {
            EmailKind::Verification { token } => {
                context.insert(
                    "link",
                    &format!("{}/verify-email?token={}", self.app_base_url, token),
                );
            }
            EmailKind::PasswordReset { token } => {
                context.insert(
                    "link",
                    &format!("{}/reset-password?token={}", self.app_base_url, token),
                );
            }
            EmailKind::Welcome { name } => {
                context.insert("user_name", name);
            }
        }

        let base = kind.template_name();
        let html = self
            .tera
            .render(&format!("{}.html", base), &context)
            .map_err(|e| EmailError::Template(e.to_string()))?;
        let text = self
            .tera
            .render(&format!("{}.txt", base), &context)
            .map_err(|e| EmailError::Template(e.to_string()))?;

        Ok(RenderedEmail {
            subject: kind.subject().to_string(),
            html,
            text,
        })
    }
}

/// SMTP mailer
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    templates: EmailTemplates,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| EmailError::Transport(format!("Failed to configure SMTP relay: {}", e)))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        Ok(Self {
            transport,
            templates: EmailTemplates::new(&config.from_name, &config.app_base_url)?,
            from: format!("{} <{}>", config.from_name, config.from_email),
        })
    }

    fn build_message(&self, job: &EmailJob) -> Result<Message, EmailError> {
        let rendered = self.templates.render(&job.kind)?;

        Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| EmailError::Address(format!("Invalid from address: {}", e)))?,
            )
            .to(job
                .recipient
                .parse()
                .map_err(|e| EmailError::Address(format!("Invalid recipient email: {}", e)))?)
            .subject(rendered.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(rendered.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(rendered.html),
                    ),
            )
            .map_err(|e| EmailError::Transport(format!("Failed to build email message: {}", e)))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, job: &EmailJob) -> Result<(), EmailError> {
        let message = self.build_message(job)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| EmailError::Transport(e.to_string()))
    }
}

const VERIFICATION_HTML: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h1>Verify Your Email Address</h1>
    <p>Thank you for signing up! Please confirm your email address to activate your account.</p>
    <p><a href="{{ link }}" style="display: inline-block; padding: 12px 24px; background: #007bff; color: white; text-decoration: none; border-radius: 4px;">Verify email</a></p>
    <p>If you didn't create an account, you can safely ignore this email.</p>
    <p>&copy; {{ current_year }} {{ app_name }}</p>
</body>
</html>"#;

const VERIFICATION_TEXT: &str = r#"Verify Your Email Address

Thank you for signing up! Please confirm your email address to activate your account:

{{ link }}

If you didn't create an account, you can safely ignore this email.

(c) {{ current_year }} {{ app_name }}"#;

const PASSWORD_RESET_HTML: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h1>Reset Your Password</h1>
    <p>We received a request to reset your password.</p>
    <p><a href="{{ link }}" style="display: inline-block; padding: 12px 24px; background: #007bff; color: white; text-decoration: none; border-radius: 4px;">Choose a new password</a></p>
    <p>If you didn't request this, you can safely ignore this email.</p>
    <p>&copy; {{ current_year }} {{ app_name }}</p>
</body>
</html>"#;

const PASSWORD_RESET_TEXT: &str = r#"Reset Your Password

We received a request to reset your password. Choose a new one here:

{{ link }}

If you didn't request this, you can safely ignore this email.

(c) {{ current_year }} {{ app_name }}"#;

const WELCOME_HTML: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h1>Welcome to {{ app_name }}!</h1>
    <p>Hello {{ user_name }},</p>
    <p>Your email has been verified and your account is now active.</p>
    <p>Best regards,<br>The {{ app_name }} Team</p>
</body>
</html>"#;

const WELCOME_TEXT: &str = r#"Welcome to {{ app_name }}!

Hello {{ user_name }},

Your email has been verified and your account is now active.

Best regards,
The {{ app_name }} Team"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails the first `failures` deliveries, then records the rest
    struct FlakyMailer {
        failures: u32,
        calls: AtomicU32,
        delivered: Mutex<Vec<Uuid>>,
    }

    impl FlakyMailer {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn deliver(&self, job: &EmailJob) -> Result<(), EmailError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(EmailError::Transport("connection refused".to_string()));
            }
            self.delivered.lock().unwrap().push(job.id);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_delivers_with_retry() {
        let mailer = Arc::new(FlakyMailer::new(2));
        let (queue, worker) = EmailQueue::start(mailer.clone(), 8, 3);

        let handle = queue
            .enqueue(
                EmailKind::Welcome {
                    name: "Ada".to_string(),
                },
                "ada@example.com",
            )
            .await
            .unwrap();

        drop(queue);
        worker.await.unwrap();

        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(*mailer.delivered.lock().unwrap(), vec![handle.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_dropped_after_max_attempts() {
        let mailer = Arc::new(FlakyMailer::new(10));
        let (queue, worker) = EmailQueue::start(mailer.clone(), 8, 3);

        queue
            .enqueue(
                EmailKind::Verification {
                    token: "abc".to_string(),
                },
                "b@example.com",
            )
            .await
            .unwrap();

        drop(queue);
        worker.await.unwrap();

        assert_eq!(mailer.calls.load(Ordering::SeqCst), 3);
        assert!(mailer.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_stops() {
        let (queue, worker) = EmailQueue::start(Arc::new(LogMailer), 1, 1);
        worker.abort();
        let _ = worker.await;

        let result = queue
            .enqueue(
                EmailKind::PasswordReset {
                    token: "t".to_string(),
                },
                "c@example.com",
            )
            .await;

        assert!(matches!(result, Err(EmailError::QueueClosed)));
    }

    #[test]
    fn test_templates_render_links() {
        let templates = EmailTemplates::new("Auth Core", "https://app.example.com/").unwrap();

        let rendered = templates
            .render(&EmailKind::Verification {
                token: "feedface".to_string(),
            })
            .unwrap();
        assert_eq!(rendered.subject, "Verify Your Email Address");
        assert!(rendered
            .text
            .contains("https://app.example.com/verify-email?token=feedface"));

        let rendered = templates
            .render(&EmailKind::PasswordReset {
                token: "c0ffee".to_string(),
            })
            .unwrap();
        assert!(rendered.html.contains("reset-password?token=c0ffee"));

        let rendered = templates
            .render(&EmailKind::Welcome {
                name: "Grace".to_string(),
            })
            .unwrap();
        assert!(rendered.text.contains("Hello Grace"));
    }
}
