//! Email queue consumer.
//!
//! Pops envelopes pushed by the storefront (`BRPOP`), renders them and
//! sends them over SMTP. A job that cannot be decoded, rendered or sent is
//! logged and dropped; the queue is never blocked by one bad message.
//!
//! # Environment Variables
//!
//! - `REDIS_URL`, `EMAIL_QUEUE_NAME` - queue location
//! - `SMTP_HOST`, `SMTP_PORT` (587), `SMTP_USERNAME`, `SMTP_PASSWORD`
//! - `EMAIL_FROM` - sender address
//! - `SHOP_NAME` - used in greetings
//! - `MAIL_WORKER_POP_TIMEOUT_SECS` (30)

use std::time::Duration;

use secrecy::SecretString;

use emporium_storefront::queue::{self, EmailJob, RedisEmailQueue};

use super::{CommandError, env_or, redis_url};
use crate::email::{self, Mailer, SmtpConfig};

/// Pause after a failed pop before trying again.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_name: String,
    pub shop_name: String,
    pub pop_timeout: Duration,
    pub smtp: SmtpConfig,
}

impl WorkerConfig {
    /// # Errors
    ///
    /// Returns `CommandError` when a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, CommandError> {
        let required = |key: &'static str| {
            std::env::var(key).map_err(|_| CommandError::MissingEnvVar(key))
        };

        Ok(Self {
            queue_name: env_or("EMAIL_QUEUE_NAME", "emails".to_owned())?,
            shop_name: env_or("SHOP_NAME", "Emporium".to_owned())?,
            pop_timeout: Duration::from_secs(env_or("MAIL_WORKER_POP_TIMEOUT_SECS", 30)?),
            smtp: SmtpConfig {
                host: required("SMTP_HOST")?,
                port: env_or("SMTP_PORT", 587)?,
                username: required("SMTP_USERNAME")?,
                password: SecretString::from(required("SMTP_PASSWORD")?),
                from_address: required("EMAIL_FROM")?,
            },
        })
    }
}

/// Consume the queue until Ctrl+C.
///
/// # Errors
///
/// Returns `CommandError` if the worker cannot start.
pub async fn run(config: WorkerConfig) -> Result<(), CommandError> {
    let mailer = Mailer::new(&config.smtp)?;
    let mut queue = RedisEmailQueue::new(
        queue::connect(&redis_url()).await?,
        config.queue_name.clone(),
    );
    tracing::info!(queue = %config.queue_name, "Mail worker started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            popped = queue.pop(config.pop_timeout) => match popped {
                Ok(Some(raw)) => {
                    handle(&mailer, &config.shop_name, &raw).await;
                }
                Ok(None) => tracing::info!(queue = %config.queue_name, "Mail worker heartbeat"),
                Err(e) => {
                    tracing::error!(error = %e, "Email queue pop failed");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            },
        }
    }

    tracing::info!("Mail worker stopped");
    Ok(())
}

async fn handle(mailer: &Mailer, shop: &str, raw: &str) {
    let Some((job, body)) = prepare(raw, shop) else {
        return;
    };

    if let Err(e) = mailer.send(&job, body).await {
        tracing::error!(
            error = %e,
            template = job.template.as_str(),
            to = %job.email,
            "Email not sent, dropping job"
        );
    }
}

/// Decode and render an envelope, logging why it was rejected.
fn prepare(raw: &str, shop: &str) -> Option<(EmailJob, email::RenderedEmail)> {
    let job: EmailJob = match serde_json::from_str(raw) {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable email job dropped");
            return None;
        }
    };

    match email::render(&job, shop) {
        Ok(body) => Some((job, body)),
        Err(e) => {
            tracing::warn!(error = %e, template = job.template.as_str(), "Email job dropped");
            None
        }
    }
}
