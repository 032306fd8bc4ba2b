//! Transactional email queue.
//!
//! The storefront never talks SMTP. It pushes a JSON envelope onto a Redis
//! list (`LPUSH`) and `emporium-cli mail-worker` pops it (`BRPOP`), renders
//! the template and sends it.
//!
//! # Envelope
//!
//! ```json
//! {"template": "new_order", "subject": "...", "email": "a@b.c",
//!  "bcc": "[\"shop@b.c\"]", "order_data": {...}}
//! ```
//!
//! `cc` and `bcc` are JSON arrays serialized to a string. Template-specific
//! payload fields (`name`, `token`, `expiration_time_min`, `order_data`,
//! `password`) sit next to the envelope fields.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which email the worker renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    /// Welcome mail after self-registration.
    Register,
    /// Account opened during checkout, carries the generated password.
    AccountCreated,
    ForgotPassword,
    /// Confirmation that the password was changed.
    NewPassword,
    NewOrder,
}

impl EmailTemplate {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::AccountCreated => "account_created",
            Self::ForgotPassword => "forgot_password",
            Self::NewPassword => "new_password",
            Self::NewOrder => "new_order",
        }
    }
}

/// One queued email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    pub template: EmailTemplate,
    pub subject: String,
    /// Recipient.
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl EmailJob {
    #[must_use]
    pub fn new(template: EmailTemplate, subject: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            template,
            subject: subject.into(),
            email: email.into(),
            cc: None,
            bcc: None,
            payload: Map::new(),
        }
    }

    /// Blind-copy the given addresses. An empty list leaves `bcc` unset.
    #[must_use]
    pub fn with_bcc(mut self, addresses: &[String]) -> Self {
        self.bcc = encode_address_list(addresses);
        self
    }

    /// Add a template payload field.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_owned(), value.into());
        self
    }

    #[must_use]
    pub fn cc_addresses(&self) -> Vec<String> {
        decode_address_list(self.cc.as_deref())
    }

    #[must_use]
    pub fn bcc_addresses(&self) -> Vec<String> {
        decode_address_list(self.bcc.as_deref())
    }

    /// A payload field as a string, if present.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

fn encode_address_list(addresses: &[String]) -> Option<String> {
    if addresses.is_empty() {
        return None;
    }
    serde_json::to_string(addresses).ok()
}

fn decode_address_list(list: Option<&str>) -> Vec<String> {
    list.and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

/// Errors talking to the queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("failed to encode email job: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Open a managed Redis connection, shared by the queue and the dedup lock.
///
/// # Errors
///
/// Returns `QueueError::Redis` if the URL is invalid or Redis is unreachable.
pub async fn connect(redis_url: &SecretString) -> Result<ConnectionManager, QueueError> {
    let client = redis::Client::open(redis_url.expose_secret())?;
    Ok(client.get_connection_manager().await?)
}

/// Producer side of the email queue.
pub trait EmailQueue {
    async fn enqueue(&mut self, job: &EmailJob) -> Result<(), QueueError>;
}

/// Redis list backed queue.
#[derive(Clone)]
pub struct RedisEmailQueue {
    conn: ConnectionManager,
    queue: String,
}

impl RedisEmailQueue {
    #[must_use]
    pub const fn new(conn: ConnectionManager, queue: String) -> Self {
        Self { conn, queue }
    }

    /// Block up to `timeout` for the next raw envelope.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Redis` if the pop fails.
    pub async fn pop(&mut self, timeout: Duration) -> Result<Option<String>, QueueError> {
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.queue)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut self.conn)
            .await?;
        Ok(reply.map(|(_, payload)| payload))
    }
}

impl EmailQueue for RedisEmailQueue {
    async fn enqueue(&mut self, job: &EmailJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let _: i64 = self.conn.lpush(&self.queue, payload).await?;
        tracing::debug!(template = job.template.as_str(), queue = %self.queue, "Email job queued");
        Ok(())
    }
}

/// Queue that records jobs, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingQueue {
    pub jobs: Vec<EmailJob>,
    /// Every enqueue fails while set.
    pub fail: bool,
}

#[cfg(test)]
impl EmailQueue for RecordingQueue {
    async fn enqueue(&mut self, job: &EmailJob) -> Result<(), QueueError> {
        if self.fail {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "queue unavailable",
            ))));
        }
        self.jobs.push(job.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let job = EmailJob::new(EmailTemplate::ForgotPassword, "Reset", "jan@example.com")
            .with_bcc(&["shop@example.com".to_owned()])
            .with_field("token", "abc")
            .with_field("expiration_time_min", 60);

        let value: Value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["template"], "forgot_password");
        assert_eq!(value["email"], "jan@example.com");
        assert_eq!(value["bcc"], "[\"shop@example.com\"]");
        assert_eq!(value["token"], "abc");
        assert_eq!(value["expiration_time_min"], 60);
        assert!(value.get("cc").is_none());
    }

    #[test]
    fn test_decode_worker_side() {
        let raw = r#"{"template":"register","subject":"Hi","email":"a@b.pl","bcc":"[\"x@y.pl\",\"z@y.pl\"]","name":"Jan"}"#;
        let job: EmailJob = serde_json::from_str(raw).unwrap();
        assert_eq!(job.template, EmailTemplate::Register);
        assert_eq!(job.bcc_addresses(), vec!["x@y.pl", "z@y.pl"]);
        assert!(job.cc_addresses().is_empty());
        assert_eq!(job.field_str("name"), Some("Jan"));
    }

    #[test]
    fn test_unknown_template_is_rejected() {
        let raw = r#"{"template":"newsletter","subject":"Hi","email":"a@b.pl"}"#;
        assert!(serde_json::from_str::<EmailJob>(raw).is_err());
    }

    #[test]
    fn test_empty_bcc_is_omitted() {
        let job = EmailJob::new(EmailTemplate::NewOrder, "Order", "a@b.pl").with_bcc(&[]);
        assert!(job.bcc.is_none());
    }
}
