//! Email rendering and SMTP delivery for the mail worker.
//!
//! Each queued [`EmailJob`] names a template; its payload fields fill an
//! Askama HTML template and a plain text twin, sent as one multipart
//! message via lettre.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use emporium_storefront::queue::{EmailJob, EmailTemplate};

/// SMTP settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// The job lacks a field its template needs.
    #[error("{template:?} email is missing `{field}`")]
    MissingField {
        template: EmailTemplate,
        field: &'static str,
    },

    /// `order_data` does not have the shape of a placed order.
    #[error("Malformed order data: {0}")]
    OrderData(#[from] serde_json::Error),
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Template)]
#[template(path = "email/register.html")]
struct RegisterHtml<'a> {
    name: &'a str,
    shop: &'a str,
}

#[derive(Template)]
#[template(path = "email/register.txt")]
struct RegisterText<'a> {
    name: &'a str,
    shop: &'a str,
}

#[derive(Template)]
#[template(path = "email/account_created.html")]
struct AccountCreatedHtml<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Template)]
#[template(path = "email/account_created.txt")]
struct AccountCreatedText<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Template)]
#[template(path = "email/forgot_password.html")]
struct ForgotPasswordHtml<'a> {
    name: &'a str,
    reset_url: &'a str,
    expiration_time_min: u64,
}

#[derive(Template)]
#[template(path = "email/forgot_password.txt")]
struct ForgotPasswordText<'a> {
    name: &'a str,
    reset_url: &'a str,
    expiration_time_min: u64,
}

#[derive(Template)]
#[template(path = "email/new_password.html")]
struct NewPasswordHtml<'a> {
    name: &'a str,
}

#[derive(Template)]
#[template(path = "email/new_password.txt")]
struct NewPasswordText<'a> {
    name: &'a str,
}

#[derive(Template)]
#[template(path = "email/new_order.html")]
struct NewOrderHtml<'a> {
    name: &'a str,
    order: &'a OrderData,
}

#[derive(Template)]
#[template(path = "email/new_order.txt")]
struct NewOrderText<'a> {
    name: &'a str,
    order: &'a OrderData,
}

/// The part of `order_data` the confirmation shows. Money arrives as
/// decimal strings and is printed as is.
#[derive(Debug, Deserialize)]
struct OrderData {
    order_number: String,
    lines: Vec<OrderLine>,
    shipping_method: OrderShipping,
    payment_method: String,
    total: String,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Deserialize)]
struct OrderLine {
    name: String,
    quantity: i32,
    price_net: String,
    vat_rate: String,
}

#[derive(Debug, Deserialize)]
struct OrderShipping {
    name: String,
    cost: String,
    currency: String,
}

/// A rendered message body pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub text: String,
    pub html: String,
}

fn field<'a>(job: &'a EmailJob, field: &'static str) -> Result<&'a str, EmailError> {
    job.field_str(field).ok_or(EmailError::MissingField {
        template: job.template,
        field,
    })
}

/// Render both bodies of a job.
///
/// `shop` is the sender name used in greetings.
///
/// # Errors
///
/// `MissingField` when the payload lacks a template field, `OrderData` when
/// `order_data` is malformed, `Template` if rendering fails.
pub fn render(job: &EmailJob, shop: &str) -> Result<RenderedEmail, EmailError> {
    let name = job.field_str("name").unwrap_or_default();

    let (text, html) = match job.template {
        EmailTemplate::Register => (
            RegisterText { name, shop }.render()?,
            RegisterHtml { name, shop }.render()?,
        ),
        EmailTemplate::AccountCreated => {
            let email = field(job, "email")?;
            let password = field(job, "password")?;
            (
                AccountCreatedText {
                    name,
                    email,
                    password,
                }
                .render()?,
                AccountCreatedHtml {
                    name,
                    email,
                    password,
                }
                .render()?,
            )
        }
        EmailTemplate::ForgotPassword => {
            let reset_url = field(job, "reset_url")?;
            let expiration_time_min = job
                .payload
                .get("expiration_time_min")
                .and_then(serde_json::Value::as_u64)
                .ok_or(EmailError::MissingField {
                    template: job.template,
                    field: "expiration_time_min",
                })?;
            (
                ForgotPasswordText {
                    name,
                    reset_url,
                    expiration_time_min,
                }
                .render()?,
                ForgotPasswordHtml {
                    name,
                    reset_url,
                    expiration_time_min,
                }
                .render()?,
            )
        }
        EmailTemplate::NewPassword => (
            NewPasswordText { name }.render()?,
            NewPasswordHtml { name }.render()?,
        ),
        EmailTemplate::NewOrder => {
            let raw = job
                .payload
                .get("order_data")
                .cloned()
                .ok_or(EmailError::MissingField {
                    template: job.template,
                    field: "order_data",
                })?;
            let order: OrderData = serde_json::from_value(raw)?;
            (
                NewOrderText {
                    name,
                    order: &order,
                }
                .render()?,
                NewOrderHtml {
                    name,
                    order: &order,
                }
                .render()?,
            )
        }
    };

    Ok(RenderedEmail { text, html })
}

// =============================================================================
// Delivery
// =============================================================================

/// SMTP sender.
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl Mailer {
    /// Create a mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be configured.
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a rendered job to its recipient, copies included.
    ///
    /// # Errors
    ///
    /// Returns error if an address is invalid or delivery fails.
    pub async fn send(&self, job: &EmailJob, body: RenderedEmail) -> Result<(), EmailError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.from_address)?)
            .to(parse_mailbox(&job.email)?)
            .subject(job.subject.as_str());
        for cc in job.cc_addresses() {
            builder = builder.cc(parse_mailbox(&cc)?);
        }
        for bcc in job.bcc_addresses() {
            builder = builder.bcc(parse_mailbox(&bcc)?);
        }

        let email = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(body.text),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(body.html),
                ),
        )?;

        self.transport.send(email).await?;

        tracing::info!(
            to = %job.email,
            template = job.template.as_str(),
            subject = %job.subject,
            "Email sent successfully"
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn order_job() -> EmailJob {
        let subject = "Emporium: order 20260101-ABCD";
        EmailJob::new(EmailTemplate::NewOrder, subject, "jan@example.com")
            .with_field("name", "Jan Kowalski")
            .with_field(
                "order_data",
                json!({
                    "uuid": "5b2a0c3e-7f1d-4a8e-9c1b-0d2e3f4a5b6c",
                    "order_number": "20260101-ABCD",
                    "status": "new",
                    "email": "jan@example.com",
                    "lines": [
                        {"product_id": 3, "name": "Tea pot", "quantity": 1,
                         "price_net": "50", "vat_rate": "23"}
                    ],
                    "shipping_method": {"id": "5b2a0c3e-7f1d-4a8e-9c1b-0d2e3f4a5b6d",
                                        "cost": "100", "currency": "PLN", "name": "Courier"},
                    "payment_method": "Bank transfer",
                    "total": "161.50",
                    "notes": "",
                }),
            )
    }

    #[test]
    fn test_order_confirmation_lists_lines_and_total() {
        let body = render(&order_job(), "Emporium").unwrap();

        for part in [&body.text, &body.html] {
            assert!(part.contains("20260101-ABCD"));
            assert!(part.contains("Tea pot"));
            assert!(part.contains("161.50"));
            assert!(part.contains("Courier"));
        }
    }

    #[test]
    fn test_reset_link_is_rendered() {
        let job = EmailJob::new(EmailTemplate::ForgotPassword, "Reset", "jan@example.com")
            .with_field("name", "Jan")
            .with_field("token", "t")
            .with_field("expiration_time_min", 60)
            .with_field("reset_url", "https://shop.example/auth/new-password?token=t");

        let body = render(&job, "Emporium").unwrap();

        assert!(body.text.contains("https://shop.example/auth/new-password?token=t"));
        assert!(body.text.contains("60"));
    }

    #[test]
    fn test_html_escapes_payload() {
        let job = EmailJob::new(EmailTemplate::Register, "Welcome", "jan@example.com")
            .with_field("name", "<b>Jan</b>");

        let body = render(&job, "Emporium").unwrap();

        assert!(!body.html.contains("<b>Jan</b>"));
        assert!(body.text.contains("<b>Jan</b>"));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let job = EmailJob::new(EmailTemplate::AccountCreated, "Account", "jan@example.com")
            .with_field("email", "jan@example.com");

        let err = render(&job, "Emporium").unwrap_err();

        assert!(matches!(err, EmailError::MissingField { field: "password", .. }));
    }

    #[test]
    fn test_malformed_order_data() {
        let job = EmailJob::new(EmailTemplate::NewOrder, "Order", "jan@example.com")
            .with_field("order_data", json!({"order_number": 7}));

        assert!(matches!(
            render(&job, "Emporium").unwrap_err(),
            EmailError::OrderData(_)
        ));
    }
}
