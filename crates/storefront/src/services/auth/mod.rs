//! Authentication service.
//!
//! Password login, self-registration, accounts opened during checkout, and
//! the forgot/new password flow. Session handling and cart migration on
//! login/logout live in the route handlers.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Deserialize;
use uuid::Uuid;

use emporium_core::checkout::AddressForm;
use emporium_core::{Email, UserId};

use crate::config::{AuthConfig, EmailConfig};
use crate::db::RepositoryError;
use crate::models::{CurrentUser, NewUser};
use crate::queue::{EmailJob, EmailQueue, EmailTemplate};
use crate::store::AccountStore;

const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_FIRST_NAME: usize = 45;
const MAX_LAST_NAME: usize = 255;
const MAX_PHONE: usize = 20;
const GENERATED_PASSWORD_LENGTH: usize = 12;

/// Login request body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// Forgot-password request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordForm {
    pub email: String,
}

/// New-password request body.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPasswordForm {
    pub token: Uuid,
    pub password: String,
}

/// Authentication service.
///
/// Holds configuration only; the store and queue are passed per call so the
/// request's connection is reused.
pub struct AuthService<'a> {
    settings: &'a AuthConfig,
    email: &'a EmailConfig,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(settings: &'a AuthConfig, email: &'a EmailConfig) -> Self {
        Self { settings, email }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Register a new customer and queue the welcome email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` with every violated field,
    /// `AuthError::AccountExists` if the email is already registered.
    pub async fn register<S, Q>(
        &self,
        store: &mut S,
        queue: &mut Q,
        form: &RegisterForm,
    ) -> Result<CurrentUser, AuthError>
    where
        S: AccountStore,
        Q: EmailQueue,
    {
        let email = self.validate_registration(form)?;
        let password_hash = hash_password(&form.password)?;

        let user = NewUser {
            email,
            first_name: form.first_name.trim().to_owned(),
            last_name: form.last_name.trim().to_owned(),
            phone: form.phone.trim().to_owned(),
            password_hash,
        };
        let id = create_account(store, &user).await?;
        tracing::info!(user = %id, "Customer registered");

        let name = format!("{} {}", user.first_name, user.last_name);
        let job = EmailJob::new(
            EmailTemplate::Register,
            format!("{}: welcome", self.email.shop_name),
            user.email.as_str(),
        )
        .with_field("name", name.clone());
        if let Err(e) = queue.enqueue(&job).await {
            tracing::warn!(error = %e, user = %id, "Welcome email not queued");
        }

        Ok(CurrentUser {
            id,
            email: user.email,
            name,
        })
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login<S: AccountStore>(
        &self,
        store: &mut S,
        form: &LoginForm,
    ) -> Result<CurrentUser, AuthError> {
        let email = Email::parse(&form.email).map_err(|_| AuthError::InvalidCredentials)?;
        let user = store
            .user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(&form.password, &user.password_hash)?;

        Ok(user.session_user())
    }

    /// Open an account for a checkout that asked for one.
    ///
    /// The password is generated and mailed to the customer.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AccountExists` if the email is already registered.
    pub async fn create_checkout_account<S, Q>(
        &self,
        store: &mut S,
        queue: &mut Q,
        email: Email,
        address: &AddressForm,
    ) -> Result<UserId, AuthError>
    where
        S: AccountStore,
        Q: EmailQueue,
    {
        let password = generate_password();
        let user = NewUser {
            email,
            first_name: address.first_name.trim().to_owned(),
            last_name: address.last_name.trim().to_owned(),
            phone: address.phone.trim().to_owned(),
            password_hash: hash_password(&password)?,
        };
        let id = create_account(store, &user).await?;
        tracing::info!(user = %id, "Account created at checkout");

        let job = EmailJob::new(
            EmailTemplate::AccountCreated,
            format!("{}: your new account", self.email.shop_name),
            user.email.as_str(),
        )
        .with_field("name", format!("{} {}", user.first_name, user.last_name))
        .with_field("email", user.email.as_str())
        .with_field("password", password);
        if let Err(e) = queue.enqueue(&job).await {
            tracing::warn!(error = %e, user = %id, "Account email not queued");
        }

        Ok(id)
    }

    // =========================================================================
    // Password Reset
    // =========================================================================

    /// Issue a reset token and mail it.
    ///
    /// Known and unknown emails take at least `forgot_password_delay`, so
    /// response time does not reveal which addresses have accounts.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Queue` when the email cannot be queued; the token
    /// is deleted again in that case.
    pub async fn forgot_password<S, Q>(
        &self,
        store: &mut S,
        queue: &mut Q,
        form: &ForgotPasswordForm,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError>
    where
        S: AccountStore,
        Q: EmailQueue,
    {
        let deadline = tokio::time::Instant::now() + self.settings.forgot_password_delay;

        let user = match Email::parse(&form.email) {
            Ok(email) => store.user_by_email(&email).await?,
            Err(_) => None,
        };

        if let Some(user) = user {
            store.delete_reset_tokens(user.id).await?;
            let token = Uuid::new_v4();
            store.insert_reset_token(user.id, token, now).await?;

            let minutes = self.settings.reset_token_ttl.as_secs() / 60;
            let job = EmailJob::new(
                EmailTemplate::ForgotPassword,
                format!("{}: reset your password", self.email.shop_name),
                user.email.as_str(),
            )
            .with_field("name", user.display_name())
            .with_field("token", token.to_string())
            .with_field("expiration_time_min", minutes)
            .with_field(
                "reset_url",
                format!("{}/auth/new-password?token={token}", self.email.base_url),
            );

            if let Err(e) = queue.enqueue(&job).await {
                tracing::error!(error = %e, user = %user.id, "Reset email not queued");
                if let Err(cleanup) = store.delete_reset_tokens(user.id).await {
                    tracing::error!(error = %cleanup, user = %user.id, "Reset token cleanup failed");
                }
                return Err(e.into());
            }
            tracing::info!(user = %user.id, "Password reset requested");
        }

        tokio::time::sleep_until(deadline).await;
        Ok(())
    }

    /// Set a new password with a live reset token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a rejected password and
    /// `AuthError::InvalidToken` for an unknown or expired token.
    pub async fn reset_password<S, Q>(
        &self,
        store: &mut S,
        queue: &mut Q,
        form: &NewPasswordForm,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError>
    where
        S: AccountStore,
        Q: EmailQueue,
    {
        let violations = self.password_violations(&form.password);
        if !violations.is_empty() {
            return Err(AuthError::Validation(violations));
        }

        let ttl = chrono::Duration::from_std(self.settings.reset_token_ttl)
            .unwrap_or(chrono::Duration::MAX);
        let token = store
            .reset_token(form.token)
            .await?
            .filter(|token| token.is_live(now, ttl))
            .ok_or(AuthError::InvalidToken)?;

        let hash = hash_password(&form.password)?;
        store.update_password(token.user_id, &hash).await?;
        store.delete_reset_tokens(token.user_id).await?;
        tracing::info!(user = %token.user_id, "Password reset");

        if let Some(user) = store.user_by_id(token.user_id).await? {
            let job = EmailJob::new(
                EmailTemplate::NewPassword,
                format!("{}: password changed", self.email.shop_name),
                user.email.as_str(),
            )
            .with_field("name", user.display_name());
            if let Err(e) = queue.enqueue(&job).await {
                tracing::warn!(error = %e, user = %user.id, "Password change email not queued");
            }
        }
        Ok(())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate_registration(&self, form: &RegisterForm) -> Result<Email, AuthError> {
        let email = Email::parse(&form.email);
        let mut violations = Vec::new();

        if email.is_err() {
            violations.push("invalid_email");
        }
        violations.extend(personal_data_violations(
            &form.first_name,
            &form.last_name,
            &form.phone,
        ));
        violations.extend(self.password_violations(&form.password));

        match email {
            Ok(email) if violations.is_empty() => Ok(email),
            _ => Err(AuthError::Validation(violations)),
        }
    }

    pub(crate) fn password_violations(&self, password: &str) -> Vec<&'static str> {
        let length = password.chars().count();
        if length < self.settings.password_min_length {
            vec!["password_too_short"]
        } else if length > MAX_PASSWORD_LENGTH {
            vec!["password_too_long"]
        } else {
            Vec::new()
        }
    }
}

fn within(value: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&value.trim().chars().count())
}

/// Name and phone rules shared by registration and the account panel.
pub(crate) fn personal_data_violations(
    first_name: &str,
    last_name: &str,
    phone: &str,
) -> Vec<&'static str> {
    let mut violations = Vec::new();
    if !within(first_name, 1, MAX_FIRST_NAME) {
        violations.push("invalid_first_name");
    }
    if !within(last_name, 1, MAX_LAST_NAME) {
        violations.push("invalid_last_name");
    }
    let phone = phone.trim();
    if !phone.chars().any(|c| c.is_ascii_digit()) || phone.chars().count() > MAX_PHONE {
        violations.push("invalid_phone");
    }
    violations
}

async fn create_account<S: AccountStore>(store: &mut S, user: &NewUser) -> Result<UserId, AuthError> {
    store.create_user(user).await.map_err(|e| match e {
        RepositoryError::Conflict(_) => AuthError::AccountExists,
        other => AuthError::Repository(other),
    })
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
pub(crate) fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
