//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `REDIS_URL` - Queue and lock backend (default: `redis://127.0.0.1:6379`)
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SHOP_NAME` - Used in email subjects (default: Emporium)
//! - `CART_COOKIE_NAME` / `PREFERENCES_COOKIE_NAME` - Cookie names
//! - `SHOP_PAGE_SIZES`, `SHOP_SORT_OPTIONS`, `SHOP_AVAILABILITY_OPTIONS` -
//!   Comma separated enabled listing options
//! - `SHOP_DEFAULT_PAGE_SIZE`, `SHOP_DEFAULT_SORT`, `SHOP_DEFAULT_AVAILABILITY`
//! - `CART_LOCK_TTL_SECS` (3), `CART_TTL_SECS` (30 days)
//! - `ORDER_NUMBER_LETTERS` (4), `ORDER_NEW_STATUS_ID` (1),
//!   `DRAFT_ORDER_TTL_SECS` (24 h)
//! - `PASSWORD_MIN_LENGTH` (8), `PASSWORD_RESET_TTL_SECS` (1 h),
//!   `FORGOT_PASSWORD_DELAY_MS` (400)
//! - `EMAIL_QUEUE_NAME` (`emails`), `EMAIL_BCC` - Comma separated shop copies

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use emporium_core::OrderStatusId;
use emporium_core::checkout::order_number::DEFAULT_LETTERS;
use emporium_core::preferences::{
    Availability, PreferenceOptions, Preferences, SortOption,
};

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Redis URL for the email queue and the identity lock
    pub redis_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub cookies: CookieConfig,
    pub shop: ShopConfig,
    pub cart: CartConfig,
    pub checkout: CheckoutConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,
}

/// Names of the long-lived cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    pub cart: String,
    pub preferences: String,
    /// Mark cookies `Secure` (set when the base URL is https).
    pub secure: bool,
}

/// Product listing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopConfig {
    pub preferences: PreferenceOptions,
}

/// Cart lifetime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartConfig {
    /// Expiry of the identity dedup lock.
    pub lock_ttl: Duration,
    /// Anonymous carts untouched for longer are swept.
    pub ttl: Duration,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(3),
            ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Checkout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Random letters appended to order numbers.
    pub order_number_letters: usize,
    /// Status given to freshly placed orders.
    pub new_status_id: OrderStatusId,
    pub draft_ttl: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            order_number_letters: DEFAULT_LETTERS,
            new_status_id: OrderStatusId::new(1),
            draft_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Account and password settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
    pub password_min_length: usize,
    pub reset_token_ttl: Duration,
    /// Minimum response time of forgot-password, whether or not the email
    /// exists.
    pub forgot_password_delay: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_min_length: 8,
            reset_token_ttl: Duration::from_secs(60 * 60),
            forgot_password_delay: Duration::from_millis(400),
        }
    }
}

/// Email queue settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub queue_name: String,
    /// Shop copies of customer mail.
    pub bcc: Vec<String>,
    pub shop_name: String,
    /// Used to build links in emails.
    pub base_url: String,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let redis_url =
            SecretString::from(get_env_or_default("REDIS_URL", "redis://127.0.0.1:6379"));
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        let session_secret = get_validated_secret("SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SESSION_SECRET")?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        let cookies = CookieConfig {
            cart: get_env_or_default("CART_COOKIE_NAME", "emporium_cart"),
            preferences: get_env_or_default("PREFERENCES_COOKIE_NAME", "emporium_prefs"),
            secure: base_url.starts_with("https://"),
        };
        let email = EmailConfig::from_env(base_url.clone())?;

        Ok(Self {
            database_url,
            redis_url,
            host,
            port,
            base_url,
            session_secret,
            sentry_dsn,
            cookies,
            shop: ShopConfig::from_env()?,
            cart: CartConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            email,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl ShopConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Preferences {
            page_size: parse_env("SHOP_DEFAULT_PAGE_SIZE", "12")?,
            sort: parse_env("SHOP_DEFAULT_SORT", SortOption::Newest.as_str())?,
            availability: parse_env("SHOP_DEFAULT_AVAILABILITY", Availability::All.as_str())?,
            price_range: None,
        };
        let preferences = PreferenceOptions::new(
            parse_list("SHOP_PAGE_SIZES", "12,24,48")?,
            parse_list("SHOP_SORT_OPTIONS", "newest,price_asc,price_desc,name_asc,name_desc")?,
            parse_list("SHOP_AVAILABILITY_OPTIONS", "all,in_stock")?,
            defaults,
        )
        .map_err(|e| ConfigError::InvalidEnvVar("SHOP_*".to_string(), e.to_string()))?;
        Ok(Self { preferences })
    }
}

impl CartConfig {
    /// Read the cart settings alone; also used by the expiry sweep.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            lock_ttl: secs_env("CART_LOCK_TTL_SECS", defaults.lock_ttl)?,
            ttl: secs_env("CART_TTL_SECS", defaults.ttl)?,
        })
    }
}

impl CheckoutConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            order_number_letters: parse_env_or(
                "ORDER_NUMBER_LETTERS",
                defaults.order_number_letters,
            )?,
            new_status_id: parse_env_or("ORDER_NEW_STATUS_ID", defaults.new_status_id)?,
            draft_ttl: secs_env("DRAFT_ORDER_TTL_SECS", defaults.draft_ttl)?,
        })
    }
}

impl AuthConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let delay_ms =
            u64::try_from(defaults.forgot_password_delay.as_millis()).unwrap_or(u64::MAX);
        Ok(Self {
            password_min_length: parse_env_or(
                "PASSWORD_MIN_LENGTH",
                defaults.password_min_length,
            )?,
            reset_token_ttl: secs_env("PASSWORD_RESET_TTL_SECS", defaults.reset_token_ttl)?,
            forgot_password_delay: Duration::from_millis(parse_env_or(
                "FORGOT_PASSWORD_DELAY_MS",
                delay_ms,
            )?),
        })
    }
}

impl EmailConfig {
    /// Queue and sender settings. `base_url` prefixes links in emails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for an unparseable `EMAIL_BCC`.
    pub fn from_env(base_url: String) -> Result<Self, ConfigError> {
        Ok(Self {
            queue_name: get_env_or_default("EMAIL_QUEUE_NAME", "emails"),
            bcc: parse_list::<String>("EMAIL_BCC", "")?,
            shop_name: get_env_or_default("SHOP_NAME", "Emporium"),
            base_url,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to a textual default.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

/// Whole seconds from an environment variable.
fn secs_env(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    parse_env_or(key, default.as_secs()).map(Duration::from_secs)
}

/// Parse an environment variable, falling back to a typed default.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

/// Parse a comma separated environment variable.
fn parse_list<T>(key: &str, default: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_list_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_list_value<T>(key: &str, raw: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_value(key, item))
        .collect()
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
