//! Subcommand implementations.

pub mod mail_worker;
pub mod migrate;
pub mod reconcile;
pub mod sweep;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use emporium_storefront::config::ConfigError;
use emporium_storefront::db::{self, RepositoryError};
use emporium_storefront::queue::QueueError;

/// Errors a command can end with.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(&'static str, String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
fn database_url() -> Result<SecretString, CommandError> {
    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("DATABASE_URL"))
}

fn redis_url() -> SecretString {
    SecretString::from(
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned()),
    )
}

/// Parse an optional environment variable.
fn env_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, CommandError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| CommandError::InvalidEnvVar(key, e.to_string())),
        Err(_) => Ok(default),
    }
}

async fn connect() -> Result<PgPool, CommandError> {
    tracing::info!("Connecting to storefront database...");
    Ok(db::create_pool(&database_url()?).await?)
}
