//! Postgres storage.
//!
//! # Tables
//!
//! - `carts`, `cart_products` - one cart per identity (cookie uuid XOR user)
//! - `categories`, `products` - read-mostly catalog
//! - `draft_orders` - checkout snapshots, expire after `DRAFT_ORDER_TTL_SECS`
//! - `orders`, `order_status_history`, `order_invoices`, `order_statuses`
//! - `users`, `billing_data`, `shipping_addresses`, `password_reset_tokens`
//! - `payment_methods`
//! - `tower_sessions.session` - created by the session store
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p emporium-cli -- migrate
//! ```
//!
//! Queries are runtime-checked (`query_as::<_, Row>`), so the crates build
//! without a live database.

pub mod accounts;
pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod maintenance;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is invalid or corrupted.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Entity not found.
    #[error("not found")]
    NotFound,

    /// A unique constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique violations to [`RepositoryError::Conflict`] naming the
    /// constraint, pass everything else through.
    pub(crate) fn from_unique(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(db_err.constraint().unwrap_or("unique").to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// One pooled connection, held for the lifetime of a request.
///
/// Implements every store trait in [`crate::store`]. The connection goes
/// back to the pool when the store is dropped.
#[derive(Debug)]
pub struct PgStore {
    conn: PoolConnection<Postgres>,
}

impl PgStore {
    /// Check a connection out of the pool.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the pool times out.
    pub async fn acquire(pool: &PgPool) -> Result<Self, RepositoryError> {
        Ok(Self {
            conn: pool.acquire().await?,
        })
    }
}
