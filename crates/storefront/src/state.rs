//! Application state shared across handlers.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use emporium_core::category::CategoryTree;

use crate::config::StorefrontConfig;
use crate::lock::RedisDedupLock;
use crate::queue::RedisEmailQueue;
use crate::services::shop::{CountCache, count_cache};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    redis: ConnectionManager,
    categories: Arc<CategoryTree>,
    product_counts: CountCache,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    /// * `redis` - Managed Redis connection (queue and dedup lock)
    /// * `categories` - Category snapshot loaded at startup
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
        redis: ConnectionManager,
        categories: CategoryTree,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                redis,
                categories: Arc::new(categories),
                product_counts: count_cache(),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// A handle on the shared Redis connection.
    #[must_use]
    pub fn redis(&self) -> ConnectionManager {
        self.inner.redis.clone()
    }

    /// Email queue producer for this request.
    #[must_use]
    pub fn email_queue(&self) -> RedisEmailQueue {
        RedisEmailQueue::new(self.redis(), self.inner.config.email.queue_name.clone())
    }

    /// Cart identity dedup lock.
    #[must_use]
    pub fn dedup_lock(&self) -> RedisDedupLock {
        RedisDedupLock::new(self.redis())
    }

    /// Immutable category tree.
    #[must_use]
    pub fn categories(&self) -> &CategoryTree {
        &self.inner.categories
    }

    /// Product count cache for listings.
    #[must_use]
    pub fn product_counts(&self) -> &CountCache {
        &self.inner.product_counts
    }
}
