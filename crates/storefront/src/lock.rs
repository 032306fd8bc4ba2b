//! Best-effort deduplication lock for cart identity resolution.
//!
//! Two requests from one browser arriving together would each see "no
//! cart" and mint a cart. The first request to `SET key 1 NX EX ttl` wins
//! and resolves identity; the others skip it. The lock is never released
//! early; it expires.
//!
//! This only narrows the race. Uniqueness of carts is enforced by the
//! `carts` table constraints.

use std::time::Duration;

use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};

const KEY_PREFIX: &str = "cart-identity";

/// Errors from the lock backend.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Set-if-absent lock with expiry.
pub trait DedupLock {
    /// `true` when this caller took the lock, `false` when it was held.
    async fn try_acquire(&mut self, key: &str, ttl: Duration) -> Result<bool, LockError>;
}

/// Lock key for a client: SHA-256 of its address and user agent.
#[must_use]
pub fn client_key(address: &str, user_agent: &str) -> String {
    let digest = Sha256::new()
        .chain_update(address.as_bytes())
        .chain_update(user_agent.as_bytes())
        .finalize();
    format!("{KEY_PREFIX}:{}", hex::encode(digest))
}

/// Redis `SET NX EX` lock.
#[derive(Clone)]
pub struct RedisDedupLock {
    conn: ConnectionManager,
}

impl RedisDedupLock {
    #[must_use]
    pub const fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

impl DedupLock for RedisDedupLock {
    async fn try_acquire(&mut self, key: &str, ttl: Duration) -> Result<bool, LockError> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut self.conn)
            .await?;
        Ok(reply.is_some())
    }
}

/// In-process lock for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryLock {
    pub held: std::collections::HashSet<String>,
    /// Every acquire fails while set.
    pub fail: bool,
}

#[cfg(test)]
impl DedupLock for MemoryLock {
    async fn try_acquire(&mut self, key: &str, _ttl: Duration) -> Result<bool, LockError> {
        if self.fail {
            return Err(LockError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "lock backend unavailable",
            ))));
        }
        Ok(self.held.insert(key.to_owned()))
    }
}
