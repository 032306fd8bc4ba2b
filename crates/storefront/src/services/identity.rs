//! Cart identity resolution.
//!
//! Makes sure the cart a request will address exists before any cart
//! operation runs:
//!
//! | session | cart cookie            | action                               |
//! |---------|------------------------|--------------------------------------|
//! | user    | any                    | repair to exactly one user cart      |
//! | none    | missing                | mint a token, insert cart, set cookie |
//! | none    | references no cart     | same as missing                      |
//! | none    | references a cart      | nothing                              |
//!
//! The whole resolution sits behind a [`DedupLock`] keyed by client. When
//! another request from the same client holds it, resolution is skipped. The
//! unique constraints on `carts` are what actually keep one cart per
//! identity; the lock only stops a burst of first requests from racing.

use std::time::Duration;

use uuid::Uuid;

use emporium_core::{CartId, UserId};

use crate::db::RepositoryError;
use crate::lock::DedupLock;
use crate::store::CartStore;

/// What resolution did for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The dedup lock was held by a concurrent request.
    Skipped,
    /// The user's single cart.
    User(CartId),
    /// The cookie already pointed at a cart.
    Existing(Uuid),
    /// A new anonymous cart was created; the caller must set the cookie.
    Minted(Uuid),
    /// Storage failed. Logged; the request carries on.
    Failed,
}

impl Resolution {
    /// Token to write into the cart cookie, when one was minted.
    #[must_use]
    pub const fn minted_token(&self) -> Option<Uuid> {
        match self {
            Self::Minted(token) => Some(*token),
            _ => None,
        }
    }
}

/// Inputs read from the request.
#[derive(Debug, Clone, Copy)]
pub struct IdentityRequest<'a> {
    pub user: Option<UserId>,
    pub cart_token: Option<Uuid>,
    /// Dedup lock key, see [`crate::lock::client_key`].
    pub lock_key: &'a str,
}

/// Resolve the cart identity of a request. Never fails.
pub async fn resolve<S, L>(
    store: &mut S,
    lock: &mut L,
    request: IdentityRequest<'_>,
    lock_ttl: Duration,
) -> Resolution
where
    S: CartStore,
    L: DedupLock,
{
    match lock.try_acquire(request.lock_key, lock_ttl).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("Cart identity lock held, skipping resolution");
            return Resolution::Skipped;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cart identity lock unavailable, resolving anyway");
        }
    }

    let outcome = match request.user {
        Some(user) => ensure_user_cart(store, user).await.map(Resolution::User),
        None => ensure_anonymous_cart(store, request.cart_token)
            .await
            .map(|(token, minted)| {
                if minted {
                    Resolution::Minted(token)
                } else {
                    Resolution::Existing(token)
                }
            }),
    };

    outcome.unwrap_or_else(|e| {
        tracing::error!(error = %e, user = ?request.user, "Cart identity resolution failed");
        Resolution::Failed
    })
}

/// Return the user's cart, repairing zero or duplicated carts into exactly
/// one fresh cart.
///
/// # Errors
///
/// Returns `RepositoryError` if a query fails.
pub async fn ensure_user_cart<S: CartStore>(
    store: &mut S,
    user: UserId,
) -> Result<CartId, RepositoryError> {
    let carts = store.user_cart_ids(user).await?;
    if let [cart] = carts.as_slice() {
        return Ok(*cart);
    }

    if !carts.is_empty() {
        tracing::warn!(%user, carts = carts.len(), "Duplicate user carts, replacing");
    }
    store.replace_user_carts(user).await
}

/// Return the anonymous cart for `token`, minting a new token and cart when
/// there is none. The flag is `true` when a cart was minted.
///
/// # Errors
///
/// Returns `RepositoryError` if a query fails.
pub async fn ensure_anonymous_cart<S: CartStore>(
    store: &mut S,
    token: Option<Uuid>,
) -> Result<(Uuid, bool), RepositoryError> {
    if let Some(token) = token
        && store.anonymous_cart_id(token).await?.is_some()
    {
        return Ok((token, false));
    }

    let minted = Uuid::new_v4();
    store.create_anonymous_cart(minted).await?;
    tracing::debug!(cart_token = %minted, "Anonymous cart created");
    Ok((minted, true))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lock::MemoryLock;
    use crate::store::memory::MemoryStore;

    const TTL: Duration = Duration::from_secs(3);

    fn anonymous(token: Option<Uuid>) -> IdentityRequest<'static> {
        IdentityRequest {
            user: None,
            cart_token: token,
            lock_key: "client",
        }
    }

    #[tokio::test]
    async fn test_mints_cart_without_cookie() {
        let mut store = MemoryStore::new();
        let mut lock = MemoryLock::default();

        let resolution = resolve(&mut store, &mut lock, anonymous(None), TTL).await;

        let token = resolution.minted_token().unwrap();
        assert!(store.anonymous_cart_id(token).await.unwrap().is_some());
        assert_eq!(store.carts.len(), 1);
    }

    #[tokio::test]
    async fn test_replaces_dangling_cookie() {
        let mut store = MemoryStore::new();
        let mut lock = MemoryLock::default();
        let stale = Uuid::new_v4();

        let resolution = resolve(&mut store, &mut lock, anonymous(Some(stale)), TTL).await;

        let token = resolution.minted_token().unwrap();
        assert_ne!(token, stale);
        assert!(store.anonymous_cart_id(stale).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_valid_cookie_is_noop() {
        let mut store = MemoryStore::new();
        let mut lock = MemoryLock::default();
        let token = Uuid::new_v4();
        store.seed_anonymous_cart(token);

        let resolution = resolve(&mut store, &mut lock, anonymous(Some(token)), TTL).await;

        assert_eq!(resolution, Resolution::Existing(token));
        assert_eq!(store.carts.len(), 1);
    }

    #[tokio::test]
    async fn test_user_ends_with_exactly_one_cart() {
        for existing in 0..3 {
            let mut store = MemoryStore::new();
            let mut lock = MemoryLock::default();
            let user = UserId::new(500);
            for _ in 0..existing {
                store.seed_user_cart(user);
            }

            let request = IdentityRequest {
                user: Some(user),
                cart_token: Some(Uuid::new_v4()),
                lock_key: "client",
            };
            let resolution = resolve(&mut store, &mut lock, request, TTL).await;

            let carts = store.user_cart_ids(user).await.unwrap();
            assert_eq!(carts.len(), 1, "started with {existing} carts");
            assert_eq!(resolution, Resolution::User(carts[0]));
        }
    }

    #[tokio::test]
    async fn test_single_user_cart_is_kept() {
        let mut store = MemoryStore::new();
        let user = UserId::new(9);
        let cart = store.seed_user_cart(user);
        store.seed_line(cart, 1, 1);

        assert_eq!(ensure_user_cart(&mut store, user).await.unwrap(), cart);
        assert_eq!(store.lines_of(cart), vec![(1, 1)]);
    }

    #[tokio::test]
    async fn test_held_lock_skips_resolution() {
        let mut store = MemoryStore::new();
        let mut lock = MemoryLock::default();
        lock.held.insert("client".to_owned());

        let resolution = resolve(&mut store, &mut lock, anonymous(None), TTL).await;

        assert_eq!(resolution, Resolution::Skipped);
        assert!(store.carts.is_empty());
    }

    #[tokio::test]
    async fn test_second_request_is_deduplicated() {
        let mut store = MemoryStore::new();
        let mut lock = MemoryLock::default();

        let first = resolve(&mut store, &mut lock, anonymous(None), TTL).await;
        let second = resolve(&mut store, &mut lock, anonymous(None), TTL).await;

        assert!(first.minted_token().is_some());
        assert_eq!(second, Resolution::Skipped);
        assert_eq!(store.carts.len(), 1);
    }

    #[tokio::test]
    async fn test_lock_failure_still_resolves() {
        let mut store = MemoryStore::new();
        let mut lock = MemoryLock {
            fail: true,
            ..MemoryLock::default()
        };

        let resolution = resolve(&mut store, &mut lock, anonymous(None), TTL).await;

        assert!(resolution.minted_token().is_some());
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let mut store = MemoryStore::new();
        store.fail_writes = true;
        let mut lock = MemoryLock::default();

        let resolution = resolve(&mut store, &mut lock, anonymous(None), TTL).await;

        assert_eq!(resolution, Resolution::Failed);
    }
}
