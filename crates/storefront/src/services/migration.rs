//! Cart migration across login and logout.
//!
//! The source cart's lines replace the target cart's lines; the source cart
//! row stays, empty. Migration never fails the request: callers log a
//! non-success [`MergeResult`] and carry on.

use uuid::Uuid;

use emporium_core::UserId;

use crate::db::RepositoryError;
use crate::models::CartOwner;
use crate::store::CartStore;

/// Which way lines move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// On login: the cookie cart replaces the user cart.
    CookieToUser,
    /// On logout: the user cart replaces the cookie cart.
    UserToCookie,
}

impl MigrationDirection {
    const fn owners(self, user: UserId, token: Uuid) -> (CartOwner, CartOwner) {
        match self {
            Self::CookieToUser => (CartOwner::Anonymous(token), CartOwner::User(user)),
            Self::UserToCookie => (CartOwner::User(user), CartOwner::Anonymous(token)),
        }
    }
}

/// Outcome of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResult {
    /// Lines moved (zero when the source was empty and nothing changed).
    Success { moved: u64 },
    NoSourceCart,
    NoTargetCart,
    StorageFailure,
}

impl MergeResult {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Move the source cart's lines onto the target cart.
///
/// An empty source cart leaves the target untouched.
pub async fn migrate<S: CartStore>(
    store: &mut S,
    direction: MigrationDirection,
    user: UserId,
    token: Uuid,
) -> MergeResult {
    let (source, target) = direction.owners(user, token);

    let result = async {
        let Some(from) = store.find_cart(source).await? else {
            return Ok(MergeResult::NoSourceCart);
        };
        let Some(to) = store.find_cart(target).await? else {
            return Ok(MergeResult::NoTargetCart);
        };
        if store.line_details(from).await?.is_empty() {
            return Ok(MergeResult::Success { moved: 0 });
        }
        let moved = store.move_lines(from, to).await?;
        Ok::<_, RepositoryError>(MergeResult::Success { moved })
    }
    .await;

    let result = result.unwrap_or_else(|e| {
        tracing::error!(error = %e, ?direction, %user, "Cart migration failed");
        MergeResult::StorageFailure
    });

    if result.is_success() {
        tracing::debug!(?direction, %user, ?result, "Cart migrated");
    } else {
        tracing::warn!(?direction, %user, ?result, "Cart migration skipped");
    }
    result
}
