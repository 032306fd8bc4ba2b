//! Order follow-up reconciliation.
//!
//! Placement stamps `email_enqueued_at` and `cart_cleared_at` once the
//! confirmation is queued and the cart emptied. A crash or Redis outage
//! between placement and those steps leaves an order unstamped; this
//! command finds such orders and finishes them. A cart modified after the
//! order was placed is not cleared.

use std::time::Duration;

use chrono::Utc;

use emporium_storefront::config::EmailConfig;
use emporium_storefront::db::PgStore;
use emporium_storefront::models::OrderRecord;
use emporium_storefront::queue::{self, RedisEmailQueue};
use emporium_storefront::services::finalize::{FollowupMode, complete_followups};

use super::{CommandError, connect, env_or, redis_url};

/// Finish outstanding follow-ups of orders older than `older_than`.
///
/// # Errors
///
/// Returns `CommandError` if the database or Redis is unreachable. Per-order
/// failures are logged and left for the next run.
pub async fn run(older_than: Duration, limit: i64) -> Result<(), CommandError> {
    let base_url = env_or("STOREFRONT_BASE_URL", String::new())?;
    let email = EmailConfig::from_env(base_url)?;
    let pool = connect().await?;
    let mut store = PgStore::acquire(&pool).await?;
    let mut queue = RedisEmailQueue::new(
        queue::connect(&redis_url()).await?,
        email.queue_name.clone(),
    );

    let now = Utc::now();
    let placed_before = chrono::Duration::from_std(older_than)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(now);
    let orders: Vec<_> = store
        .pending_orders(placed_before, limit)
        .await?
        .into_iter()
        .filter(OrderRecord::has_pending_steps)
        .collect();
    tracing::info!(count = orders.len(), "Orders with pending follow-ups");

    let mut completed = 0_usize;
    for order in &orders {
        let outcome = complete_followups(
            &mut store,
            &mut queue,
            &email,
            order,
            FollowupMode::Reconcile,
            now,
        )
        .await;
        if outcome.is_complete() {
            completed += 1;
        } else {
            tracing::warn!(
                order_number = %order.order_number,
                email_enqueued = outcome.email_enqueued,
                cart_cleared = outcome.cart_cleared,
                "Order follow-ups still pending"
            );
        }
    }

    tracing::info!(completed, pending = orders.len() - completed, "Reconciliation complete");
    Ok(())
}
