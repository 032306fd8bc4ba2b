//! Expiry sweep.
//!
//! Meant to run from cron. Uses the same TTL variables as the storefront:
//! `PASSWORD_RESET_TTL_SECS`, `DRAFT_ORDER_TTL_SECS` and `CART_TTL_SECS`.

use chrono::{DateTime, Utc};

use emporium_storefront::config::{AuthConfig, CartConfig, CheckoutConfig};
use emporium_storefront::db::maintenance::{self, SweepCutoffs};

use super::{CommandError, connect};

/// Delete expired rows and report the counts.
///
/// # Errors
///
/// Returns `CommandError` on configuration or database failure.
pub async fn run() -> Result<(), CommandError> {
    let cutoffs = cutoffs(
        Utc::now(),
        &AuthConfig::from_env()?,
        &CheckoutConfig::from_env()?,
        &CartConfig::from_env()?,
    );
    let pool = connect().await?;

    let report = maintenance::sweep(&pool, cutoffs).await?;
    tracing::info!(
        reset_tokens = report.reset_tokens,
        draft_orders = report.draft_orders,
        carts = report.carts,
        cart_lines = report.cart_lines,
        "Expiry sweep complete"
    );
    Ok(())
}

fn cutoffs(
    now: DateTime<Utc>,
    auth: &AuthConfig,
    checkout: &CheckoutConfig,
    cart: &CartConfig,
) -> SweepCutoffs {
    let before = |ttl: std::time::Duration| {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    };

    SweepCutoffs {
        reset_tokens_before: before(auth.reset_token_ttl),
        drafts_before: before(checkout.draft_ttl),
        anonymous_carts_before: before(cart.ttl),
    }
}
