//! Expiry sweep queries, run by `emporium-cli sweep`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::RepositoryError;

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub reset_tokens: u64,
    pub draft_orders: u64,
    pub cart_lines: u64,
    pub carts: u64,
}

/// Cut-off times; rows older than these are deleted.
#[derive(Debug, Clone, Copy)]
pub struct SweepCutoffs {
    pub reset_tokens_before: DateTime<Utc>,
    pub drafts_before: DateTime<Utc>,
    pub anonymous_carts_before: DateTime<Utc>,
}

/// Delete expired reset tokens, expired drafts and stale anonymous carts.
///
/// Each group runs in its own transaction. Cart lines go before their
/// carts. Carts still referenced by a live draft are kept.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a statement fails; groups already
/// committed stay deleted.
pub async fn sweep(pool: &PgPool, cutoffs: SweepCutoffs) -> Result<SweepReport, RepositoryError> {
    let reset_tokens = sqlx::query("DELETE FROM password_reset_tokens WHERE created_at < $1")
        .bind(cutoffs.reset_tokens_before)
        .execute(pool)
        .await?
        .rows_affected();

    let draft_orders = sqlx::query("DELETE FROM draft_orders WHERE created_at < $1")
        .bind(cutoffs.drafts_before)
        .execute(pool)
        .await?
        .rows_affected();

    let mut tx = pool.begin().await?;
    let stale = sqlx::query_scalar::<_, i32>(
        r"
        SELECT c.id FROM carts c
        WHERE c.user_id IS NULL
          AND c.last_modified_at < $1
          AND NOT EXISTS (SELECT 1 FROM draft_orders d WHERE d.cart_id = c.id)
        FOR UPDATE SKIP LOCKED
        ",
    )
    .bind(cutoffs.anonymous_carts_before)
    .fetch_all(&mut *tx)
    .await?;

    let (mut cart_lines, mut carts) = (0, 0);
    if !stale.is_empty() {
        cart_lines = sqlx::query("DELETE FROM cart_products WHERE cart_id = ANY($1)")
            .bind(&stale)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        carts = sqlx::query("DELETE FROM carts WHERE id = ANY($1)")
            .bind(&stale)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;

    Ok(SweepReport {
        reset_tokens,
        draft_orders,
        cart_lines,
        carts,
    })
}
