//! Draft orders: frozen cart snapshots carried through checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use emporium_core::checkout::pricing::{MONEY_SCALE, products_gross};
use emporium_core::checkout::{DraftLine, ShippingMethod, ShippingMethods, total_payable};
use emporium_core::{CurrencyCode, UserId};

use crate::db::RepositoryError;
use crate::models::{CartOwner, DraftOrder, NewDraftOrder, PaymentMethod, SavedShippingAddress};
use crate::store::{AccountStore, CartStore, CheckoutStore};

/// Draft building failures. All of them surface as one generic message.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("cart not found")]
    CartNotFound,

    #[error("draft order not found")]
    NotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl DraftError {
    /// Message key for a failed shipping calculation.
    pub const CALCULATION_FAILED: &'static str = "failed_to_calculate_shipping";
}

/// Source of candidate shipping methods.
pub struct ShippingQuote;

impl ShippingQuote {
    /// Fixed courier options until real rates are wired in.
    #[must_use]
    pub fn placeholder() -> ShippingMethods {
        [("Standard courier", 100), ("Express courier", 200)]
            .into_iter()
            .map(|(name, cost)| ShippingMethod {
                id: Uuid::new_v4(),
                cost: Decimal::from(cost),
                currency: CurrencyCode::Pln,
                name: name.to_owned(),
            })
            .collect()
    }
}

/// Snapshot the owner's cart with current prices and the candidate shipping
/// methods. Returns the draft uuid.
///
/// # Errors
///
/// `CartNotFound` or a storage error. A failed insert leaves no draft.
pub async fn create_draft_order<S>(
    store: &mut S,
    owner: CartOwner,
    shipping_methods: ShippingMethods,
    now: DateTime<Utc>,
) -> Result<Uuid, DraftError>
where
    S: CartStore + CheckoutStore,
{
    let cart = store.find_cart(owner).await?.ok_or(DraftError::CartNotFound)?;
    let lines = store
        .line_details(cart)
        .await?
        .into_iter()
        .map(|line| DraftLine {
            product_id: line.product_id,
            name: line.name,
            quantity: line.quantity,
            price_net: line.price_net,
            vat_rate: line.vat_rate,
        })
        .collect();

    let draft = NewDraftOrder {
        uuid: Uuid::new_v4(),
        cart_id: cart,
        lines,
        shipping_methods,
        created_at: now,
    };
    store.insert_draft(&draft).await?;
    tracing::info!(draft = %draft.uuid, %cart, lines = draft.lines.len(), "Draft order created");
    Ok(draft.uuid)
}

/// Load a draft that has not expired.
///
/// # Errors
///
/// Returns `RepositoryError` if the query fails.
pub async fn load_draft<S: CheckoutStore>(
    store: &mut S,
    uuid: Uuid,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) -> Result<Option<DraftOrder>, RepositoryError> {
    Ok(store
        .draft_by_uuid(uuid)
        .await?
        .filter(|draft| draft.is_live(now, ttl)))
}

/// Data for the checkout page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSummary {
    pub draft_order_uuid: Uuid,
    pub lines: Vec<DraftLine>,
    pub shipping_method: ShippingMethod,
    pub payment_methods: Vec<PaymentMethod>,
    pub products_gross: Decimal,
    pub total: Decimal,
    /// Saved address picked with `?ssauuid=`, for signed-in customers.
    pub shipping_address: Option<SavedShippingAddress>,
}

/// Assemble the checkout page for a draft and one of its shipping methods.
///
/// # Errors
///
/// `NotFound` when the draft is missing or expired, or the method is not
/// one of the draft's candidates.
pub async fn checkout_summary<S>(
    store: &mut S,
    draft_uuid: Uuid,
    method: Uuid,
    saved_address: Option<(UserId, Uuid)>,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) -> Result<CheckoutSummary, DraftError>
where
    S: CheckoutStore + AccountStore,
{
    let draft = load_draft(store, draft_uuid, now, ttl)
        .await?
        .ok_or(DraftError::NotFound)?;
    let shipping_method = draft
        .shipping_methods
        .get(&method)
        .cloned()
        .ok_or(DraftError::NotFound)?;

    let shipping_address = match saved_address {
        Some((user, uuid)) => store.shipping_address(user, uuid).await?,
        None => None,
    };

    Ok(CheckoutSummary {
        draft_order_uuid: draft.uuid,
        products_gross: products_gross(&draft.lines).round_dp(MONEY_SCALE),
        total: total_payable(&draft.lines, &shipping_method),
        lines: draft.lines,
        shipping_method,
        payment_methods: store.payment_methods().await?,
        shipping_address,
    })
}
