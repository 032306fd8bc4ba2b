//! Checkout and order route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use emporium_core::checkout::{CheckoutForm, OrderNumberGenerator, ShippingMethods};

use crate::context::RequestContext;
use crate::error::{AppError, Result};
use crate::extract::JsonBody;
use crate::models::OrderDetails;
use crate::services::draft::{self, CheckoutSummary, DraftError, ShippingQuote};
use crate::services::finalize::OrderFinalizer;
use crate::state::AppState;
use crate::store::CheckoutStore;

/// Response of `calculate-shipping`.
#[derive(Debug, Serialize)]
pub struct ShippingCalculation {
    pub shipping_methods: ShippingMethods,
    pub douuid: Uuid,
}

/// Response of `finalize`.
#[derive(Debug, Serialize)]
pub struct FinalizedOrder {
    pub ouuid: Uuid,
}

/// Query of the checkout page.
#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    /// Saved shipping address to prefill.
    pub ssauuid: Option<Uuid>,
}

fn draft_ttl(state: &AppState) -> chrono::Duration {
    chrono::Duration::from_std(state.config().checkout.draft_ttl).unwrap_or(chrono::Duration::MAX)
}

fn finalizer(state: &AppState) -> OrderFinalizer<'_> {
    let config = state.config();
    OrderFinalizer::new(&config.checkout, &config.auth, &config.email)
}

/// Snapshot the cart into a draft order with candidate shipping methods.
///
/// Every failure answers with the same generic key.
#[instrument(skip(ctx))]
pub async fn calculate_shipping(mut ctx: RequestContext) -> Result<Json<ShippingCalculation>> {
    let failed = |message: String| AppError::Internal {
        key: DraftError::CALCULATION_FAILED,
        message,
    };

    let owner = ctx
        .cart_owner()
        .ok_or_else(|| failed(DraftError::CartNotFound.to_string()))?;
    let shipping_methods = ShippingQuote::placeholder();
    let douuid =
        draft::create_draft_order(&mut ctx.store, owner, shipping_methods.clone(), Utc::now())
            .await
            .map_err(|e| failed(e.to_string()))?;

    Ok(Json(ShippingCalculation {
        shipping_methods,
        douuid,
    }))
}

/// Checkout page data for a draft and a chosen shipping method.
#[instrument(skip(state, ctx))]
pub async fn checkout(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path((draft_uuid, method)): Path<(Uuid, Uuid)>,
    Query(query): Query<CheckoutQuery>,
) -> Result<Json<CheckoutSummary>> {
    let saved_address = ctx.user.as_ref().map(|u| u.id).zip(query.ssauuid);

    let summary = draft::checkout_summary(
        &mut ctx.store,
        draft_uuid,
        method,
        saved_address,
        Utc::now(),
        draft_ttl(&state),
    )
    .await
    .map_err(|e| match e {
        DraftError::NotFound | DraftError::CartNotFound => {
            AppError::NotFound("draft_order_not_found")
        }
        DraftError::Repository(e) => AppError::Database(e),
    })?;
    Ok(Json(summary))
}

/// Place the order.
#[instrument(skip_all, fields(draft = %form.draft_order_uuid))]
pub async fn finalize(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    JsonBody(form): JsonBody<CheckoutForm>,
) -> Result<impl IntoResponse> {
    let mut numbers = OrderNumberGenerator::new(state.config().checkout.order_number_letters);

    let placed = finalizer(&state)
        .finalize(
            &mut ctx.store,
            &mut ctx.queue,
            &form,
            ctx.user.as_ref(),
            &mut numbers,
            Utc::now(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(FinalizedOrder { ouuid: placed.uuid }),
    ))
}

/// Check the checkout payload without placing anything.
#[instrument(skip_all, fields(draft = %form.draft_order_uuid))]
pub async fn validate(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    JsonBody(form): JsonBody<CheckoutForm>,
) -> Result<StatusCode> {
    finalizer(&state)
        .validate(&mut ctx.store, &form, ctx.user.is_some(), Utc::now())
        .await?;
    Ok(StatusCode::OK)
}

/// Order details by uuid.
#[instrument(skip(ctx))]
pub async fn details(
    mut ctx: RequestContext,
    Path(order): Path<Uuid>,
) -> Result<Json<OrderDetails>> {
    ctx.store
        .order_by_uuid(order)
        .await?
        .map(|order| Json(OrderDetails::from(&order)))
        .ok_or(AppError::NotFound("order_not_found"))
}
