//! Cart route handlers.
//!
//! Every handler resolves the cart identity first and sets the cart cookie
//! when a new anonymous cart was minted.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use emporium_core::ProductId;

use crate::context::RequestContext;
use crate::cookies;
use crate::error::{AppError, Result};
use crate::extract::JsonBody;
use crate::models::CartView;
use crate::services::cart::{self, CartError};
use crate::services::identity::Resolution;
use crate::state::AppState;

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub product_id: ProductId,
    pub amount: i32,
}

/// Edit request body. The product comes from the path.
#[derive(Debug, Deserialize)]
pub struct EditItem {
    pub amount: i32,
}

/// Append the cart cookie when resolution minted a token.
fn with_cart_cookie(
    state: &AppState,
    resolution: Resolution,
    response: impl IntoResponse,
) -> Response {
    let mut response = response.into_response();
    let cookie = resolution.minted_token().and_then(|token| {
        let config = &state.config().cookies;
        cookies::cart_cookie(&config.cart, token, config.secure)
    });
    if let Some(cookie) = cookie {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    response
}

/// Make sure the request has a cart.
#[instrument(skip(state, ctx))]
pub async fn init(State(state): State<AppState>, mut ctx: RequestContext) -> Response {
    let resolution = ctx.resolve_cart(&state).await;
    with_cart_cookie(&state, resolution, StatusCode::NO_CONTENT)
}

/// Cart contents.
///
/// A request with no resolvable cart sees an empty cart.
#[instrument(skip(state, ctx))]
pub async fn show(State(state): State<AppState>, mut ctx: RequestContext) -> Result<Response> {
    let resolution = ctx.resolve_cart(&state).await;

    let view = match ctx.cart_owner() {
        Some(owner) => match cart::view(&mut ctx.store, owner).await {
            Ok(view) => view,
            Err(CartError::CartNotFound) => CartView::default(),
            Err(e) => return Err(e.into()),
        },
        None => CartView::default(),
    };
    Ok(with_cart_cookie(&state, resolution, Json(view)))
}

/// Add a product to the cart.
#[instrument(skip(state, ctx))]
pub async fn add(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    JsonBody(body): JsonBody<AddItem>,
) -> Result<Response> {
    let resolution = ctx.resolve_cart(&state).await;
    let owner = ctx.cart_owner().ok_or(CartError::CartNotFound)?;

    cart::add_item(&mut ctx.store, owner, body.product_id, body.amount).await?;
    Ok(with_cart_cookie(&state, resolution, StatusCode::ACCEPTED))
}

/// Set a line to an absolute quantity.
#[instrument(skip(state, ctx, body))]
pub async fn edit(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(product_id): Path<ProductId>,
    JsonBody(body): JsonBody<EditItem>,
) -> Result<Response> {
    let resolution = ctx.resolve_cart(&state).await;
    let owner = ctx.cart_owner().ok_or(CartError::CartNotFound)?;

    cart::edit_item(&mut ctx.store, owner, product_id, body.amount).await?;
    Ok(with_cart_cookie(&state, resolution, StatusCode::ACCEPTED))
}

/// Remove a line and send the browser back where it came from.
#[instrument(skip(state, ctx, headers))]
pub async fn remove(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(product_id): Path<ProductId>,
    headers: HeaderMap,
) -> Result<Response> {
    let resolution = ctx.resolve_cart(&state).await;

    if let Some(owner) = ctx.cart_owner() {
        match cart::remove_item(&mut ctx.store, owner, product_id).await {
            Ok(()) | Err(CartError::CartNotFound) => {}
            Err(e) => return Err(AppError::from(e)),
        }
    }

    let back = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("/cart");
    Ok(with_cart_cookie(&state, resolution, Redirect::to(back)))
}
