//! Shop listing and product page handlers.
//!
//! Listing preferences live in a cookie. Query parameters override them for
//! the request and the merged result is written back on every listing.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use emporium_core::preferences;

use crate::context::RequestContext;
use crate::cookies;
use crate::error::Result;
use crate::services::shop::{self, ListingQuery, ProductDetail};
use crate::state::AppState;

async fn listing(
    state: &AppState,
    ctx: &mut RequestContext,
    headers: &HeaderMap,
    path: &[&str],
    query: &ListingQuery,
) -> Result<Response> {
    let config = state.config();
    let options = &config.shop.preferences;
    let stored = preferences::decode(cookies::read(headers, &config.cookies.preferences), options);
    let prefs = query.apply(stored.preferences, options);

    let listing = shop::list_products(
        &mut ctx.store,
        state.categories(),
        state.product_counts(),
        path,
        prefs,
        query.s.unwrap_or(1),
    )
    .await?;

    let mut response = Json(listing).into_response();
    if let Some(cookie) = cookies::preferences_cookie(
        &config.cookies.preferences,
        preferences::encode(&prefs),
        config.cookies.secure,
    ) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

/// All products.
#[instrument(skip(state, ctx, headers))]
pub async fn index(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    headers: HeaderMap,
    Query(query): Query<ListingQuery>,
) -> Result<Response> {
    listing(&state, &mut ctx, &headers, &[], &query).await
}

/// Products under a top-level category.
#[instrument(skip(state, ctx, headers))]
pub async fn category(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    headers: HeaderMap,
    Path(c1): Path<String>,
    Query(query): Query<ListingQuery>,
) -> Result<Response> {
    listing(&state, &mut ctx, &headers, &[c1.as_str()], &query).await
}

/// Products under a second-level category.
#[instrument(skip(state, ctx, headers))]
pub async fn subcategory(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    headers: HeaderMap,
    Path((c1, c2)): Path<(String, String)>,
    Query(query): Query<ListingQuery>,
) -> Result<Response> {
    listing(&state, &mut ctx, &headers, &[c1.as_str(), c2.as_str()], &query).await
}

/// Products under a third-level category.
#[instrument(skip(state, ctx, headers))]
pub async fn leaf_category(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    headers: HeaderMap,
    Path((c1, c2, c3)): Path<(String, String, String)>,
    Query(query): Query<ListingQuery>,
) -> Result<Response> {
    let path = [c1.as_str(), c2.as_str(), c3.as_str()];
    listing(&state, &mut ctx, &headers, &path, &query).await
}

/// Product page by canonical slug.
#[instrument(skip(state, ctx))]
pub async fn product(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>> {
    let detail = shop::product_by_slug(&mut ctx.store, state.categories(), &slug).await?;
    Ok(Json(detail))
}
