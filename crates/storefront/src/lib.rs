//! Emporium storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused by the CLI.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod context;
pub mod cookies;
pub mod db;
pub mod error;
pub mod extract;
pub mod lock;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use axum::Router;
use axum::middleware::from_fn;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full application router with its middleware stack.
///
/// Layers run outermost first: Sentry, tracing, request id, session, then
/// the per-group rate limits inside [`routes::routes`].
pub fn build_router(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.pool(), state.config());

    Router::new()
        .merge(routes::routes())
        .layer(session_layer)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
