//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Database readiness
//!
//! # Shop
//! GET  /shop                            - Product listing (?s=page)
//! GET  /shop/{c1}[/{c2}[/{c3}]]         - Listing under a category path
//! GET  /shop/product/{slug}             - Product page
//!
//! # Cart
//! GET  /cart/init                       - Resolve cart identity, 204
//! GET  /cart                            - Cart contents
//! POST /cart/add                        - Add a product, 202
//! PUT  /cart/edit/{product_id}          - Set a quantity, 202
//! GET  /cart/remove/{product_id}        - Remove a line, redirect back
//!
//! # Order
//! POST /order/calculate-shipping        - Create a draft order
//! GET  /order/checkout/{draft}/{method} - Checkout data (?ssauuid=)
//! POST /order/finalize                  - Place the order, 201
//! POST /order/validate                  - Validate only
//! GET  /order/details/{order}           - Placed order
//!
//! # Auth
//! POST /auth/login                      - Login
//! POST /auth/register                   - Register
//! POST /auth/forgot-password            - Send a reset link
//! POST /auth/new-password               - Reset with a token
//! GET  /auth/logout                     - Logout
//!
//! # User panel (signed-in customers only)
//! GET  /user/account                    - Account data
//! PUT  /user/account                    - Change name and phone
//! GET  /user/billing                    - Saved billing data
//! PUT  /user/billing                    - Replace or clear billing data
//! GET  /user/shipping                   - Saved shipping addresses
//! POST /user/shipping                   - Save an address, 201
//! GET  /user/shipping/{uuid}            - One saved address
//! PUT  /user/shipping/{uuid}            - Edit an address, 204
//! DELETE /user/shipping/{uuid}          - Delete an address, 204
//! POST /user/change-password            - Change password, ends the session
//! ```

pub mod auth;
pub mod cart;
pub mod health;
pub mod order;
pub mod shop;
pub mod user;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/new-password", post(auth::new_password))
        .route("/logout", get(auth::logout))
        .layer(auth_rate_limiter())
}

/// Create the shop routes router.
pub fn shop_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(shop::index))
        .route("/product/{slug}", get(shop::product))
        .route("/{c1}", get(shop::category))
        .route("/{c1}/{c2}", get(shop::subcategory))
        .route("/{c1}/{c2}/{c3}", get(shop::leaf_category))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/init", get(cart::init))
        .route("/add", post(cart::add))
        .route("/edit/{product_id}", put(cart::edit))
        .route("/remove/{product_id}", get(cart::remove))
        .layer(api_rate_limiter())
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/calculate-shipping", post(order::calculate_shipping))
        .route("/checkout/{draft}/{method}", get(order::checkout))
        .route("/finalize", post(order::finalize))
        .route("/validate", post(order::validate))
        .route("/details/{order}", get(order::details))
        .layer(api_rate_limiter())
}

/// Create the customer panel router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/account", get(user::account).put(user::update_account))
        .route("/billing", get(user::billing).put(user::update_billing))
        .route("/shipping", get(user::addresses).post(user::add_address))
        .route(
            "/shipping/{address}",
            get(user::address)
                .put(user::edit_address)
                .delete(user::delete_address),
        )
        .layer(api_rate_limiter())
        .merge(
            Router::new()
                .route("/change-password", post(user::change_password))
                .layer(auth_rate_limiter()),
        )
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/shop", shop_routes())
        .nest("/cart", cart_routes())
        .nest("/order", order_routes())
        .nest("/auth", auth_routes())
        .nest("/user", user_routes())
}
