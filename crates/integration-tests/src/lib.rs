//! Integration tests for Emporium.
//!
//! # Running Tests
//!
//! ```bash
//! # Domain flows, no services needed
//! cargo test -p emporium-integration-tests
//!
//! # HTTP tests against a running storefront with a seeded database
//! STOREFRONT_BASE_URL=http://localhost:3000 \
//!     cargo test -p emporium-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - draft snapshot to payable total and order number
//! - `shop_listing` - category paths and listing preferences together
//! - `storefront_api` - HTTP tests against a live server (ignored by default)

use reqwest::Client;
use serde_json::{Value, json};

/// Base URL of the storefront under test.
#[must_use]
pub fn storefront_base_url() -> String {
    std::env::var("STOREFRONT_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Product the seeded database is expected to stock.
#[must_use]
pub fn seeded_product_id() -> i64 {
    std::env::var("TEST_PRODUCT_ID")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1)
}

/// Client that keeps cookies between requests, like a browser would.
///
/// Redirects are not followed so tests can assert on them.
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialized.
#[must_use]
pub fn browser_client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// A checkout body that passes validation for an anonymous shopper.
#[must_use]
pub fn checkout_body(draft: &str, method: &str, payment_method_id: i32) -> Value {
    json!({
        "draft_order_uuid": draft,
        "shipping_method_uuid": method,
        "payment_method_id": payment_method_id,
        "shipping": {
            "first_name": "Anna",
            "last_name": "Nowak",
            "street": "Długa 5",
            "postcode": "00-950",
            "city": "Warszawa",
            "country_code": "PL",
            "country": "Polska",
            "phone": "+48 600 100 200",
            "email": "anna@example.com"
        },
        "need_invoice": false,
        "create_account": false,
        "terms_accepted": true,
        "notes": ""
    })
}
