//! HTTP tests for the storefront API.
//!
//! These tests require:
//! - A running `PostgreSQL` database, migrated and seeded with at least one
//!   in-stock product, a shipping method and a payment method
//! - Redis
//! - The storefront running (cargo run -p emporium-storefront)
//!
//! Run with: cargo test -p emporium-integration-tests -- --ignored

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use emporium_integration_tests::{
    browser_client, checkout_body, seeded_product_id, storefront_base_url,
};

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_health_endpoints() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .expect("Failed to get health");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{base_url}/health/ready"))
        .send()
        .await
        .expect("Failed to get readiness");
    assert_eq!(resp.status(), StatusCode::OK);
}

// ============================================================================
// Cart
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_cart_init_sets_cookie() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .get(format!("{base_url}/cart/init"))
        .send()
        .await
        .expect("Failed to init cart");

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let cookie = resp
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .expect("Missing cart cookie");
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_cart_add_edit_remove() {
    let client = browser_client();
    let base_url = storefront_base_url();
    let product = seeded_product_id();

    let resp = client
        .post(format!("{base_url}/cart/add"))
        .json(&json!({"productId": product, "amount": 2}))
        .send()
        .await
        .expect("Failed to add to cart");
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let cart: Value = client
        .get(format!("{base_url}/cart"))
        .send()
        .await
        .expect("Failed to get cart")
        .json()
        .await
        .expect("Failed to parse cart");
    assert_eq!(cart["item_count"], 2);

    let resp = client
        .put(format!("{base_url}/cart/edit/{product}"))
        .json(&json!({"amount": 1}))
        .send()
        .await
        .expect("Failed to edit cart");
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = client
        .get(format!("{base_url}/cart/remove/{product}"))
        .header("referer", format!("{base_url}/shop"))
        .send()
        .await
        .expect("Failed to remove from cart");
    assert!(resp.status().is_redirection());

    let cart: Value = client
        .get(format!("{base_url}/cart"))
        .send()
        .await
        .expect("Failed to get cart")
        .json()
        .await
        .expect("Failed to parse cart");
    assert_eq!(cart["item_count"], 0);
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_cart_rejects_non_positive_amount() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .post(format!("{base_url}/cart/add"))
        .json(&json!({"productId": seeded_product_id(), "amount": 0}))
        .send()
        .await
        .expect("Failed to add to cart");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("Failed to parse error");
    assert!(body["errors"].is_array());
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_cart_rejects_malformed_body() {
    let client = browser_client();
    let base_url = storefront_base_url();

    for body in [json!({"amount": "2"}), json!({"amount": 3_000_000_000_u64}), json!({})] {
        let resp = client
            .put(format!("{base_url}/cart/edit/{}", seeded_product_id()))
            .json(&body)
            .send()
            .await
            .expect("Failed to edit cart");

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        let errors: Value = resp.json().await.expect("Failed to parse error");
        assert_eq!(errors, json!({"errors": ["invalid_request_body"]}));
    }
}

// ============================================================================
// Order
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_checkout_without_cart_fails() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .post(format!("{base_url}/order/calculate-shipping"))
        .send()
        .await
        .expect("Failed to calculate shipping");

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// Fill a cart and open a draft. Returns the draft, its first shipping
/// method and the first payment method offered.
async fn open_draft(client: &Client, base_url: &str) -> (String, String, i32) {
    client
        .post(format!("{base_url}/cart/add"))
        .json(&json!({"productId": seeded_product_id(), "amount": 1}))
        .send()
        .await
        .expect("Failed to add to cart");

    let calculation: Value = client
        .post(format!("{base_url}/order/calculate-shipping"))
        .send()
        .await
        .expect("Failed to calculate shipping")
        .json()
        .await
        .expect("Failed to parse shipping");
    let draft = calculation["douuid"]
        .as_str()
        .expect("Missing draft uuid")
        .to_string();
    let method = calculation["shipping_methods"]
        .as_object()
        .and_then(|methods| methods.keys().next().cloned())
        .expect("No shipping methods offered");

    let summary: Value = client
        .get(format!("{base_url}/order/checkout/{draft}/{method}"))
        .send()
        .await
        .expect("Failed to get checkout")
        .json()
        .await
        .expect("Failed to parse checkout");
    let payment = summary["payment_methods"][0]["id"]
        .as_i64()
        .and_then(|id| i32::try_from(id).ok())
        .expect("No payment methods offered");

    (draft, method, payment)
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_anonymous_checkout_places_order() {
    let client = browser_client();
    let base_url = storefront_base_url();
    let (draft, method, payment) = open_draft(&client, &base_url).await;

    let resp = client
        .post(format!("{base_url}/order/finalize"))
        .json(&checkout_body(&draft, &method, payment))
        .send()
        .await
        .expect("Failed to finalize");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let placed: Value = resp.json().await.expect("Failed to parse order");
    let order = placed["ouuid"].as_str().expect("Missing order uuid");

    let resp = client
        .get(format!("{base_url}/order/details/{order}"))
        .send()
        .await
        .expect("Failed to get order");
    assert_eq!(resp.status(), StatusCode::OK);

    // The draft is single use
    let resp = client
        .post(format!("{base_url}/order/finalize"))
        .json(&checkout_body(&draft, &method, payment))
        .send()
        .await
        .expect("Failed to finalize");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_validate_reports_every_field() {
    let client = browser_client();
    let base_url = storefront_base_url();
    let (draft, _, payment) = open_draft(&client, &base_url).await;

    let mut body = checkout_body(&draft, &Uuid::new_v4().to_string(), payment);
    body["shipping"]["postcode"] = json!("");
    body["terms_accepted"] = json!(false);

    let resp = client
        .post(format!("{base_url}/order/validate"))
        .json(&body)
        .send()
        .await
        .expect("Failed to validate");

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let errors: Value = resp.json().await.expect("Failed to parse errors");
    let keys: Vec<_> = errors["errors"]
        .as_array()
        .expect("errors is not a list")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(keys.contains(&"invalid_postcode"));
    assert!(keys.contains(&"terms_not_accepted"));
    assert!(keys.contains(&"invalid_shipping_method"));
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_validate_unknown_draft() {
    let client = browser_client();
    let base_url = storefront_base_url();
    let body = checkout_body(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), 1);

    let resp = client
        .post(format!("{base_url}/order/validate"))
        .json(&body)
        .send()
        .await
        .expect("Failed to validate");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_unknown_order_is_not_found() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .get(format!("{base_url}/order/details/{}", Uuid::new_v4()))
        .send()
        .await
        .expect("Failed to get order");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_login_with_wrong_password() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .post(format!("{base_url}/auth/login"))
        .json(&json!({"email": "nobody@example.com", "password": "wrong-password"}))
        .send()
        .await
        .expect("Failed to login");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_register_login_logout() {
    let client = browser_client();
    let base_url = storefront_base_url();
    let email = format!("test-{}@example.com", Uuid::new_v4().simple());

    let resp = client
        .post(format!("{base_url}/auth/register"))
        .json(&json!({
            "email": email,
            "password": "correct horse battery",
            "first_name": "Test",
            "last_name": "Customer",
            "phone": "600 100 200",
        }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .post(format!("{base_url}/auth/login"))
        .json(&json!({"email": email, "password": "correct horse battery"}))
        .send()
        .await
        .expect("Failed to login");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{base_url}/auth/logout"))
        .send()
        .await
        .expect("Failed to logout");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_forgot_password_does_not_reveal_accounts() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .post(format!("{base_url}/auth/forgot-password"))
        .json(&json!({"email": "nobody@example.com"}))
        .send()
        .await
        .expect("Failed to request reset");

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

// ============================================================================
// User panel
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_user_panel_requires_login() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .get(format!("{base_url}/user/account"))
        .send()
        .await
        .expect("Failed to get account");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_user_panel_round_trip() {
    let client = browser_client();
    let base_url = storefront_base_url();
    let email = format!("panel-{}@example.com", Uuid::new_v4().simple());

    let resp = client
        .post(format!("{base_url}/auth/register"))
        .json(&json!({
            "email": email,
            "password": "correct horse battery",
            "first_name": "Panel",
            "last_name": "Customer",
            "phone": "600 100 200",
        }))
        .send()
        .await
        .expect("Failed to register");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .put(format!("{base_url}/user/account"))
        .json(&json!({"first_name": "Renamed", "last_name": "Customer", "phone": "601"}))
        .send()
        .await
        .expect("Failed to update account");
    assert_eq!(resp.status(), StatusCode::OK);
    let user: Value = resp.json().await.expect("Failed to parse user");
    assert_eq!(user["name"], "Renamed Customer");

    let resp = client
        .put(format!("{base_url}/user/billing"))
        .json(&json!({"name": "Only a name"}))
        .send()
        .await
        .expect("Failed to update billing");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("{base_url}/user/shipping"))
        .json(&json!({
            "first_name": "Panel",
            "last_name": "Customer",
            "street": "Długa 5",
            "postcode": "00-950",
            "city": "Warszawa",
            "country_code": "PL",
            "country": "Polska",
            "phone": "600 100 200",
        }))
        .send()
        .await
        .expect("Failed to add address");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = resp.json().await.expect("Failed to parse address");
    let uuid = created["uuid"].as_str().expect("Missing address uuid").to_owned();

    let resp = client
        .get(format!("{base_url}/user/shipping"))
        .send()
        .await
        .expect("Failed to list addresses");
    let list: Value = resp.json().await.expect("Failed to parse addresses");
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let resp = client
        .delete(format!("{base_url}/user/shipping/{uuid}"))
        .send()
        .await
        .expect("Failed to delete address");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .delete(format!("{base_url}/user/shipping/{uuid}"))
        .send()
        .await
        .expect("Failed to delete address");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client
        .post(format!("{base_url}/user/change-password"))
        .json(&json!({
            "old_password": "correct horse battery",
            "new_password": "battery staple horse",
            "new_password_confirm": "battery staple horse",
        }))
        .send()
        .await
        .expect("Failed to change password");
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = client
        .get(format!("{base_url}/user/account"))
        .send()
        .await
        .expect("Failed to get account");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Shop
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_shop_listing_sets_preferences_cookie() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .get(format!("{base_url}/shop"))
        .send()
        .await
        .expect("Failed to get shop");

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("set-cookie").is_some());
}

#[tokio::test]
#[ignore = "Requires running storefront server"]
async fn test_unknown_product_slug() {
    let client = browser_client();
    let base_url = storefront_base_url();

    let resp = client
        .get(format!("{base_url}/shop/product/no-such-thing"))
        .send()
        .await
        .expect("Failed to get product");

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
