//! Checkout rules end to end, from the stored draft snapshot to the number
//! printed on the confirmation email. No services required.

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use emporium_core::CurrencyCode;
use emporium_core::checkout::{
    CheckoutForm, DraftLine, FieldError, OrderNumberGenerator, ShippingMethods, total_payable,
    validate_checkout,
};
use emporium_integration_tests::checkout_body;

fn dec(value: &str) -> Decimal {
    value.parse().expect("valid decimal")
}

/// Draft columns as they come back from `jsonb`.
fn stored_draft(courier: Uuid, pickup: Uuid) -> (Vec<DraftLine>, ShippingMethods) {
    let lines = json!([
        {"product_id": 3, "name": "Tea pot", "quantity": 1, "price_net": "50", "vat_rate": "23"}
    ]);
    let methods = json!({
        courier.to_string(): {"id": courier, "cost": "100", "currency": "PLN", "name": "Courier"},
        pickup.to_string(): {"id": pickup, "cost": "0", "currency": "PLN", "name": "Pickup"},
    });

    (
        serde_json::from_value(lines).expect("lines"),
        serde_json::from_value(methods).expect("methods"),
    )
}

#[test]
fn test_total_from_stored_draft() {
    let courier = Uuid::new_v4();
    let pickup = Uuid::new_v4();
    let (lines, methods) = stored_draft(courier, pickup);

    let method = methods.get(&courier).expect("courier offered");
    assert_eq!(method.currency, CurrencyCode::Pln);
    assert_eq!(total_payable(&lines, method), dec("161.50"));

    let method = methods.get(&pickup).expect("pickup offered");
    assert_eq!(total_payable(&lines, method), dec("61.50"));
}

#[test]
fn test_many_small_lines_round_once() {
    let courier = Uuid::new_v4();
    let (_, methods) = stored_draft(courier, Uuid::new_v4());
    let method = methods.get(&courier).expect("courier offered");

    // 0.01 net at 23% is 0.0123 gross; rounded per line it would be 0.01
    let lines: Vec<DraftLine> = (1..=10)
        .map(|id| DraftLine {
            product_id: emporium_core::ProductId::new(id),
            name: format!("Sticker {id}"),
            quantity: 1,
            price_net: dec("0.01"),
            vat_rate: dec("23"),
        })
        .collect();

    assert_eq!(total_payable(&lines, method), dec("100.12"));
}

#[test]
fn test_submitted_body_validates() {
    let draft = Uuid::new_v4().to_string();
    let method = Uuid::new_v4().to_string();
    let form: CheckoutForm =
        serde_json::from_value(checkout_body(&draft, &method, 1)).expect("form");

    assert!(validate_checkout(&form, false).is_ok());
    assert_eq!(form.contact_email(), Some("anna@example.com"));
}

#[test]
fn test_invoice_without_billing_block() {
    let mut body = checkout_body(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), 1);
    body["need_invoice"] = json!(true);
    body["shipping"]["email"] = json!("");
    let form: CheckoutForm = serde_json::from_value(body).expect("form");

    let errors = validate_checkout(&form, false).expect_err("should fail");
    assert!(errors.contains(FieldError::MissingBillingData));
    assert!(errors.contains(FieldError::MissingEmail));

    // Signed-in customers have an email on file
    let errors = validate_checkout(&form, true).expect_err("should fail");
    assert!(!errors.contains(FieldError::MissingEmail));
}

#[test]
fn test_errors_serialize_as_message_keys() {
    let mut body = checkout_body(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), 1);
    body["terms_accepted"] = json!(false);
    body["payment_method_id"] = json!(null);
    let form: CheckoutForm = serde_json::from_value(body).expect("form");

    let errors = validate_checkout(&form, false).expect_err("should fail");

    assert_eq!(
        serde_json::to_value(errors.as_slice()).expect("serialize"),
        json!(["terms_not_accepted", "invalid_payment_method"])
    );
}

#[test]
fn test_order_numbers_retry_past_taken_ones() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time");
    let mut taken = HashSet::new();
    let mut numbers = OrderNumberGenerator::seeded(4, 42);

    for _ in 0..50 {
        let number = std::iter::repeat_with(|| numbers.next_candidate(now))
            .take(10)
            .find(|candidate| !taken.contains(candidate.as_str()))
            .expect("a free number within ten attempts");
        assert!(number.as_str().starts_with(&now.timestamp().to_string()));
        taken.insert(number.into_inner());
    }

    assert_eq!(taken.len(), 50);
}
