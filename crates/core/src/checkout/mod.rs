//! Checkout domain: draft order snapshots, checkout forms and the pure rules
//! the order finalizer applies to them.

pub mod order_number;
pub mod pricing;
pub mod validation;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CurrencyCode, PaymentMethodId, ProductId, gross_price};

pub use order_number::{OrderNumber, OrderNumberGenerator};
pub use pricing::total_payable;
pub use validation::{
    FieldError, ValidationErrors, billing_is_blank, validate_billing_profile, validate_checkout,
    validate_saved_address,
};

/// One shipping option offered for a draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: Uuid,
    pub cost: Decimal,
    pub currency: CurrencyCode,
    pub name: String,
}

/// Candidate shipping methods keyed by method uuid.
///
/// Serializes as `{"<uuid>": {"id", "cost", "currency", "name"}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShippingMethods(BTreeMap<Uuid, ShippingMethod>);

impl ShippingMethods {
    #[must_use]
    pub fn get(&self, id: &Uuid) -> Option<&ShippingMethod> {
        self.0.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShippingMethod> {
        self.0.values()
    }
}

impl FromIterator<ShippingMethod> for ShippingMethods {
    fn from_iter<I: IntoIterator<Item = ShippingMethod>>(iter: I) -> Self {
        Self(iter.into_iter().map(|m| (m.id, m)).collect())
    }
}

/// A cart line frozen into a draft order, with the price and VAT in force
/// when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i32,
    pub price_net: Decimal,
    /// VAT in percent, e.g. `23`.
    pub vat_rate: Decimal,
}

impl DraftLine {
    /// Unrounded gross value of the whole line.
    #[must_use]
    pub fn gross_total(&self) -> Decimal {
        gross_price(self.price_net, self.vat_rate) * Decimal::from(self.quantity)
    }
}

/// Shipping address block of the checkout form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressForm {
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub street: String,
    pub postcode: String,
    pub city: String,
    pub country_code: Option<String>,
    pub country: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Company billing block, required when an invoice is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingForm {
    pub name: String,
    pub street: String,
    pub postcode: String,
    pub city: String,
    pub country_code: Option<String>,
    pub country: String,
    pub tax_id: String,
    pub email: Option<String>,
}

/// Full checkout submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutForm {
    pub draft_order_uuid: Uuid,
    pub shipping_method_uuid: Uuid,
    pub payment_method_id: Option<PaymentMethodId>,
    pub shipping: AddressForm,
    pub need_invoice: bool,
    pub billing: Option<BillingForm>,
    pub create_account: bool,
    pub terms_accepted: bool,
    pub notes: String,
}

impl CheckoutForm {
    /// Contact email for the order: the shipping email, if one was given.
    #[must_use]
    pub fn contact_email(&self) -> Option<&str> {
        self.shipping
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}
