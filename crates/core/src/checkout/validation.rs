//! Checkout form validation.
//!
//! Validation is exhaustive: every section is checked and all violations are
//! reported together, so the shopper can fix the whole form in one pass.

use serde::Serialize;

use super::{AddressForm, BillingForm, CheckoutForm};
use crate::Email;

const MAX_FIRST_NAME: usize = 45;
const MAX_NAME: usize = 255;
const MAX_POSTCODE: usize = 20;
const MAX_PHONE: usize = 20;
const MAX_TAX_ID: usize = 45;
const MAX_NOTES: usize = 1000;

/// A violated checkout field, serialized as its message key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldError {
    InvalidFirstName,
    InvalidLastName,
    InvalidCompanyName,
    InvalidStreet,
    InvalidCity,
    InvalidPostcode,
    InvalidCountry,
    InvalidPhone,
    InvalidEmail,
    MissingEmail,
    MissingBillingData,
    InvalidBillingName,
    InvalidBillingStreet,
    InvalidBillingCity,
    InvalidBillingPostcode,
    InvalidBillingCountry,
    InvalidBillingEmail,
    InvalidTaxNumber,
    TermsNotAccepted,
    NotesTooLong,
    InvalidShippingMethod,
    InvalidPaymentMethod,
}

impl FieldError {
    /// Message key, identical to the serialized form.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::InvalidFirstName => "invalid_first_name",
            Self::InvalidLastName => "invalid_last_name",
            Self::InvalidCompanyName => "invalid_company_name",
            Self::InvalidStreet => "invalid_street",
            Self::InvalidCity => "invalid_city",
            Self::InvalidPostcode => "invalid_postcode",
            Self::InvalidCountry => "invalid_country",
            Self::InvalidPhone => "invalid_phone",
            Self::InvalidEmail => "invalid_email",
            Self::MissingEmail => "missing_email",
            Self::MissingBillingData => "missing_billing_data",
            Self::InvalidBillingName => "invalid_billing_name",
            Self::InvalidBillingStreet => "invalid_billing_street",
            Self::InvalidBillingCity => "invalid_billing_city",
            Self::InvalidBillingPostcode => "invalid_billing_postcode",
            Self::InvalidBillingCountry => "invalid_billing_country",
            Self::InvalidBillingEmail => "invalid_billing_email",
            Self::InvalidTaxNumber => "invalid_tax_number",
            Self::TermsNotAccepted => "terms_not_accepted",
            Self::NotesTooLong => "notes_too_long",
            Self::InvalidShippingMethod => "invalid_shipping_method",
            Self::InvalidPaymentMethod => "invalid_payment_method",
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Collected field errors, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    /// Record `error` when `failed` holds.
    pub fn check(&mut self, failed: bool, error: FieldError) {
        if failed {
            self.push(error);
        }
    }

    #[must_use]
    pub fn contains(&self, error: FieldError) -> bool {
        self.0.contains(&error)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[FieldError] {
        &self.0
    }

    /// `Ok(())` when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one error was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Extend<FieldError> for ValidationErrors {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

fn required_within(value: &str, max: usize) -> bool {
    let len = char_len(value.trim());
    len > 0 && char_len(value) <= max
}

fn has_digit(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
}

fn valid_postcode(value: &str) -> bool {
    has_digit(value) && char_len(value) <= MAX_POSTCODE
}

fn valid_country_code(value: Option<&str>) -> bool {
    value.is_some_and(|code| code.chars().any(|c| c.is_ascii_uppercase()))
}

fn valid_optional_email(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => true,
        Some(email) => Email::parse(email).is_ok(),
    }
}

/// Shipping address rules.
#[must_use]
pub fn validate_shipping(address: &AddressForm) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.check(
        !required_within(&address.first_name, MAX_FIRST_NAME),
        FieldError::InvalidFirstName,
    );
    errors.check(
        !required_within(&address.last_name, MAX_NAME),
        FieldError::InvalidLastName,
    );
    errors.check(
        char_len(&address.company_name) > MAX_NAME,
        FieldError::InvalidCompanyName,
    );
    errors.check(
        !required_within(&address.street, MAX_NAME),
        FieldError::InvalidStreet,
    );
    errors.check(!valid_postcode(&address.postcode), FieldError::InvalidPostcode);
    errors.check(
        !required_within(&address.city, MAX_NAME),
        FieldError::InvalidCity,
    );
    errors.check(
        !valid_country_code(address.country_code.as_deref()),
        FieldError::InvalidCountry,
    );
    errors.check(
        !(has_digit(&address.phone) && char_len(&address.phone) <= MAX_PHONE),
        FieldError::InvalidPhone,
    );
    errors.check(
        !valid_optional_email(address.email.as_deref()),
        FieldError::InvalidEmail,
    );
    errors
}

/// Company billing rules.
#[must_use]
pub fn validate_billing(billing: &BillingForm) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.check(
        !required_within(&billing.name, MAX_NAME),
        FieldError::InvalidBillingName,
    );
    errors.check(
        !required_within(&billing.street, MAX_NAME),
        FieldError::InvalidBillingStreet,
    );
    errors.check(
        !valid_postcode(&billing.postcode),
        FieldError::InvalidBillingPostcode,
    );
    errors.check(
        !required_within(&billing.city, MAX_NAME),
        FieldError::InvalidBillingCity,
    );
    errors.check(
        !valid_country_code(billing.country_code.as_deref()),
        FieldError::InvalidBillingCountry,
    );
    let tax_id = billing.tax_id.trim();
    errors.check(
        !tax_id.is_empty() && !(has_digit(tax_id) && char_len(tax_id) <= MAX_TAX_ID),
        FieldError::InvalidTaxNumber,
    );
    errors.check(
        !valid_optional_email(billing.email.as_deref()),
        FieldError::InvalidBillingEmail,
    );
    errors
}

/// Whether every field of a billing block is blank.
#[must_use]
pub fn billing_is_blank(billing: &BillingForm) -> bool {
    [
        billing.name.as_str(),
        billing.street.as_str(),
        billing.postcode.as_str(),
        billing.city.as_str(),
        billing.country_code.as_deref().unwrap_or_default(),
        billing.country.as_str(),
        billing.tax_id.as_str(),
        billing.email.as_deref().unwrap_or_default(),
    ]
    .iter()
    .all(|value| value.trim().is_empty())
}

/// Billing data saved on a customer account.
///
/// A blank block clears the saved data. Anything else must be a complete
/// block with a contact email; the tax id stays optional.
///
/// # Errors
///
/// Returns every violated billing field.
pub fn validate_billing_profile(billing: &BillingForm) -> Result<(), ValidationErrors> {
    if billing_is_blank(billing) {
        return Ok(());
    }
    let mut errors = validate_billing(billing);
    errors.check(
        billing.email.as_deref().is_none_or(|email| email.trim().is_empty()),
        FieldError::InvalidBillingEmail,
    );
    errors.into_result()
}

/// Shipping address saved on a customer account. Saved addresses carry no
/// email, so one in the form is ignored.
///
/// # Errors
///
/// Returns every violated address field.
pub fn validate_saved_address(address: &AddressForm) -> Result<(), ValidationErrors> {
    let mut errors = validate_shipping(address);
    errors.0.retain(|error| *error != FieldError::InvalidEmail);
    errors.into_result()
}

/// Validate every section of a checkout submission.
///
/// `authenticated` relaxes the contact email requirement: signed-in
/// customers already have one on their account.
///
/// # Errors
///
/// Returns all violated fields, shipping first, then billing, then the order
/// level checks.
pub fn validate_checkout(form: &CheckoutForm, authenticated: bool) -> Result<(), ValidationErrors> {
    let mut errors = validate_shipping(&form.shipping);

    if form.need_invoice {
        match &form.billing {
            Some(billing) => errors.extend(validate_billing(billing)),
            None => errors.push(FieldError::MissingBillingData),
        }
    }

    errors.check(!form.terms_accepted, FieldError::TermsNotAccepted);
    errors.check(char_len(&form.notes) > MAX_NOTES, FieldError::NotesTooLong);
    errors.check(
        !authenticated && form.contact_email().is_none(),
        FieldError::MissingEmail,
    );
    errors.check(
        form.payment_method_id.is_none(),
        FieldError::InvalidPaymentMethod,
    );

    errors.into_result()
}
