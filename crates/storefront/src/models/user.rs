//! Account types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use emporium_core::checkout::{AddressForm, BillingForm};
use emporium_core::{Email, InvoiceKind, ShippingAddressId, UserId};

use super::CurrentUser;

/// A registered customer, including the password hash.
///
/// Never serialized; handlers expose [`crate::models::CurrentUser`] instead.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserAccount {
    pub id: UserId,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// What the session stores after login.
    #[must_use]
    pub fn session_user(&self) -> CurrentUser {
        CurrentUser {
            id: self.id,
            email: self.email.clone(),
            name: self.display_name(),
        }
    }
}

/// Account fields a customer can see and edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountDetails {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

impl From<&UserAccount> for AccountDetails {
    fn from(user: &UserAccount) -> Self {
        Self {
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
        }
    }
}

/// Data for inserting a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub password_hash: String,
}

/// A shipping address saved on a customer account, offered at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SavedShippingAddress {
    #[serde(skip)]
    pub id: ShippingAddressId,
    pub uuid: Uuid,
    #[serde(skip)]
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub street: String,
    pub postcode: String,
    pub city: String,
    pub country_code: String,
    pub country: String,
    pub phone: String,
}

/// Address fields written when a customer saves or edits an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShippingAddress {
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub street: String,
    pub postcode: String,
    pub city: String,
    pub country_code: String,
    pub country: String,
    pub phone: String,
}

impl From<&AddressForm> for NewShippingAddress {
    fn from(form: &AddressForm) -> Self {
        Self {
            first_name: form.first_name.trim().to_owned(),
            last_name: form.last_name.trim().to_owned(),
            company_name: form.company_name.trim().to_owned(),
            street: form.street.trim().to_owned(),
            postcode: form.postcode.trim().to_owned(),
            city: form.city.trim().to_owned(),
            country_code: form.country_code.as_deref().unwrap_or_default().trim().to_owned(),
            country: form.country.trim().to_owned(),
            phone: form.phone.trim().to_owned(),
        }
    }
}

/// Billing block saved on an account. Blank strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BillingData {
    pub name: String,
    pub street: String,
    pub postcode: String,
    pub city: String,
    pub country_code: String,
    pub country: String,
    pub tax_id: String,
    pub email: String,
}

impl BillingData {
    /// Invoice shape this data produces; `None` when nothing is saved.
    #[must_use]
    pub fn kind(&self) -> Option<InvoiceKind> {
        if self.name.is_empty() {
            None
        } else if self.tax_id.is_empty() {
            Some(InvoiceKind::Personal)
        } else {
            Some(InvoiceKind::Company)
        }
    }
}

impl From<&BillingForm> for BillingData {
    fn from(form: &BillingForm) -> Self {
        let trimmed = |value: Option<&str>| value.unwrap_or_default().trim().to_owned();
        Self {
            name: form.name.trim().to_owned(),
            street: form.street.trim().to_owned(),
            postcode: form.postcode.trim().to_owned(),
            city: form.city.trim().to_owned(),
            country_code: trimmed(form.country_code.as_deref()),
            country: form.country.trim().to_owned(),
            tax_id: form.tax_id.trim().to_owned(),
            email: trimmed(form.email.as_deref()),
        }
    }
}

/// A password reset token row.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ResetToken {
    pub token: Uuid,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl ResetToken {
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now < self.created_at + ttl
    }
}
