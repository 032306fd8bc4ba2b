//! Customer panel.
//!
//! A signed-in customer can edit their name and phone, keep one billing
//! block for invoices, manage saved shipping addresses offered at checkout,
//! and change their password. Every call is scoped to the session user; an
//! address uuid belonging to someone else reads as missing.

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use emporium_core::UserId;
use emporium_core::checkout::{
    AddressForm, BillingForm, ValidationErrors, billing_is_blank, validate_billing_profile,
    validate_saved_address,
};

use crate::config::{AuthConfig, EmailConfig};
use crate::db::RepositoryError;
use crate::models::{
    AccountDetails, BillingData, CurrentUser, NewShippingAddress, SavedShippingAddress,
    UserAccount,
};
use crate::queue::{EmailJob, EmailQueue, EmailTemplate};
use crate::services::auth::{AuthService, hash_password, personal_data_violations, verify_password};
use crate::store::AccountStore;

/// Account data request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountForm {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// Change-password request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Error)]
pub enum AccountError {
    /// The session user no longer exists.
    #[error("account not found")]
    AccountNotFound,

    #[error("shipping address not found")]
    AddressNotFound,

    /// Form fields failed validation; carries every violated key.
    #[error("validation failed: {0:?}")]
    Validation(Vec<&'static str>),

    #[error("old password does not match")]
    InvalidOldPassword,

    #[error("password hashing error")]
    PasswordHash,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl AccountError {
    /// Message keys sent to the client.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        match self {
            Self::AccountNotFound => vec!["account_not_found"],
            Self::AddressNotFound => vec!["shipping_address_not_found"],
            Self::Validation(keys) => keys.clone(),
            Self::InvalidOldPassword => vec!["invalid_old_password"],
            Self::PasswordHash | Self::Repository(_) => vec!["internal_error"],
        }
    }
}

impl From<ValidationErrors> for AccountError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors.into_iter().map(|e| e.key()).collect())
    }
}

/// Customer panel service.
pub struct AccountService<'a> {
    auth: AuthService<'a>,
    email: &'a EmailConfig,
}

impl<'a> AccountService<'a> {
    #[must_use]
    pub const fn new(settings: &'a AuthConfig, email: &'a EmailConfig) -> Self {
        Self {
            auth: AuthService::new(settings, email),
            email,
        }
    }

    // =========================================================================
    // Account data
    // =========================================================================

    /// # Errors
    ///
    /// `AccountNotFound` when the session user is gone.
    pub async fn account<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
    ) -> Result<AccountDetails, AccountError> {
        let account = load_account(store, user).await?;
        Ok(AccountDetails::from(&account))
    }

    /// Update name and phone. Returns the refreshed session user.
    ///
    /// # Errors
    ///
    /// `Validation` with every violated field, `AccountNotFound` when the
    /// session user is gone.
    pub async fn update_account<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
        form: &AccountForm,
    ) -> Result<CurrentUser, AccountError> {
        let violations = personal_data_violations(&form.first_name, &form.last_name, &form.phone);
        if !violations.is_empty() {
            return Err(AccountError::Validation(violations));
        }

        store
            .update_account(
                user,
                form.first_name.trim(),
                form.last_name.trim(),
                form.phone.trim(),
            )
            .await
            .map_err(not_found_as(AccountError::AccountNotFound))?;
        tracing::info!(user = %user, "Account data changed");

        Ok(load_account(store, user).await?.session_user())
    }

    // =========================================================================
    // Billing data
    // =========================================================================

    /// Saved billing block; blank when none was ever saved.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub async fn billing<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
    ) -> Result<BillingData, AccountError> {
        Ok(store.billing_data(user).await?.unwrap_or_default())
    }

    /// Replace the billing block. A blank form clears it.
    ///
    /// # Errors
    ///
    /// `Validation` with every violated billing field.
    pub async fn update_billing<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
        form: &BillingForm,
    ) -> Result<BillingData, AccountError> {
        validate_billing_profile(form)?;

        let data = if billing_is_blank(form) {
            BillingData::default()
        } else {
            BillingData::from(form)
        };
        store.update_billing_data(user, &data).await?;
        tracing::info!(user = %user, kind = ?data.kind(), "Billing data changed");
        Ok(data)
    }

    // =========================================================================
    // Shipping addresses
    // =========================================================================

    /// # Errors
    ///
    /// Storage errors only.
    pub async fn addresses<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
    ) -> Result<Vec<SavedShippingAddress>, AccountError> {
        Ok(store.shipping_addresses(user).await?)
    }

    /// # Errors
    ///
    /// `AddressNotFound` unless `uuid` is an address of `user`.
    pub async fn address<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
        uuid: Uuid,
    ) -> Result<SavedShippingAddress, AccountError> {
        store
            .shipping_address(user, uuid)
            .await?
            .ok_or(AccountError::AddressNotFound)
    }

    /// Save a new address and return its uuid.
    ///
    /// # Errors
    ///
    /// `Validation` with every violated address field.
    pub async fn add_address<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
        form: &AddressForm,
    ) -> Result<Uuid, AccountError> {
        validate_saved_address(form)?;

        let uuid = Uuid::new_v4();
        store
            .insert_shipping_address(user, uuid, &NewShippingAddress::from(form))
            .await?;
        tracing::info!(user = %user, address = %uuid, "Shipping address added");
        Ok(uuid)
    }

    /// # Errors
    ///
    /// `Validation` with every violated address field, `AddressNotFound`
    /// unless `uuid` is an address of `user`.
    pub async fn edit_address<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
        uuid: Uuid,
        form: &AddressForm,
    ) -> Result<(), AccountError> {
        validate_saved_address(form)?;

        if !store
            .update_shipping_address(user, uuid, &NewShippingAddress::from(form))
            .await?
        {
            return Err(AccountError::AddressNotFound);
        }
        tracing::info!(user = %user, address = %uuid, "Shipping address updated");
        Ok(())
    }

    /// # Errors
    ///
    /// `AddressNotFound` unless `uuid` is an address of `user`.
    pub async fn delete_address<S: AccountStore>(
        &self,
        store: &mut S,
        user: UserId,
        uuid: Uuid,
    ) -> Result<(), AccountError> {
        if !store.delete_shipping_address(user, uuid).await? {
            return Err(AccountError::AddressNotFound);
        }
        tracing::info!(user = %user, address = %uuid, "Shipping address deleted");
        Ok(())
    }

    // =========================================================================
    // Password
    // =========================================================================

    /// Check the old password, store the new one and mail a notice.
    ///
    /// Outstanding reset tokens are dropped. The caller ends the session.
    ///
    /// # Errors
    ///
    /// `InvalidOldPassword` before anything else is checked, then
    /// `Validation` for a rejected or unconfirmed new password.
    pub async fn change_password<S, Q>(
        &self,
        store: &mut S,
        queue: &mut Q,
        user: UserId,
        form: &ChangePasswordForm,
    ) -> Result<(), AccountError>
    where
        S: AccountStore,
        Q: EmailQueue,
    {
        let account = load_account(store, user).await?;
        verify_password(&form.old_password, &account.password_hash)
            .map_err(|_| AccountError::InvalidOldPassword)?;

        let mut violations = self.auth.password_violations(&form.new_password);
        if form.new_password != form.new_password_confirm {
            violations.push("password_confirmation_mismatch");
        }
        if !violations.is_empty() {
            return Err(AccountError::Validation(violations));
        }

        let hash =
            hash_password(&form.new_password).map_err(|_| AccountError::PasswordHash)?;
        store
            .update_password(user, &hash)
            .await
            .map_err(not_found_as(AccountError::AccountNotFound))?;
        store.delete_reset_tokens(user).await?;
        tracing::info!(user = %user, "Password changed");

        let job = EmailJob::new(
            EmailTemplate::NewPassword,
            format!("{}: password changed", self.email.shop_name),
            account.email.as_str(),
        )
        .with_field("name", account.display_name());
        if let Err(e) = queue.enqueue(&job).await {
            tracing::warn!(error = %e, user = %user, "Password change email not queued");
        }
        Ok(())
    }
}

async fn load_account<S: AccountStore>(
    store: &mut S,
    user: UserId,
) -> Result<UserAccount, AccountError> {
    store
        .user_by_id(user)
        .await?
        .ok_or(AccountError::AccountNotFound)
}

fn not_found_as(error: AccountError) -> impl FnOnce(RepositoryError) -> AccountError {
    move |e| match e {
        RepositoryError::NotFound => error,
        other => AccountError::Repository(other),
    }
}
