//! Customer panel route handlers.
//!
//! Every handler takes [`RequireUser`] first, so anonymous requests are
//! turned away before a database connection is taken.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use emporium_core::InvoiceKind;
use emporium_core::checkout::{AddressForm, BillingForm};

use crate::context::RequestContext;
use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user};
use crate::extract::JsonBody;
use crate::middleware::{RequireUser, clear_current_user, refresh_current_user};
use crate::models::{AccountDetails, BillingData, CurrentUser, SavedShippingAddress};
use crate::services::account::{AccountForm, AccountService, ChangePasswordForm};
use crate::state::AppState;

/// Saved billing data with the invoice shape it produces.
#[derive(Debug, Serialize)]
pub struct BillingDetails {
    pub kind: Option<InvoiceKind>,
    #[serde(flatten)]
    pub data: BillingData,
}

impl From<BillingData> for BillingDetails {
    fn from(data: BillingData) -> Self {
        Self {
            kind: data.kind(),
            data,
        }
    }
}

/// Response of adding an address.
#[derive(Debug, Serialize)]
pub struct AddressCreated {
    pub uuid: Uuid,
}

fn account_service(state: &AppState) -> AccountService<'_> {
    let config = state.config();
    AccountService::new(&config.auth, &config.email)
}

/// Account data of the signed-in customer.
#[instrument(skip_all, fields(user = %user.id))]
pub async fn account(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
) -> Result<Json<AccountDetails>> {
    let details = account_service(&state).account(&mut ctx.store, user.id).await?;
    Ok(Json(details))
}

/// Change name and phone. The session keeps the new display name.
#[instrument(skip_all, fields(user = %user.id))]
pub async fn update_account(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
    session: Session,
    JsonBody(form): JsonBody<AccountForm>,
) -> Result<Json<CurrentUser>> {
    let updated = account_service(&state)
        .update_account(&mut ctx.store, user.id, &form)
        .await?;

    refresh_current_user(&session, &updated).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to update session");
        AppError::internal(e.to_string())
    })?;
    Ok(Json(updated))
}

/// Saved billing data; blank fields when none is saved.
#[instrument(skip_all, fields(user = %user.id))]
pub async fn billing(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
) -> Result<Json<BillingDetails>> {
    let data = account_service(&state).billing(&mut ctx.store, user.id).await?;
    Ok(Json(data.into()))
}

/// Replace the billing data. An all-blank body clears it.
#[instrument(skip_all, fields(user = %user.id))]
pub async fn update_billing(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
    JsonBody(form): JsonBody<BillingForm>,
) -> Result<Json<BillingDetails>> {
    let data = account_service(&state)
        .update_billing(&mut ctx.store, user.id, &form)
        .await?;
    Ok(Json(data.into()))
}

/// Saved shipping addresses.
#[instrument(skip_all, fields(user = %user.id))]
pub async fn addresses(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
) -> Result<Json<Vec<SavedShippingAddress>>> {
    let list = account_service(&state).addresses(&mut ctx.store, user.id).await?;
    Ok(Json(list))
}

#[instrument(skip_all, fields(user = %user.id))]
pub async fn add_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
    JsonBody(form): JsonBody<AddressForm>,
) -> Result<impl IntoResponse> {
    let uuid = account_service(&state)
        .add_address(&mut ctx.store, user.id, &form)
        .await?;
    Ok((StatusCode::CREATED, Json(AddressCreated { uuid })))
}

#[instrument(skip_all, fields(user = %user.id, address = %address))]
pub async fn address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
    Path(address): Path<Uuid>,
) -> Result<Json<SavedShippingAddress>> {
    let saved = account_service(&state)
        .address(&mut ctx.store, user.id, address)
        .await?;
    Ok(Json(saved))
}

#[instrument(skip_all, fields(user = %user.id, address = %address))]
pub async fn edit_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
    Path(address): Path<Uuid>,
    JsonBody(form): JsonBody<AddressForm>,
) -> Result<StatusCode> {
    account_service(&state)
        .edit_address(&mut ctx.store, user.id, address, &form)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all, fields(user = %user.id, address = %address))]
pub async fn delete_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
    Path(address): Path<Uuid>,
) -> Result<StatusCode> {
    account_service(&state)
        .delete_address(&mut ctx.store, user.id, address)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change the password and end the session.
///
/// The cart stays on the account and comes back at the next login.
#[instrument(skip_all, fields(user = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut ctx: RequestContext,
    session: Session,
    JsonBody(form): JsonBody<ChangePasswordForm>,
) -> Result<StatusCode> {
    account_service(&state)
        .change_password(&mut ctx.store, &mut ctx.queue, user.id, &form)
        .await?;

    clear_current_user(&session).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to clear session");
        AppError::internal(e.to_string())
    })?;
    clear_sentry_user();
    add_breadcrumb("auth", "Password changed", None);
    Ok(StatusCode::NO_CONTENT)
}
