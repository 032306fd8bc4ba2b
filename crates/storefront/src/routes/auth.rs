//! Authentication route handlers.
//!
//! Login and registration move the anonymous cart onto the user's cart;
//! logout moves it back so the browser keeps what it had.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tower_sessions::Session;
use tracing::instrument;

use crate::context::RequestContext;
use crate::cookies;
use crate::error::{AppError, Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::extract::JsonBody;
use crate::middleware::{clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::auth::{
    AuthService, ForgotPasswordForm, LoginForm, NewPasswordForm, RegisterForm,
};
use crate::services::identity::{ensure_anonymous_cart, ensure_user_cart};
use crate::services::migration::{self, MigrationDirection};
use crate::state::AppState;

fn auth_service(state: &AppState) -> AuthService<'_> {
    let config = state.config();
    AuthService::new(&config.auth, &config.email)
}

/// Put the user in the session after moving the cookie cart onto theirs.
async fn sign_in(ctx: &mut RequestContext, session: &Session, user: &CurrentUser) -> Result<()> {
    if let Some(token) = ctx.cart_token {
        match ensure_user_cart(&mut ctx.store, user.id).await {
            Ok(_) => {
                let result = migration::migrate(
                    &mut ctx.store,
                    MigrationDirection::CookieToUser,
                    user.id,
                    token,
                )
                .await;
                if !result.is_success() {
                    tracing::warn!(user = %user.id, ?result, "Cart not moved on login");
                }
            }
            Err(e) => tracing::error!(error = %e, user = %user.id, "User cart unavailable"),
        }
    }

    set_current_user(session, user).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to set session");
        AppError::internal(e.to_string())
    })?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    add_breadcrumb("auth", "Signed in", None);
    Ok(())
}

/// Email and password login.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    session: Session,
    JsonBody(form): JsonBody<LoginForm>,
) -> Result<Json<CurrentUser>> {
    let user = auth_service(&state).login(&mut ctx.store, &form).await?;
    sign_in(&mut ctx, &session, &user).await?;
    tracing::info!(user = %user.id, "Customer logged in");
    Ok(Json(user))
}

/// Create an account and sign it in.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    session: Session,
    JsonBody(form): JsonBody<RegisterForm>,
) -> Result<impl IntoResponse> {
    let user = auth_service(&state)
        .register(&mut ctx.store, &mut ctx.queue, &form)
        .await?;
    sign_in(&mut ctx, &session, &user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Start a password reset. Answers the same whether or not the email is
/// registered.
#[instrument(skip_all)]
pub async fn forgot_password(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    JsonBody(form): JsonBody<ForgotPasswordForm>,
) -> Result<StatusCode> {
    auth_service(&state)
        .forgot_password(&mut ctx.store, &mut ctx.queue, &form, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set a new password with a reset token.
#[instrument(skip_all)]
pub async fn new_password(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    JsonBody(form): JsonBody<NewPasswordForm>,
) -> Result<StatusCode> {
    auth_service(&state)
        .reset_password(&mut ctx.store, &mut ctx.queue, &form, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Log out, leaving the user's cart contents in the browser's cart.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    session: Session,
) -> Result<Response> {
    let mut minted = None;

    if let Some(user) = ctx.user.take() {
        match ensure_anonymous_cart(&mut ctx.store, ctx.cart_token).await {
            Ok((token, is_new)) => {
                let result = migration::migrate(
                    &mut ctx.store,
                    MigrationDirection::UserToCookie,
                    user.id,
                    token,
                )
                .await;
                if !result.is_success() {
                    tracing::warn!(user = %user.id, ?result, "Cart not moved on logout");
                }
                if is_new {
                    minted = Some(token);
                }
            }
            Err(e) => tracing::error!(error = %e, user = %user.id, "Anonymous cart unavailable"),
        }
        tracing::info!(user = %user.id, "Customer logged out");
    }

    clear_current_user(&session).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to clear session");
        AppError::internal(e.to_string())
    })?;
    clear_sentry_user();

    let mut response = StatusCode::NO_CONTENT.into_response();
    let config = &state.config().cookies;
    if let Some(cookie) =
        minted.and_then(|token| cookies::cart_cookie(&config.cart, token, config.secure))
    {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Ok(response)
}
