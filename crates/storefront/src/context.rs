//! Per-request context.
//!
//! [`RequestContext`] is extracted once per handler and owns everything a
//! service call needs from the outside world: one pooled Postgres
//! connection, a queue handle, the session user, and the client identity
//! used for cart resolution.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use uuid::Uuid;

use crate::cookies;
use crate::db::PgStore;
use crate::error::AppError;
use crate::lock::client_key;
use crate::middleware::auth::current_user;
use crate::middleware::client_ip;
use crate::models::{CartOwner, CurrentUser};
use crate::queue::RedisEmailQueue;
use crate::services::identity::{self, IdentityRequest, Resolution};
use crate::state::AppState;

/// Everything a handler needs to call into the services.
pub struct RequestContext {
    pub store: PgStore,
    pub queue: RedisEmailQueue,
    pub user: Option<CurrentUser>,
    /// Value of the cart cookie, if it held a UUID.
    pub cart_token: Option<Uuid>,
    pub client_address: String,
    pub user_agent: String,
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let store = PgStore::acquire(state.pool()).await?;

        Ok(Self {
            store,
            queue: state.email_queue(),
            user: current_user(parts).await,
            cart_token: cookies::cart_token(&parts.headers, &state.config().cookies.cart),
            client_address: client_ip(&parts.headers, &parts.extensions)
                .map(|ip| ip.to_string())
                .unwrap_or_default(),
            user_agent: user_agent(&parts.headers),
        })
    }
}

impl RequestContext {
    /// The cart this request addresses, if any identity is known.
    #[must_use]
    pub fn cart_owner(&self) -> Option<CartOwner> {
        CartOwner::from_parts(self.user.as_ref().map(|u| u.id), self.cart_token)
    }

    /// Run cart identity resolution for this request.
    ///
    /// A minted token also becomes this context's cart token, so later
    /// calls in the same handler address the new cart.
    pub async fn resolve_cart(&mut self, state: &AppState) -> Resolution {
        let lock_key = client_key(&self.client_address, &self.user_agent);
        let request = IdentityRequest {
            user: self.user.as_ref().map(|u| u.id),
            cart_token: self.cart_token,
            lock_key: &lock_key,
        };
        let mut lock = state.dedup_lock();

        let resolution = identity::resolve(
            &mut self.store,
            &mut lock,
            request,
            state.config().cart.lock_ttl,
        )
        .await;
        if let Some(token) = resolution.minted_token() {
            self.cart_token = Some(token);
        }
        resolution
    }
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}
