//! Long-lived client cookies: the anonymous cart token and the shop
//! listing preferences.
//!
//! Both are plain values outside the session so that they survive session
//! expiry and logout.

use axum::http::{HeaderMap, HeaderValue, header};
use tower_sessions::cookie::time::Duration;
use tower_sessions::cookie::{Cookie, SameSite};
use uuid::Uuid;

/// Ten years, in the cookie crate's duration type.
const LONG_LIVED: Duration = Duration::days(3650);

/// Read a cookie value by name from the request headers.
#[must_use]
pub fn read<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// The cart token from the cart cookie. Unparseable values read as absent.
#[must_use]
pub fn cart_token(headers: &HeaderMap, name: &str) -> Option<Uuid> {
    read(headers, name).and_then(|raw| Uuid::parse_str(raw).ok())
}

/// `Set-Cookie` for a freshly minted cart token.
#[must_use]
pub fn cart_cookie(name: &str, token: Uuid, secure: bool) -> Option<HeaderValue> {
    build(
        Cookie::build((name.to_owned(), token.to_string()))
            .http_only(true)
            .secure(secure),
    )
}

/// `Set-Cookie` for the encoded listing preferences.
#[must_use]
pub fn preferences_cookie(name: &str, encoded: String, secure: bool) -> Option<HeaderValue> {
    build(Cookie::build((name.to_owned(), encoded)).secure(secure))
}

fn build(cookie: tower_sessions::cookie::CookieBuilder<'static>) -> Option<HeaderValue> {
    let cookie = cookie
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(LONG_LIVED)
        .build();
    HeaderValue::from_str(&cookie.to_string())
        .inspect_err(|e| tracing::error!(error = %e, "Unencodable cookie"))
        .ok()
}
