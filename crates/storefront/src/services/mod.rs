//! Business logic for the storefront.
//!
//! Services are plain functions (or small config-holding structs) generic
//! over the store traits in [`crate::store`], the [`crate::queue::EmailQueue`]
//! and the [`crate::lock::DedupLock`]. Route handlers pass the request's
//! [`crate::db::PgStore`]; unit tests pass the in-memory store.
//!
//! - `identity` - make sure the request's cart exists
//! - `cart` - add, edit, remove and view lines
//! - `migration` - move cart lines across login and logout
//! - `draft` - snapshot a cart into a draft order
//! - `finalize` - turn a draft into an order
//! - `auth` - accounts, login, password reset
//! - `account` - the customer panel: account and billing data, saved
//!   addresses, password change
//! - `shop` - catalog listings and product pages

pub mod account;
pub mod auth;
pub mod cart;
pub mod draft;
pub mod finalize;
pub mod identity;
pub mod migration;
pub mod shop;
