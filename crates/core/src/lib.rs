//! Emporium Core - domain types and pure storefront rules.
//!
//! This crate is shared by every Emporium component:
//! - `storefront` - HTTP server (catalog, cart, checkout, accounts)
//! - `cli` - migrations, expiry sweep and the email queue worker
//!
//! # Architecture
//!
//! The core crate holds types and deterministic rules only - no I/O, no
//! database access, no network clients. Anything that needs a connection
//! lives in the storefront crate and calls into these modules.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, email addresses, money and billing kinds
//! - [`preferences`] - Listing preferences cookie codec
//! - [`category`] - Immutable category tree and slug path resolution
//! - [`checkout`] - Draft snapshots, form validation, totals, order numbers
//! - [`slug`] - URL slugs for product names

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod category;
pub mod checkout;
pub mod preferences;
pub mod slug;
pub mod types;

pub use types::*;
