//! Core types for Emporium.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod billing;
pub mod email;
pub mod id;
pub mod money;

pub use billing::InvoiceKind;
pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CurrencyCode, gross_price};
