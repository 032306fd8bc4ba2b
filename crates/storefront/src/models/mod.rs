//! Domain models for the storefront.
//!
//! Row types derive `sqlx::FromRow` and are read with runtime-checked
//! `query_as` calls in [`crate::db`]. The in-memory test store builds the
//! same types directly.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod session;
pub mod user;

pub use cart::{CartLine, CartLineDetail, CartOwner, CartView};
pub use catalog::{Product, ProductFilter};
pub use order::{
    DraftOrder, NewDraftOrder, NewInvoice, NewOrder, OrderDetails, OrderRecord,
    PaymentMethod,
};
pub use session::CurrentUser;
pub use user::{
    AccountDetails, BillingData, NewShippingAddress, NewUser, ResetToken, SavedShippingAddress,
    UserAccount,
};
