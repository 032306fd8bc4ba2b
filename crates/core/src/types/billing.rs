//! Invoice shapes.

use serde::{Deserialize, Serialize};

/// Which shape an order invoice takes.
///
/// Company invoices carry the submitted billing block (name, tax id, billing
/// address). Personal invoices are derived from the shipping address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "invoice_kind", rename_all = "snake_case")
)]
pub enum InvoiceKind {
    Personal,
    Company,
}

impl InvoiceKind {
    /// Pick the shape from the checkout "need invoice" flag.
    #[must_use]
    pub const fn from_invoice_flag(need_invoice: bool) -> Self {
        if need_invoice { Self::Company } else { Self::Personal }
    }
}

impl std::fmt::Display for InvoiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Personal => write!(f, "personal"),
            Self::Company => write!(f, "company"),
        }
    }
}
