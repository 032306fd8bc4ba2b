//! Decimal money helpers.
//!
//! Prices are stored net with a VAT percentage. Gross amounts are derived on
//! demand and never rounded here; callers round once, at the final sum.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ISO 4217 currency codes accepted by the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    #[default]
    Pln,
    Eur,
    Usd,
    Gbp,
}

impl CurrencyCode {
    /// Three-letter code as written on invoices.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pln => "PLN",
            Self::Eur => "EUR",
            Self::Usd => "USD",
            Self::Gbp => "GBP",
        }
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrounded gross price: `net * (1 + vat_rate / 100)`.
#[must_use]
pub fn gross_price(net: Decimal, vat_rate: Decimal) -> Decimal {
    net * (Decimal::ONE + vat_rate / Decimal::ONE_HUNDRED)
}
