//! Cart types.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use emporium_core::checkout::pricing::MONEY_SCALE;
use emporium_core::{ProductId, UserId, gross_price};

/// Whose cart a request refers to.
///
/// A logged-in user always addresses their own cart, even when a cart cookie
/// is also present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartOwner {
    User(UserId),
    Anonymous(Uuid),
}

impl CartOwner {
    /// Pick the owner from the session user and the cart cookie.
    #[must_use]
    pub fn from_parts(user: Option<UserId>, token: Option<Uuid>) -> Option<Self> {
        user.map(Self::User).or_else(|| token.map(Self::Anonymous))
    }
}

/// A raw `(product, quantity)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// A cart line joined with its product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CartLineDetail {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i32,
    pub price_net: Decimal,
    pub vat_rate: Decimal,
    pub stock: i32,
}

impl CartLineDetail {
    /// Gross value of the line, rounded for display.
    #[must_use]
    pub fn gross_total(&self) -> Decimal {
        (gross_price(self.price_net, self.vat_rate) * Decimal::from(self.quantity))
            .round_dp(MONEY_SCALE)
    }
}

/// Line as rendered in the cart view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartViewLine {
    #[serde(flatten)]
    pub line: CartLineDetail,
    pub gross_total: Decimal,
}

/// Cart contents with display totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartViewLine>,
    pub item_count: i64,
    /// Display total; the payable amount is computed at finalize.
    pub products_gross: Decimal,
}

impl CartView {
    #[must_use]
    pub fn from_lines(lines: Vec<CartLineDetail>) -> Self {
        let item_count = lines.iter().map(|l| i64::from(l.quantity)).sum();
        let products_gross = lines
            .iter()
            .map(|l| gross_price(l.price_net, l.vat_rate) * Decimal::from(l.quantity))
            .sum::<Decimal>()
            .round_dp(MONEY_SCALE);
        let lines = lines
            .into_iter()
            .map(|line| CartViewLine {
                gross_total: line.gross_total(),
                line,
            })
            .collect();
        Self {
            lines,
            item_count,
            products_gross,
        }
    }
}
