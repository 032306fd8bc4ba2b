//! Order totals.

use rust_decimal::Decimal;

use super::{DraftLine, ShippingMethod};

/// Scale of every persisted money amount.
pub const MONEY_SCALE: u32 = 2;

/// Sum of unrounded gross line values.
#[must_use]
pub fn products_gross(lines: &[DraftLine]) -> Decimal {
    lines.iter().map(DraftLine::gross_total).sum()
}

/// Amount the customer pays: shipping plus gross products.
///
/// Lines are summed at full precision and the result is rounded to two
/// places once, with banker's rounding. Rounding per line would drift by a
/// cent on larger carts.
#[must_use]
pub fn total_payable(lines: &[DraftLine], shipping: &ShippingMethod) -> Decimal {
    (shipping.cost + products_gross(lines)).round_dp(MONEY_SCALE)
}
