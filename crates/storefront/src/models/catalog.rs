//! Catalog types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use emporium_core::preferences::{Availability, PriceRange, Preferences};
use emporium_core::{CategoryId, ProductId, gross_price};

/// A product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub price_net: Decimal,
    /// VAT in percent.
    pub vat_rate: Decimal,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Unrounded unit gross price.
    #[must_use]
    pub fn price_gross(&self) -> Decimal {
        gross_price(self.price_net, self.vat_rate)
    }

    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// Filter shared by the listing query and its count.
///
/// Used as the product-count cache key, so it must stay cheap to hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductFilter {
    /// `None` for an unscoped listing.
    pub category_ids: Option<Vec<CategoryId>>,
    pub in_stock_only: bool,
    /// Bounds on the unit gross price, in whole currency units.
    pub price_range: Option<PriceRange>,
}

impl ProductFilter {
    #[must_use]
    pub fn new(category_ids: Option<Vec<CategoryId>>, preferences: &Preferences) -> Self {
        Self {
            category_ids,
            in_stock_only: preferences.availability == Availability::InStock,
            price_range: preferences.price_range,
        }
    }

    /// Whether `product` passes the filter.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let in_scope = self
            .category_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&product.category_id));
        let in_range = self.price_range.is_none_or(|range| {
            let gross = product.price_gross();
            gross >= Decimal::from(range.low()) && gross <= Decimal::from(range.high())
        });
        in_scope && in_range && (!self.in_stock_only || product.in_stock())
    }
}
