//! Catalog browsing: category listings and product pages.
//!
//! Listing counts are cached per [`ProductFilter`] for a minute; the page
//! itself is always read fresh.

use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use emporium_core::category::{Category, CategoryError, CategoryTree};
use emporium_core::checkout::pricing::MONEY_SCALE;
use emporium_core::preferences::{Availability, PreferenceOptions, Preferences, SortOption};
use emporium_core::slug::{product_id_from_slug, product_slug};
use emporium_core::{CategoryId, ProductId};

use crate::db::RepositoryError;
use crate::models::{Product, ProductFilter};
use crate::store::CatalogStore;

/// Product counts keyed by filter.
pub type CountCache = Cache<ProductFilter, i64>;

/// Build the listing count cache (60 second TTL).
#[must_use]
pub fn count_cache() -> CountCache {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(60))
        .build()
}

#[derive(Debug, Error)]
pub enum ShopError {
    /// Unknown slug, or a page past the end.
    #[error("not found")]
    NotFound,

    #[error("category tree inconsistent: {0}")]
    Category(#[from] CategoryError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Listing query string. `s` is the 1-based page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQuery {
    pub s: Option<u32>,
    pub sort: Option<String>,
    pub per_page: Option<u32>,
    pub availability: Option<String>,
}

impl ListingQuery {
    /// Apply query overrides on top of the cookie preferences.
    ///
    /// An override that is unknown or not enabled is ignored.
    #[must_use]
    pub fn apply(&self, preferences: Preferences, options: &PreferenceOptions) -> Preferences {
        let mut result = preferences;
        let try_override = |next: Preferences, current: &mut Preferences| {
            if options.accepts(&next) {
                *current = next;
            }
        };

        if let Some(sort) = self.sort.as_deref().and_then(|s| s.parse::<SortOption>().ok()) {
            try_override(Preferences { sort, ..result }, &mut result);
        }
        if let Some(page_size) = self.per_page {
            try_override(Preferences { page_size, ..result }, &mut result);
        }
        if let Some(availability) = self
            .availability
            .as_deref()
            .and_then(|a| a.parse::<Availability>().ok())
        {
            try_override(
                Preferences {
                    availability,
                    ..result
                },
                &mut result,
            );
        }
        result
    }
}

/// One product card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub price_gross: Decimal,
    pub in_stock: bool,
}

impl From<&Product> for ProductSummary {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id,
            slug: product_slug(&product.name, product.id),
            name: product.name.clone(),
            price_gross: product.price_gross().round_dp(MONEY_SCALE),
            in_stock: product.in_stock(),
        }
    }
}

/// A listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    /// Resolved categories, root first.
    pub categories: Vec<Category>,
    /// Direct children of the deepest resolved category (roots when
    /// unscoped), for navigation.
    pub subcategories: Vec<Category>,
    pub products: Vec<ProductSummary>,
    pub page: u32,
    pub pages: u32,
    pub total: i64,
    pub preferences: Preferences,
}

/// A product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub summary: ProductSummary,
    pub description: String,
    pub stock: i32,
    /// Category path, root first.
    pub categories: Vec<Category>,
}

/// List one page of products under a category slug path.
///
/// # Errors
///
/// `NotFound` when any given segment does not resolve or `page` is past the
/// last page.
pub async fn list_products<S: CatalogStore>(
    store: &mut S,
    tree: &CategoryTree,
    counts: &CountCache,
    path: &[&str],
    preferences: Preferences,
    page: u32,
) -> Result<Listing, ShopError> {
    let resolved = match path {
        [] => Vec::new(),
        [first, rest @ ..] if rest.len() < 3 => {
            tree.resolve_slug_path(first, rest.first().copied(), rest.get(1).copied())
        }
        _ => return Err(ShopError::NotFound),
    };
    if resolved.len() != path.len() {
        return Err(ShopError::NotFound);
    }

    let filter = ProductFilter::new(tree.descendant_ids(&resolved).ids(), &preferences);
    let total = match counts.get(&filter).await {
        Some(total) => total,
        None => {
            let total = store.count_products(&filter).await?;
            counts.insert(filter.clone(), total).await;
            total
        }
    };

    let page_size = i64::from(preferences.page_size.max(1));
    let pages = u32::try_from(((total + page_size - 1) / page_size).max(1)).unwrap_or(u32::MAX);
    if page == 0 || page > pages {
        return Err(ShopError::NotFound);
    }

    let offset = i64::from(page - 1) * page_size;
    let products = store
        .list_products(&filter, preferences.sort, page_size, offset)
        .await?;

    let subcategories = match resolved.last() {
        Some(deepest) => tree.children(deepest.id).cloned().collect(),
        None => tree.roots().cloned().collect(),
    };

    Ok(Listing {
        categories: resolved.into_iter().cloned().collect(),
        subcategories,
        products: products.iter().map(ProductSummary::from).collect(),
        page,
        pages,
        total,
        preferences,
    })
}

/// Load a product by its canonical slug.
///
/// # Errors
///
/// `NotFound` when the slug does not name a product or is not its canonical
/// form. `Category` when the product's category chain is broken.
pub async fn product_by_slug<S: CatalogStore>(
    store: &mut S,
    tree: &CategoryTree,
    slug: &str,
) -> Result<ProductDetail, ShopError> {
    let id = product_id_from_slug(slug).ok_or(ShopError::NotFound)?;
    let product = store.product(id).await?.ok_or(ShopError::NotFound)?;
    let summary = ProductSummary::from(&product);
    if summary.slug != slug {
        return Err(ShopError::NotFound);
    }

    let categories = ancestor_path(tree, product.category_id)?;
    Ok(ProductDetail {
        summary,
        description: product.description,
        stock: product.stock,
        categories,
    })
}

fn ancestor_path(tree: &CategoryTree, id: CategoryId) -> Result<Vec<Category>, ShopError> {
    tree.full_ancestor_path(id)
        .map(|path| path.into_iter().cloned().collect())
        .map_err(|e| {
            tracing::error!(error = %e, category = %id, "Category path broken");
            e.into()
        })
}
