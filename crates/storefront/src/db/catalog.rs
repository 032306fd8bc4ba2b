//! Catalog queries.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use emporium_core::category::Category;
use emporium_core::preferences::SortOption;
use emporium_core::ProductId;

use super::{PgStore, RepositoryError};
use crate::models::{Product, ProductFilter};
use crate::store::CatalogStore;

const PRODUCT_COLUMNS: &str =
    "id, category_id, name, description, price_net, vat_rate, stock, created_at";

/// Gross unit price expression, compared against the price filter.
const GROSS_PRICE: &str = "price_net * (1 + vat_rate / 100)";

/// Load every category for the startup snapshot.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn load_categories(pool: &PgPool) -> Result<Vec<Category>, RepositoryError> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, parent_id, slug, name FROM categories ORDER BY parent_id NULLS FIRST, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(categories)
}

/// `ORDER BY` clause for a sort option. Ties break on id so pages are stable.
const fn order_by(sort: SortOption) -> &'static str {
    match sort {
        SortOption::PriceAsc => " ORDER BY price_net * (1 + vat_rate / 100) ASC, id ASC",
        SortOption::PriceDesc => " ORDER BY price_net * (1 + vat_rate / 100) DESC, id ASC",
        SortOption::NameAsc => " ORDER BY name ASC, id ASC",
        SortOption::NameDesc => " ORDER BY name DESC, id ASC",
        SortOption::Newest => " ORDER BY created_at DESC, id DESC",
    }
}

/// Append the `WHERE` clause for `filter`, binding every value.
fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    query.push(" WHERE TRUE");
    if let Some(ids) = &filter.category_ids {
        query.push(" AND category_id = ANY(");
        query.push_bind(ids.clone());
        query.push(")");
    }
    if filter.in_stock_only {
        query.push(" AND stock > 0");
    }
    if let Some(range) = filter.price_range {
        query.push(" AND ");
        query.push(GROSS_PRICE);
        query.push(" BETWEEN ");
        query.push_bind(Decimal::from(range.low()));
        query.push(" AND ");
        query.push_bind(Decimal::from(range.high()));
    }
}

impl CatalogStore for PgStore {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(product)
    }

    async fn count_products(&mut self, filter: &ProductFilter) -> Result<i64, RepositoryError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filter(&mut query, filter);

        let count = query
            .build_query_scalar::<i64>()
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }

    async fn list_products(
        &mut self,
        filter: &ProductFilter,
        sort: SortOption,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT ");
        query.push(PRODUCT_COLUMNS);
        query.push(" FROM products");
        push_filter(&mut query, filter);
        query.push(order_by(sort));
        query.push(" LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let products = query
            .build_query_as::<Product>()
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(products)
    }
}
