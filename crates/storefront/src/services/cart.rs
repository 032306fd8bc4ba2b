//! Cart mutations.
//!
//! Stock is checked against the product row at the time of the call, never
//! reserved. Two concurrent requests can still oversell; the finalizer does
//! not re-check either.

use thiserror::Error;

use emporium_core::{CartId, ProductId};

use crate::db::RepositoryError;
use crate::models::{CartOwner, CartView};
use crate::store::{CartStore, CatalogStore};

/// Cart operation failures.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("cart not found")]
    CartNotFound,

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("quantity must be at least 1 (got {0})")]
    InvalidQuantity(i32),

    #[error("only {available} of product {product} in stock, {requested} requested")]
    InsufficientStock {
        product: ProductId,
        requested: i64,
        available: i32,
    },

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl CartError {
    /// Message key sent to the client.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::CartNotFound => "cart_not_found",
            Self::ProductNotFound(_) => "product_not_found",
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Repository(_) => "internal_error",
        }
    }
}

/// Add `quantity` of a product, on top of any quantity already in the cart.
///
/// Returns the new line quantity.
///
/// # Errors
///
/// `ProductNotFound`, `InvalidQuantity` when `quantity < 1`,
/// `CartNotFound`, or `InsufficientStock` when the resulting quantity
/// exceeds stock. The cart is untouched on error.
pub async fn add_item<S>(
    store: &mut S,
    owner: CartOwner,
    product: ProductId,
    quantity: i32,
) -> Result<i32, CartError>
where
    S: CartStore + CatalogStore,
{
    let stock = product_stock(store, product).await?;
    check_quantity(quantity)?;
    let cart = cart_of(store, owner).await?;

    let existing = store.line_quantity(cart, product).await?.unwrap_or(0);
    let wanted = i64::from(existing) + i64::from(quantity);
    let total = within_stock(product, wanted, stock)?;

    store.set_line_quantity(cart, product, total).await?;
    tracing::debug!(%cart, %product, quantity = total, "Cart line added");
    Ok(total)
}

/// Set a line to an absolute quantity.
///
/// # Errors
///
/// Same as [`add_item`], checked against `quantity` alone.
pub async fn edit_item<S>(
    store: &mut S,
    owner: CartOwner,
    product: ProductId,
    quantity: i32,
) -> Result<i32, CartError>
where
    S: CartStore + CatalogStore,
{
    let stock = product_stock(store, product).await?;
    check_quantity(quantity)?;
    let cart = cart_of(store, owner).await?;
    let quantity = within_stock(product, i64::from(quantity), stock)?;

    store.set_line_quantity(cart, product, quantity).await?;
    tracing::debug!(%cart, %product, quantity, "Cart line edited");
    Ok(quantity)
}

/// Remove a line. Removing a product that is not in the cart still stamps
/// the cart.
///
/// # Errors
///
/// `CartNotFound` or a storage error.
pub async fn remove_item<S: CartStore>(
    store: &mut S,
    owner: CartOwner,
    product: ProductId,
) -> Result<(), CartError> {
    let cart = cart_of(store, owner).await?;
    store.remove_line(cart, product).await?;
    tracing::debug!(%cart, %product, "Cart line removed");
    Ok(())
}

/// Cart contents with product data and display totals.
///
/// # Errors
///
/// `CartNotFound` or a storage error.
pub async fn view<S: CartStore>(store: &mut S, owner: CartOwner) -> Result<CartView, CartError> {
    let cart = cart_of(store, owner).await?;
    let lines = store.line_details(cart).await?;
    Ok(CartView::from_lines(lines))
}

pub(crate) async fn cart_of<S: CartStore>(
    store: &mut S,
    owner: CartOwner,
) -> Result<CartId, CartError> {
    store.find_cart(owner).await?.ok_or(CartError::CartNotFound)
}

async fn product_stock<S: CatalogStore>(store: &mut S, product: ProductId) -> Result<i32, CartError> {
    store
        .product(product)
        .await?
        .map(|p| p.stock)
        .ok_or(CartError::ProductNotFound(product))
}

const fn check_quantity(quantity: i32) -> Result<(), CartError> {
    if quantity < 1 {
        return Err(CartError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn within_stock(product: ProductId, wanted: i64, stock: i32) -> Result<i32, CartError> {
    if wanted > i64::from(stock) {
        return Err(CartError::InsufficientStock {
            product,
            requested: wanted,
            available: stock,
        });
    }
    i32::try_from(wanted).map_err(|_| CartError::InsufficientStock {
        product,
        requested: wanted,
        available: stock,
    })
}
