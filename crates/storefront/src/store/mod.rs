//! Storage seams used by the services.
//!
//! Services are generic over these traits. Production code passes a
//! [`crate::db::PgStore`] (one pooled connection per request); unit tests
//! pass the in-memory store from `memory`.
//!
//! Methods that touch several rows (`move_lines`, `replace_user_carts`,
//! `create_user`, `place_order`) are atomic in every implementation.

#[cfg(test)]
pub mod memory;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use emporium_core::checkout::OrderNumber;
use emporium_core::preferences::SortOption;
use emporium_core::{CartId, DraftOrderId, Email, OrderId, PaymentMethodId, ProductId, UserId};

use crate::db::RepositoryError;
use crate::models::{
    BillingData, CartLineDetail, CartOwner, DraftOrder, NewDraftOrder, NewOrder,
    NewShippingAddress, NewUser, OrderRecord, PaymentMethod, Product, ProductFilter, ResetToken,
    SavedShippingAddress, UserAccount,
};

/// Carts and their lines.
pub trait CartStore {
    /// Ids of every cart owned by `user`. More than one means the identity
    /// invariant was broken and needs repair.
    async fn user_cart_ids(&mut self, user: UserId) -> Result<Vec<CartId>, RepositoryError>;

    /// Delete every cart of `user` and create exactly one fresh cart.
    async fn replace_user_carts(&mut self, user: UserId) -> Result<CartId, RepositoryError>;

    async fn anonymous_cart_id(&mut self, token: Uuid) -> Result<Option<CartId>, RepositoryError>;

    /// Insert a cart owned by a cookie token.
    async fn create_anonymous_cart(&mut self, token: Uuid) -> Result<CartId, RepositoryError>;

    /// The cart addressed by `owner`, if it exists.
    async fn find_cart(&mut self, owner: CartOwner) -> Result<Option<CartId>, RepositoryError>;

    async fn cart_modified_at(
        &mut self,
        cart: CartId,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError>;

    async fn line_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<i32>, RepositoryError>;

    /// Lines joined with their products, in insertion order.
    async fn line_details(&mut self, cart: CartId) -> Result<Vec<CartLineDetail>, RepositoryError>;

    /// Upsert a line to an absolute quantity and stamp the cart.
    async fn set_line_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError>;

    /// Delete a line (missing lines are fine) and stamp the cart.
    async fn remove_line(&mut self, cart: CartId, product: ProductId) -> Result<(), RepositoryError>;

    /// Delete all lines and stamp the cart. Returns the number removed.
    async fn clear_cart(&mut self, cart: CartId) -> Result<u64, RepositoryError>;

    /// Replace the lines of `to` with the lines of `from`, leaving `from`
    /// empty. Returns the number of lines moved.
    async fn move_lines(&mut self, from: CartId, to: CartId) -> Result<u64, RepositoryError>;
}

/// Read side of the catalog.
pub trait CatalogStore {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn count_products(&mut self, filter: &ProductFilter) -> Result<i64, RepositoryError>;

    async fn list_products(
        &mut self,
        filter: &ProductFilter,
        sort: SortOption,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, RepositoryError>;
}

/// Drafts, orders and payment options.
pub trait CheckoutStore {
    async fn insert_draft(&mut self, draft: &NewDraftOrder) -> Result<DraftOrderId, RepositoryError>;

    async fn draft_by_uuid(&mut self, uuid: Uuid) -> Result<Option<DraftOrder>, RepositoryError>;

    async fn payment_methods(&mut self) -> Result<Vec<PaymentMethod>, RepositoryError>;

    async fn payment_method(
        &mut self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepositoryError>;

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool, RepositoryError>;

    /// Consume the draft and write the order, its first status history row
    /// and its invoice.
    ///
    /// Fails with `NotFound` when the draft is already gone and with
    /// `Conflict` when the order number is taken. Nothing is written on
    /// failure.
    async fn place_order(&mut self, order: &NewOrder) -> Result<OrderId, RepositoryError>;

    async fn order_by_uuid(&mut self, uuid: Uuid) -> Result<Option<OrderRecord>, RepositoryError>;

    async fn mark_email_enqueued(
        &mut self,
        order: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn mark_cart_cleared(
        &mut self,
        order: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

/// Customer accounts, their saved data, and password resets.
pub trait AccountStore {
    async fn user_by_email(&mut self, email: &Email) -> Result<Option<UserAccount>, RepositoryError>;

    async fn user_by_id(&mut self, id: UserId) -> Result<Option<UserAccount>, RepositoryError>;

    /// Insert a user together with an empty billing row and their cart.
    ///
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&mut self, user: &NewUser) -> Result<UserId, RepositoryError>;

    async fn update_password(&mut self, user: UserId, hash: &str) -> Result<(), RepositoryError>;

    /// Overwrite the editable account fields. Fails with `NotFound` for an
    /// unknown user.
    async fn update_account(
        &mut self,
        user: UserId,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> Result<(), RepositoryError>;

    async fn billing_data(&mut self, user: UserId) -> Result<Option<BillingData>, RepositoryError>;

    /// Write the billing row of `user`, creating it if it is missing.
    async fn update_billing_data(
        &mut self,
        user: UserId,
        data: &BillingData,
    ) -> Result<(), RepositoryError>;

    async fn shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
    ) -> Result<Option<SavedShippingAddress>, RepositoryError>;

    /// Saved addresses of `user`, oldest first.
    async fn shipping_addresses(
        &mut self,
        user: UserId,
    ) -> Result<Vec<SavedShippingAddress>, RepositoryError>;

    async fn insert_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
        address: &NewShippingAddress,
    ) -> Result<(), RepositoryError>;

    /// Returns `false` when `uuid` is not an address of `user`.
    async fn update_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
        address: &NewShippingAddress,
    ) -> Result<bool, RepositoryError>;

    /// Returns `false` when `uuid` is not an address of `user`.
    async fn delete_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
    ) -> Result<bool, RepositoryError>;

    async fn insert_reset_token(
        &mut self,
        user: UserId,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn reset_token(&mut self, token: Uuid) -> Result<Option<ResetToken>, RepositoryError>;

    async fn delete_reset_tokens(&mut self, user: UserId) -> Result<u64, RepositoryError>;
}
