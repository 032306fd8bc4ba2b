//! In-memory store for service tests.
//!
//! Mirrors the Postgres constraints that the services rely on: one cart per
//! identity, unique `(cart, product)` lines, unique order numbers and emails,
//! and single consumption of a draft.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use emporium_core::checkout::OrderNumber;
use emporium_core::preferences::SortOption;
use emporium_core::{
    CartId, CategoryId, DraftOrderId, Email, InvoiceKind, OrderId, PaymentMethodId, ProductId,
    ShippingAddressId, UserId,
};

use super::{AccountStore, CartStore, CatalogStore, CheckoutStore};
use crate::db::RepositoryError;
use crate::models::{
    BillingData, CartLine, CartLineDetail, CartOwner, DraftOrder, NewDraftOrder, NewOrder,
    NewShippingAddress, NewUser, OrderRecord, PaymentMethod, Product, ProductFilter, ResetToken,
    SavedShippingAddress, UserAccount,
};

#[derive(Debug, Clone)]
pub struct MemoryCart {
    pub uuid: Option<Uuid>,
    pub user_id: Option<UserId>,
    pub last_modified_at: DateTime<Utc>,
    pub lines: Vec<CartLine>,
}

#[derive(Debug, Clone)]
pub struct StoredOrder {
    pub id: OrderId,
    pub order: NewOrder,
    pub email_enqueued_at: Option<DateTime<Utc>>,
    pub cart_cleared_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: i32,
    pub carts: BTreeMap<CartId, MemoryCart>,
    pub products: BTreeMap<ProductId, Product>,
    pub drafts: BTreeMap<Uuid, DraftOrder>,
    pub payment_methods: Vec<PaymentMethod>,
    pub orders: Vec<StoredOrder>,
    /// Numbers reported as taken by `order_number_exists`.
    pub taken_order_numbers: BTreeSet<String>,
    pub order_number_checks: usize,
    pub users: BTreeMap<UserId, UserAccount>,
    pub billing_rows: BTreeMap<UserId, BillingData>,
    pub addresses: Vec<SavedShippingAddress>,
    pub reset_tokens: Vec<ResetToken>,
    /// Every write fails with a database error while set.
    pub fail_writes: bool,
}

fn write_failure() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    const fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes {
            Err(write_failure())
        } else {
            Ok(())
        }
    }

    pub fn add_product(&mut self, id: i32, name: &str, net: &str, vat: &str, stock: i32) {
        self.add_product_in(id, 1, name, net, vat, stock);
    }

    pub fn add_product_in(
        &mut self,
        id: i32,
        category: i32,
        name: &str,
        net: &str,
        vat: &str,
        stock: i32,
    ) {
        let id = ProductId::new(id);
        self.products.insert(
            id,
            Product {
                id,
                category_id: CategoryId::new(category),
                name: name.to_owned(),
                description: String::new(),
                price_net: net.parse().unwrap_or_default(),
                vat_rate: vat.parse().unwrap_or_default(),
                stock,
                created_at: DateTime::<Utc>::UNIX_EPOCH
                    + chrono::Duration::seconds(i64::from(id.as_i32())),
            },
        );
    }

    pub fn add_payment_method(&mut self, id: i32, name: &str) {
        self.payment_methods.push(PaymentMethod {
            id: PaymentMethodId::new(id),
            name: name.to_owned(),
        });
    }

    /// Insert an anonymous cart directly, bypassing the identity resolver.
    pub fn seed_anonymous_cart(&mut self, token: Uuid) -> CartId {
        let id = CartId::new(self.next_id());
        self.carts.insert(
            id,
            MemoryCart {
                uuid: Some(token),
                user_id: None,
                last_modified_at: Utc::now(),
                lines: Vec::new(),
            },
        );
        id
    }

    /// Insert a user cart directly. Allows duplicates, to test repair.
    pub fn seed_user_cart(&mut self, user: UserId) -> CartId {
        let id = CartId::new(self.next_id());
        self.carts.insert(
            id,
            MemoryCart {
                uuid: None,
                user_id: Some(user),
                last_modified_at: Utc::now(),
                lines: Vec::new(),
            },
        );
        id
    }

    pub fn seed_line(&mut self, cart: CartId, product: i32, quantity: i32) {
        if let Some(cart) = self.carts.get_mut(&cart) {
            cart.lines.push(CartLine {
                product_id: ProductId::new(product),
                quantity,
            });
        }
    }

    pub fn seed_user(&mut self, email: &str, password_hash: &str) -> UserId {
        let id = UserId::new(self.next_id());
        self.users.insert(
            id,
            UserAccount {
                id,
                email: Email::parse(email).unwrap(),
                first_name: "Jan".into(),
                last_name: "Kowalski".into(),
                phone: "123456789".into(),
                password_hash: password_hash.to_owned(),
                created_at: Utc::now(),
            },
        );
        id
    }

    /// `(product, quantity)` pairs of a cart, sorted by product.
    pub fn lines_of(&self, cart: CartId) -> Vec<(i32, i32)> {
        let mut lines: Vec<_> = self
            .carts
            .get(&cart)
            .map(|c| {
                c.lines
                    .iter()
                    .map(|l| (l.product_id.as_i32(), l.quantity))
                    .collect()
            })
            .unwrap_or_default();
        lines.sort_unstable();
        lines
    }

    fn cart_mut(&mut self, cart: CartId) -> Result<&mut MemoryCart, RepositoryError> {
        self.carts.get_mut(&cart).ok_or(RepositoryError::NotFound)
    }

    fn filtered(&self, filter: &ProductFilter) -> Vec<&Product> {
        self.products.values().filter(|p| filter.matches(p)).collect()
    }
}

impl CartStore for MemoryStore {
    async fn user_cart_ids(&mut self, user: UserId) -> Result<Vec<CartId>, RepositoryError> {
        Ok(self
            .carts
            .iter()
            .filter(|(_, c)| c.user_id == Some(user))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn replace_user_carts(&mut self, user: UserId) -> Result<CartId, RepositoryError> {
        self.check_writable()?;
        self.carts.retain(|_, c| c.user_id != Some(user));
        Ok(self.seed_user_cart(user))
    }

    async fn anonymous_cart_id(&mut self, token: Uuid) -> Result<Option<CartId>, RepositoryError> {
        Ok(self
            .carts
            .iter()
            .find(|(_, c)| c.uuid == Some(token))
            .map(|(id, _)| *id))
    }

    async fn create_anonymous_cart(&mut self, token: Uuid) -> Result<CartId, RepositoryError> {
        self.check_writable()?;
        if self.carts.values().any(|c| c.uuid == Some(token)) {
            return Err(RepositoryError::Conflict("carts_uuid_key".into()));
        }
        Ok(self.seed_anonymous_cart(token))
    }

    async fn find_cart(&mut self, owner: CartOwner) -> Result<Option<CartId>, RepositoryError> {
        match owner {
            CartOwner::User(user) => Ok(self.user_cart_ids(user).await?.into_iter().min()),
            CartOwner::Anonymous(token) => self.anonymous_cart_id(token).await,
        }
    }

    async fn cart_modified_at(
        &mut self,
        cart: CartId,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        Ok(self.carts.get(&cart).map(|c| c.last_modified_at))
    }

    async fn line_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<i32>, RepositoryError> {
        Ok(self.carts.get(&cart).and_then(|c| {
            c.lines
                .iter()
                .find(|l| l.product_id == product)
                .map(|l| l.quantity)
        }))
    }

    async fn line_details(&mut self, cart: CartId) -> Result<Vec<CartLineDetail>, RepositoryError> {
        let lines = self.carts.get(&cart).map(|c| c.lines.clone()).unwrap_or_default();
        Ok(lines
            .into_iter()
            .filter_map(|line| {
                self.products.get(&line.product_id).map(|p| CartLineDetail {
                    product_id: p.id,
                    name: p.name.clone(),
                    quantity: line.quantity,
                    price_net: p.price_net,
                    vat_rate: p.vat_rate,
                    stock: p.stock,
                })
            })
            .collect())
    }

    async fn set_line_quantity(
        &mut self,
        cart: CartId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let cart = self.cart_mut(cart)?;
        match cart.lines.iter_mut().find(|l| l.product_id == product) {
            Some(line) => line.quantity = quantity,
            None => cart.lines.push(CartLine {
                product_id: product,
                quantity,
            }),
        }
        cart.last_modified_at = Utc::now();
        Ok(())
    }

    async fn remove_line(&mut self, cart: CartId, product: ProductId) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let cart = self.cart_mut(cart)?;
        cart.lines.retain(|l| l.product_id != product);
        cart.last_modified_at = Utc::now();
        Ok(())
    }

    async fn clear_cart(&mut self, cart: CartId) -> Result<u64, RepositoryError> {
        self.check_writable()?;
        let cart = self.cart_mut(cart)?;
        let removed = cart.lines.len() as u64;
        cart.lines.clear();
        cart.last_modified_at = Utc::now();
        Ok(removed)
    }

    async fn move_lines(&mut self, from: CartId, to: CartId) -> Result<u64, RepositoryError> {
        self.check_writable()?;
        if !self.carts.contains_key(&to) {
            return Err(RepositoryError::NotFound);
        }
        let moved = std::mem::take(&mut self.cart_mut(from)?.lines);
        let count = moved.len() as u64;
        let now = Utc::now();
        self.cart_mut(from)?.last_modified_at = now;
        let target = self.cart_mut(to)?;
        target.lines = moved;
        target.last_modified_at = now;
        Ok(count)
    }
}

impl CatalogStore for MemoryStore {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.get(&id).cloned())
    }

    async fn count_products(&mut self, filter: &ProductFilter) -> Result<i64, RepositoryError> {
        Ok(i64::try_from(self.filtered(filter).len()).unwrap_or(i64::MAX))
    }

    async fn list_products(
        &mut self,
        filter: &ProductFilter,
        sort: SortOption,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self.filtered(filter).into_iter().cloned().collect();
        match sort {
            SortOption::PriceAsc => products.sort_by_key(|p| (p.price_gross(), p.id)),
            SortOption::PriceDesc => {
                products.sort_by(|a, b| b.price_gross().cmp(&a.price_gross()).then(a.id.cmp(&b.id)));
            }
            SortOption::NameAsc => {
                products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            }
            SortOption::NameDesc => {
                products.sort_by(|a, b| b.name.cmp(&a.name).then(a.id.cmp(&b.id)));
            }
            SortOption::Newest => {
                products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            }
        }
        Ok(products
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }
}

impl CheckoutStore for MemoryStore {
    async fn insert_draft(&mut self, draft: &NewDraftOrder) -> Result<DraftOrderId, RepositoryError> {
        self.check_writable()?;
        let id = DraftOrderId::new(self.next_id());
        self.drafts.insert(
            draft.uuid,
            DraftOrder {
                id,
                uuid: draft.uuid,
                cart_id: draft.cart_id,
                lines: draft.lines.clone(),
                shipping_methods: draft.shipping_methods.clone(),
                created_at: draft.created_at,
            },
        );
        Ok(id)
    }

    async fn draft_by_uuid(&mut self, uuid: Uuid) -> Result<Option<DraftOrder>, RepositoryError> {
        Ok(self.drafts.get(&uuid).cloned())
    }

    async fn payment_methods(&mut self) -> Result<Vec<PaymentMethod>, RepositoryError> {
        Ok(self.payment_methods.clone())
    }

    async fn payment_method(
        &mut self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        Ok(self.payment_methods.iter().find(|m| m.id == id).cloned())
    }

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool, RepositoryError> {
        self.order_number_checks += 1;
        Ok(self.taken_order_numbers.contains(number.as_str())
            || self.orders.iter().any(|o| o.order.order_number == *number))
    }

    async fn place_order(&mut self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        self.check_writable()?;
        if !self.drafts.contains_key(&order.draft_uuid) {
            return Err(RepositoryError::NotFound);
        }
        if self.orders.iter().any(|o| o.order.order_number == order.order_number) {
            return Err(RepositoryError::Conflict("orders_order_number_key".into()));
        }
        // order_invoices_personal_tax_id
        if order.invoice.kind == InvoiceKind::Personal && order.invoice.tax_id.is_some() {
            return Err(RepositoryError::DataCorruption(
                "order_invoices_personal_tax_id".into(),
            ));
        }
        self.drafts.remove(&order.draft_uuid);
        let id = OrderId::new(self.next_id());
        self.orders.push(StoredOrder {
            id,
            order: order.clone(),
            email_enqueued_at: None,
            cart_cleared_at: None,
        });
        Ok(id)
    }

    async fn order_by_uuid(&mut self, uuid: Uuid) -> Result<Option<OrderRecord>, RepositoryError> {
        let Some(stored) = self.orders.iter().find(|o| o.order.uuid == uuid) else {
            return Ok(None);
        };
        let order = &stored.order;
        let payment_method = self
            .payment_methods
            .iter()
            .find(|m| m.id == order.payment_method_id)
            .map(|m| m.name.clone())
            .unwrap_or_default();
        Ok(Some(OrderRecord {
            id: stored.id,
            uuid: order.uuid,
            order_number: order.order_number.to_string(),
            status: "new".into(),
            email: order.email.clone(),
            user_id: order.user_id,
            cart_id: Some(order.cart_id),
            lines: order.lines.clone(),
            shipping_method: order.shipping_method.clone(),
            payment_method,
            total: order.total,
            shipping: order.shipping.clone(),
            notes: order.notes.clone(),
            created_at: order.created_at,
            email_enqueued_at: stored.email_enqueued_at,
            cart_cleared_at: stored.cart_cleared_at,
        }))
    }

    async fn mark_email_enqueued(
        &mut self,
        order: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        if let Some(stored) = self.orders.iter_mut().find(|o| o.id == order) {
            stored.email_enqueued_at = Some(at);
        }
        Ok(())
    }

    async fn mark_cart_cleared(
        &mut self,
        order: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        if let Some(stored) = self.orders.iter_mut().find(|o| o.id == order) {
            stored.cart_cleared_at = Some(at);
        }
        Ok(())
    }
}

impl AccountStore for MemoryStore {
    async fn user_by_email(&mut self, email: &Email) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(self
            .users
            .values()
            .find(|u| u.email.as_str().eq_ignore_ascii_case(email.as_str()))
            .cloned())
    }

    async fn user_by_id(&mut self, id: UserId) -> Result<Option<UserAccount>, RepositoryError> {
        Ok(self.users.get(&id).cloned())
    }

    async fn create_user(&mut self, user: &NewUser) -> Result<UserId, RepositoryError> {
        self.check_writable()?;
        if self.user_by_email(&user.email).await?.is_some() {
            return Err(RepositoryError::Conflict("users_email_key".into()));
        }
        let id = UserId::new(self.next_id());
        self.users.insert(
            id,
            UserAccount {
                id,
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                phone: user.phone.clone(),
                password_hash: user.password_hash.clone(),
                created_at: Utc::now(),
            },
        );
        self.billing_rows.insert(id, BillingData::default());
        self.seed_user_cart(id);
        Ok(id)
    }

    async fn update_password(&mut self, user: UserId, hash: &str) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let account = self.users.get_mut(&user).ok_or(RepositoryError::NotFound)?;
        hash.clone_into(&mut account.password_hash);
        Ok(())
    }

    async fn shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
    ) -> Result<Option<SavedShippingAddress>, RepositoryError> {
        Ok(self
            .addresses
            .iter()
            .find(|a| a.user_id == user && a.uuid == uuid)
            .cloned())
    }

    async fn update_account(
        &mut self,
        user: UserId,
        first_name: &str,
        last_name: &str,
        phone: &str,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        let account = self.users.get_mut(&user).ok_or(RepositoryError::NotFound)?;
        first_name.clone_into(&mut account.first_name);
        last_name.clone_into(&mut account.last_name);
        phone.clone_into(&mut account.phone);
        Ok(())
    }

    async fn billing_data(&mut self, user: UserId) -> Result<Option<BillingData>, RepositoryError> {
        Ok(self.billing_rows.get(&user).cloned())
    }

    async fn update_billing_data(
        &mut self,
        user: UserId,
        data: &BillingData,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        self.billing_rows.insert(user, data.clone());
        Ok(())
    }

    async fn shipping_addresses(
        &mut self,
        user: UserId,
    ) -> Result<Vec<SavedShippingAddress>, RepositoryError> {
        Ok(self
            .addresses
            .iter()
            .filter(|a| a.user_id == user)
            .cloned()
            .collect())
    }

    async fn insert_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
        address: &NewShippingAddress,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        if self.addresses.iter().any(|a| a.uuid == uuid) {
            return Err(RepositoryError::Conflict("shipping_addresses_uuid_key".into()));
        }
        let id = ShippingAddressId::new(self.next_id());
        self.addresses.push(SavedShippingAddress {
            id,
            uuid,
            user_id: user,
            first_name: address.first_name.clone(),
            last_name: address.last_name.clone(),
            company_name: address.company_name.clone(),
            street: address.street.clone(),
            postcode: address.postcode.clone(),
            city: address.city.clone(),
            country_code: address.country_code.clone(),
            country: address.country.clone(),
            phone: address.phone.clone(),
        });
        Ok(())
    }

    async fn update_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
        address: &NewShippingAddress,
    ) -> Result<bool, RepositoryError> {
        self.check_writable()?;
        let Some(saved) = self
            .addresses
            .iter_mut()
            .find(|a| a.user_id == user && a.uuid == uuid)
        else {
            return Ok(false);
        };
        saved.first_name.clone_from(&address.first_name);
        saved.last_name.clone_from(&address.last_name);
        saved.company_name.clone_from(&address.company_name);
        saved.street.clone_from(&address.street);
        saved.postcode.clone_from(&address.postcode);
        saved.city.clone_from(&address.city);
        saved.country_code.clone_from(&address.country_code);
        saved.country.clone_from(&address.country);
        saved.phone.clone_from(&address.phone);
        Ok(true)
    }

    async fn delete_shipping_address(
        &mut self,
        user: UserId,
        uuid: Uuid,
    ) -> Result<bool, RepositoryError> {
        self.check_writable()?;
        let before = self.addresses.len();
        self.addresses.retain(|a| !(a.user_id == user && a.uuid == uuid));
        Ok(self.addresses.len() < before)
    }

    async fn insert_reset_token(
        &mut self,
        user: UserId,
        token: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.check_writable()?;
        self.reset_tokens.push(ResetToken {
            token,
            user_id: user,
            created_at: at,
        });
        Ok(())
    }

    async fn reset_token(&mut self, token: Uuid) -> Result<Option<ResetToken>, RepositoryError> {
        Ok(self.reset_tokens.iter().find(|t| t.token == token).cloned())
    }

    async fn delete_reset_tokens(&mut self, user: UserId) -> Result<u64, RepositoryError> {
        self.check_writable()?;
        let before = self.reset_tokens.len();
        self.reset_tokens.retain(|t| t.user_id != user);
        Ok((before - self.reset_tokens.len()) as u64)
    }
}

/// Decimal from a literal, for test fixtures.
pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap_or_default()
}
