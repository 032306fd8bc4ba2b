//! Draft orders, orders and payment methods.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Connection;
use sqlx::types::Json;
use uuid::Uuid;

use emporium_core::checkout::{
    AddressForm, DraftLine, OrderNumber, ShippingMethod, ShippingMethods,
};
use emporium_core::{CartId, DraftOrderId, OrderId, PaymentMethodId, UserId};

use super::{PgStore, RepositoryError};
use crate::models::{DraftOrder, NewDraftOrder, NewOrder, OrderRecord, PaymentMethod};
use crate::store::CheckoutStore;

#[derive(sqlx::FromRow)]
struct DraftOrderRow {
    id: DraftOrderId,
    uuid: Uuid,
    cart_id: CartId,
    lines: Json<Vec<DraftLine>>,
    shipping_methods: Json<ShippingMethods>,
    created_at: DateTime<Utc>,
}

impl From<DraftOrderRow> for DraftOrder {
    fn from(row: DraftOrderRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            cart_id: row.cart_id,
            lines: row.lines.0,
            shipping_methods: row.shipping_methods.0,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    uuid: Uuid,
    order_number: String,
    status: String,
    email: String,
    user_id: Option<UserId>,
    cart_id: Option<CartId>,
    lines: Json<Vec<DraftLine>>,
    shipping_method: Json<ShippingMethod>,
    payment_method: String,
    total: Decimal,
    shipping_first_name: String,
    shipping_last_name: String,
    shipping_company_name: String,
    shipping_street: String,
    shipping_postcode: String,
    shipping_city: String,
    shipping_country_code: String,
    shipping_country: String,
    shipping_phone: String,
    notes: String,
    created_at: DateTime<Utc>,
    email_enqueued_at: Option<DateTime<Utc>>,
    cart_cleared_at: Option<DateTime<Utc>>,
}

impl From<OrderRow> for OrderRecord {
    fn from(row: OrderRow) -> Self {
        let shipping = AddressForm {
            first_name: row.shipping_first_name,
            last_name: row.shipping_last_name,
            company_name: row.shipping_company_name,
            street: row.shipping_street,
            postcode: row.shipping_postcode,
            city: row.shipping_city,
            country_code: Some(row.shipping_country_code),
            country: row.shipping_country,
            phone: row.shipping_phone,
            email: Some(row.email.clone()),
        };
        Self {
            id: row.id,
            uuid: row.uuid,
            order_number: row.order_number,
            status: row.status,
            email: row.email,
            user_id: row.user_id,
            cart_id: row.cart_id,
            lines: row.lines.0,
            shipping_method: row.shipping_method.0,
            payment_method: row.payment_method,
            total: row.total,
            shipping,
            notes: row.notes,
            created_at: row.created_at,
            email_enqueued_at: row.email_enqueued_at,
            cart_cleared_at: row.cart_cleared_at,
        }
    }
}

const ORDER_SELECT: &str = r"
    SELECT o.id, o.uuid, o.order_number, s.name AS status, o.email, o.user_id, o.cart_id,
           o.lines, o.shipping_method, pm.name AS payment_method, o.total,
           o.shipping_first_name, o.shipping_last_name, o.shipping_company_name,
           o.shipping_street, o.shipping_postcode, o.shipping_city,
           o.shipping_country_code, o.shipping_country, o.shipping_phone,
           o.notes, o.created_at, o.email_enqueued_at, o.cart_cleared_at
    FROM orders o
    JOIN order_statuses s ON s.id = o.status_id
    JOIN payment_methods pm ON pm.id = o.payment_method_id
";

impl PgStore {
    /// Orders placed before `placed_before` whose follow-up steps are still
    /// outstanding, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn pending_orders(
        &mut self,
        placed_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "{ORDER_SELECT} WHERE (o.email_enqueued_at IS NULL OR o.cart_cleared_at IS NULL) \
             AND o.created_at < $1 ORDER BY o.created_at LIMIT $2"
        ))
        .bind(placed_before)
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows.into_iter().map(OrderRecord::from).collect())
    }
}

impl CheckoutStore for PgStore {
    async fn insert_draft(&mut self, draft: &NewDraftOrder) -> Result<DraftOrderId, RepositoryError> {
        let id = sqlx::query_scalar::<_, DraftOrderId>(
            r"
            INSERT INTO draft_orders (uuid, cart_id, lines, shipping_methods, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            ",
        )
        .bind(draft.uuid)
        .bind(draft.cart_id)
        .bind(Json(&draft.lines))
        .bind(Json(&draft.shipping_methods))
        .bind(draft.created_at)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(RepositoryError::from_unique)?;
        Ok(id)
    }

    async fn draft_by_uuid(&mut self, uuid: Uuid) -> Result<Option<DraftOrder>, RepositoryError> {
        let row = sqlx::query_as::<_, DraftOrderRow>(
            r"
            SELECT id, uuid, cart_id, lines, shipping_methods, created_at
            FROM draft_orders
            WHERE uuid = $1
            ",
        )
        .bind(uuid)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(row.map(DraftOrder::from))
    }

    async fn payment_methods(&mut self) -> Result<Vec<PaymentMethod>, RepositoryError> {
        let methods = sqlx::query_as::<_, PaymentMethod>(
            "SELECT id, name FROM payment_methods WHERE active ORDER BY id",
        )
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(methods)
    }

    async fn payment_method(
        &mut self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            "SELECT id, name FROM payment_methods WHERE id = $1 AND active",
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(method)
    }

    async fn order_number_exists(&mut self, number: &OrderNumber) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE order_number = $1)",
        )
        .bind(number.as_str())
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(exists)
    }

    async fn place_order(&mut self, order: &NewOrder) -> Result<OrderId, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        // Concurrent finalizes of one draft serialize on this row; the loser
        // deletes nothing.
        let consumed = sqlx::query("DELETE FROM draft_orders WHERE uuid = $1")
            .bind(order.draft_uuid)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if consumed == 0 {
            return Err(RepositoryError::NotFound);
        }

        let order_id = sqlx::query_scalar::<_, OrderId>(
            r"
            INSERT INTO orders (
                uuid, order_number, draft_uuid, cart_id, status_id, email, user_id,
                lines, shipping_method, payment_method_id, total,
                shipping_first_name, shipping_last_name, shipping_company_name,
                shipping_street, shipping_postcode, shipping_city,
                shipping_country_code, shipping_country, shipping_phone,
                notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            RETURNING id
            ",
        )
        .bind(order.uuid)
        .bind(order.order_number.as_str())
        .bind(order.draft_uuid)
        .bind(order.cart_id)
        .bind(order.status_id)
        .bind(&order.email)
        .bind(order.user_id)
        .bind(Json(&order.lines))
        .bind(Json(&order.shipping_method))
        .bind(order.payment_method_id)
        .bind(order.total)
        .bind(order.shipping.first_name.trim())
        .bind(order.shipping.last_name.trim())
        .bind(order.shipping.company_name.trim())
        .bind(order.shipping.street.trim())
        .bind(order.shipping.postcode.trim())
        .bind(order.shipping.city.trim())
        .bind(order.shipping.country_code.as_deref().unwrap_or_default().trim())
        .bind(order.shipping.country.trim())
        .bind(order.shipping.phone.trim())
        .bind(&order.notes)
        .bind(order.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from_unique)?;

        sqlx::query(
            "INSERT INTO order_status_history (order_id, status_id, created_at) VALUES ($1, $2, $3)",
        )
        .bind(order_id)
        .bind(order.status_id)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        let invoice = &order.invoice;
        sqlx::query(
            r"
            INSERT INTO order_invoices (
                order_id, kind, name, street, postcode, city, country_code, country, tax_id, email
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(order_id)
        .bind(invoice.kind)
        .bind(&invoice.name)
        .bind(&invoice.street)
        .bind(&invoice.postcode)
        .bind(&invoice.city)
        .bind(&invoice.country_code)
        .bind(&invoice.country)
        .bind(invoice.tax_id.as_deref())
        .bind(invoice.email.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order_id)
    }

    async fn order_by_uuid(&mut self, uuid: Uuid) -> Result<Option<OrderRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("{ORDER_SELECT} WHERE o.uuid = $1"))
            .bind(uuid)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row.map(OrderRecord::from))
    }

    async fn mark_email_enqueued(
        &mut self,
        order: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE orders SET email_enqueued_at = $2 WHERE id = $1")
            .bind(order)
            .bind(at)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn mark_cart_cleared(
        &mut self,
        order: OrderId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE orders SET cart_cleared_at = $2 WHERE id = $1")
            .bind(order)
            .bind(at)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
