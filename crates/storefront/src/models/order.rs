//! Draft and permanent order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use emporium_core::checkout::{AddressForm, DraftLine, OrderNumber, ShippingMethod, ShippingMethods};
use emporium_core::{
    CartId, DraftOrderId, InvoiceKind, OrderId, OrderStatusId, PaymentMethodId, UserId,
};

/// A persisted draft order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOrder {
    pub id: DraftOrderId,
    pub uuid: Uuid,
    pub cart_id: CartId,
    pub lines: Vec<DraftLine>,
    pub shipping_methods: ShippingMethods,
    pub created_at: DateTime<Utc>,
}

impl DraftOrder {
    /// Whether the draft is still usable at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now < self.created_at + ttl
    }
}

/// Data for inserting a draft order.
#[derive(Debug, Clone)]
pub struct NewDraftOrder {
    pub uuid: Uuid,
    pub cart_id: CartId,
    pub lines: Vec<DraftLine>,
    pub shipping_methods: ShippingMethods,
    pub created_at: DateTime<Utc>,
}

/// A payment option. Only recorded on the order, never charged here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub name: String,
}

/// Invoice row written with an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewInvoice {
    pub kind: InvoiceKind,
    pub name: String,
    pub street: String,
    pub postcode: String,
    pub city: String,
    pub country_code: String,
    pub country: String,
    pub tax_id: Option<String>,
    pub email: Option<String>,
}

/// Everything written when an order is placed.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub uuid: Uuid,
    pub order_number: OrderNumber,
    /// Draft consumed by this order.
    pub draft_uuid: Uuid,
    pub cart_id: CartId,
    pub status_id: OrderStatusId,
    pub email: String,
    pub user_id: Option<UserId>,
    pub lines: Vec<DraftLine>,
    pub shipping_method: ShippingMethod,
    pub payment_method_id: PaymentMethodId,
    pub total: Decimal,
    pub shipping: AddressForm,
    pub notes: String,
    pub invoice: NewInvoice,
    pub created_at: DateTime<Utc>,
}

/// A placed order as read back for display, email and follow-up steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub uuid: Uuid,
    pub order_number: String,
    pub status: String,
    pub email: String,
    pub user_id: Option<UserId>,
    /// Source cart; `None` once the sweep removed it.
    pub cart_id: Option<CartId>,
    pub lines: Vec<DraftLine>,
    pub shipping_method: ShippingMethod,
    pub payment_method: String,
    pub total: Decimal,
    pub shipping: AddressForm,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub email_enqueued_at: Option<DateTime<Utc>>,
    pub cart_cleared_at: Option<DateTime<Utc>>,
}

/// What a shopper sees of an order: the order page and the confirmation email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetails {
    pub uuid: Uuid,
    pub order_number: String,
    pub status: String,
    pub email: String,
    pub lines: Vec<DraftLine>,
    pub shipping_method: ShippingMethod,
    pub payment_method: String,
    pub total: Decimal,
    pub shipping: AddressForm,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl From<&OrderRecord> for OrderDetails {
    fn from(order: &OrderRecord) -> Self {
        Self {
            uuid: order.uuid,
            order_number: order.order_number.clone(),
            status: order.status.clone(),
            email: order.email.clone(),
            lines: order.lines.clone(),
            shipping_method: order.shipping_method.clone(),
            payment_method: order.payment_method.clone(),
            total: order.total,
            shipping: order.shipping.clone(),
            notes: order.notes.clone(),
            created_at: order.created_at,
        }
    }
}

impl OrderRecord {
    /// Whether a post-placement step is still outstanding.
    #[must_use]
    pub const fn has_pending_steps(&self) -> bool {
        self.email_enqueued_at.is_none() || self.cart_cleared_at.is_none()
    }
}
