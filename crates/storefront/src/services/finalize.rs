//! Order finalization.
//!
//! Placement is one store transaction: the draft is consumed and the order,
//! its first status history row and its invoice are written together. The
//! confirmation email and the cart clear run afterwards as separate steps,
//! each stamped on the order when done. A step that fails is logged and left
//! unstamped; `emporium-cli reconcile` retries it later through
//! [`complete_followups`].

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use emporium_core::checkout::{
    CheckoutForm, FieldError, OrderNumber, OrderNumberGenerator, ValidationErrors, total_payable,
    validate_checkout,
};
use emporium_core::{Email, InvoiceKind, OrderId, UserId};

use crate::config::{AuthConfig, CheckoutConfig, EmailConfig};
use crate::db::RepositoryError;
use crate::models::{CurrentUser, DraftOrder, NewInvoice, NewOrder, OrderDetails, OrderRecord};
use crate::queue::{EmailJob, EmailQueue, EmailTemplate, QueueError};
use crate::services::auth::{AuthError, AuthService};
use crate::services::draft::load_draft;
use crate::store::{AccountStore, CartStore, CheckoutStore};

/// Candidates tried before giving up on a unique order number.
const MAX_ORDER_NUMBER_ATTEMPTS: usize = 16;

/// Finalization failures.
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// Draft missing, expired, or consumed by a concurrent finalize.
    #[error("draft order not found")]
    DraftNotFound,

    #[error("checkout validation failed: {0:?}")]
    Validation(ValidationErrors),

    /// `create_account` was requested for an email that is registered.
    #[error("account already exists")]
    AccountExists,

    #[error("no free order number after {MAX_ORDER_NUMBER_ATTEMPTS} attempts")]
    OrderNumberExhausted,

    #[error("account creation failed: {0}")]
    Auth(AuthError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl FinalizeError {
    /// Message keys sent to the client.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        match self {
            Self::DraftNotFound => vec!["draft_order_not_found"],
            Self::Validation(errors) => errors.as_slice().iter().map(|e| e.key()).collect(),
            Self::AccountExists => vec!["account_exists"],
            Self::OrderNumberExhausted | Self::Auth(_) | Self::Repository(_) => {
                vec!["internal_error"]
            }
        }
    }
}

impl From<AuthError> for FinalizeError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::AccountExists => Self::AccountExists,
            other => Self::Auth(other),
        }
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub id: OrderId,
    pub uuid: Uuid,
    pub order_number: OrderNumber,
}

/// How [`complete_followups`] treats the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowupMode {
    /// Right after placement: the cart still holds the ordered lines.
    Placement,
    /// Later retry: a cart touched after the order belongs to a new
    /// shopping session and is left alone.
    Reconcile,
}

/// Which follow-up steps are stamped after a [`complete_followups`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowupOutcome {
    pub email_enqueued: bool,
    pub cart_cleared: bool,
}

impl FollowupOutcome {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.email_enqueued && self.cart_cleared
    }
}

/// Turns drafts into orders.
pub struct OrderFinalizer<'a> {
    checkout: &'a CheckoutConfig,
    auth: &'a AuthConfig,
    email: &'a EmailConfig,
}

impl<'a> OrderFinalizer<'a> {
    #[must_use]
    pub const fn new(
        checkout: &'a CheckoutConfig,
        auth: &'a AuthConfig,
        email: &'a EmailConfig,
    ) -> Self {
        Self {
            checkout,
            auth,
            email,
        }
    }

    fn draft_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.checkout.draft_ttl).unwrap_or(chrono::Duration::MAX)
    }

    /// Load the draft and check the whole form against it.
    ///
    /// # Errors
    ///
    /// `DraftNotFound`, or `Validation` carrying every violated field,
    /// including an unknown shipping or payment method.
    pub async fn validate<S: CheckoutStore>(
        &self,
        store: &mut S,
        form: &CheckoutForm,
        authenticated: bool,
        now: DateTime<Utc>,
    ) -> Result<DraftOrder, FinalizeError> {
        let draft = load_draft(store, form.draft_order_uuid, now, self.draft_ttl())
            .await?
            .ok_or(FinalizeError::DraftNotFound)?;

        let mut errors = validate_checkout(form, authenticated).err().unwrap_or_default();
        errors.check(
            draft.shipping_methods.get(&form.shipping_method_uuid).is_none(),
            FieldError::InvalidShippingMethod,
        );
        if let Some(method) = form.payment_method_id
            && store.payment_method(method).await?.is_none()
        {
            errors.push(FieldError::InvalidPaymentMethod);
        }

        errors.into_result().map_err(FinalizeError::Validation)?;
        Ok(draft)
    }

    /// Validate, place the order, then run the follow-up steps.
    ///
    /// # Errors
    ///
    /// Everything [`Self::validate`] returns, `AccountExists`,
    /// `OrderNumberExhausted`, and storage errors from placement. Follow-up
    /// failures are logged only.
    pub async fn finalize<S, Q>(
        &self,
        store: &mut S,
        queue: &mut Q,
        form: &CheckoutForm,
        session_user: Option<&CurrentUser>,
        numbers: &mut OrderNumberGenerator,
        now: DateTime<Utc>,
    ) -> Result<PlacedOrder, FinalizeError>
    where
        S: CartStore + CheckoutStore + AccountStore,
        Q: EmailQueue,
    {
        let draft = self.validate(store, form, session_user.is_some(), now).await?;
        let (Some(shipping_method), Some(payment_method_id)) = (
            draft.shipping_methods.get(&form.shipping_method_uuid).cloned(),
            form.payment_method_id,
        ) else {
            return Err(FinalizeError::Validation(ValidationErrors::default()));
        };

        let (user_id, email) = self.resolve_customer(store, queue, form, session_user).await?;

        let mut order = NewOrder {
            uuid: Uuid::new_v4(),
            order_number: numbers.next_candidate(now),
            draft_uuid: draft.uuid,
            cart_id: draft.cart_id,
            status_id: self.checkout.new_status_id,
            email,
            user_id,
            total: total_payable(&draft.lines, &shipping_method),
            lines: draft.lines,
            shipping_method,
            payment_method_id,
            shipping: form.shipping.clone(),
            notes: form.notes.trim().to_owned(),
            invoice: invoice_for(form),
            created_at: now,
        };

        let id = place_with_unique_number(store, &mut order, numbers, now).await?;
        tracing::info!(
            order = %id,
            order_number = %order.order_number,
            total = %order.total,
            guest = order.user_id.is_none(),
            "Order placed"
        );

        match store.order_by_uuid(order.uuid).await {
            Ok(Some(record)) => {
                complete_followups(store, queue, self.email, &record, FollowupMode::Placement, now)
                    .await;
            }
            Ok(None) => tracing::error!(order = %id, "Placed order not readable"),
            Err(e) => tracing::error!(error = %e, order = %id, "Placed order not readable"),
        }

        Ok(PlacedOrder {
            id,
            uuid: order.uuid,
            order_number: order.order_number,
        })
    }

    /// Session user, a fresh account, or a guest email.
    async fn resolve_customer<S, Q>(
        &self,
        store: &mut S,
        queue: &mut Q,
        form: &CheckoutForm,
        session_user: Option<&CurrentUser>,
    ) -> Result<(Option<UserId>, String), FinalizeError>
    where
        S: AccountStore,
        Q: EmailQueue,
    {
        if let Some(user) = session_user {
            let email = form.contact_email().unwrap_or_else(|| user.email.as_str());
            return Ok((Some(user.id), email.to_owned()));
        }

        let contact = form.contact_email().unwrap_or_default();
        if !form.create_account {
            return Ok((None, contact.to_owned()));
        }

        let email = Email::parse(contact).map_err(|_| {
            let mut errors = ValidationErrors::new();
            errors.push(FieldError::InvalidEmail);
            FinalizeError::Validation(errors)
        })?;
        let address = email.as_str().to_owned();
        let user = AuthService::new(self.auth, self.email)
            .create_checkout_account(store, queue, email, &form.shipping)
            .await?;
        Ok((Some(user), address))
    }
}

async fn place_with_unique_number<S: CheckoutStore>(
    store: &mut S,
    order: &mut NewOrder,
    numbers: &mut OrderNumberGenerator,
    now: DateTime<Utc>,
) -> Result<OrderId, FinalizeError> {
    for attempt in 0..MAX_ORDER_NUMBER_ATTEMPTS {
        if attempt > 0 {
            order.order_number = numbers.next_candidate(now);
        }
        if store.order_number_exists(&order.order_number).await? {
            tracing::debug!(order_number = %order.order_number, "Order number taken");
            continue;
        }
        match store.place_order(order).await {
            Ok(id) => return Ok(id),
            Err(RepositoryError::Conflict(constraint)) if constraint.contains("order_number") => {
                tracing::warn!(order_number = %order.order_number, "Order number raced, retrying");
            }
            Err(RepositoryError::NotFound) => return Err(FinalizeError::DraftNotFound),
            Err(e) => return Err(e.into()),
        }
    }
    tracing::error!(draft = %order.draft_uuid, "Order number attempts exhausted");
    Err(FinalizeError::OrderNumberExhausted)
}

fn invoice_for(form: &CheckoutForm) -> NewInvoice {
    let kind = InvoiceKind::from_invoice_flag(form.need_invoice);
    match (kind, &form.billing) {
        (InvoiceKind::Company, Some(billing)) => {
            let tax_id = billing.tax_id.trim();
            NewInvoice {
                kind,
                name: billing.name.trim().to_owned(),
                street: billing.street.trim().to_owned(),
                postcode: billing.postcode.trim().to_owned(),
                city: billing.city.trim().to_owned(),
                country_code: billing.country_code.as_deref().unwrap_or_default().trim().to_owned(),
                country: billing.country.trim().to_owned(),
                tax_id: (!tax_id.is_empty()).then(|| tax_id.to_owned()),
                email: billing.email.as_deref().map(str::trim).map(str::to_owned),
            }
        }
        _ => {
            let shipping = &form.shipping;
            NewInvoice {
                kind: InvoiceKind::Personal,
                name: format!("{} {}", shipping.first_name.trim(), shipping.last_name.trim()),
                street: shipping.street.trim().to_owned(),
                postcode: shipping.postcode.trim().to_owned(),
                city: shipping.city.trim().to_owned(),
                country_code: shipping.country_code.as_deref().unwrap_or_default().trim().to_owned(),
                country: shipping.country.trim().to_owned(),
                tax_id: None,
                email: form.contact_email().map(str::to_owned),
            }
        }
    }
}

fn order_email(config: &EmailConfig, order: &OrderRecord) -> Result<EmailJob, QueueError> {
    Ok(EmailJob::new(
        EmailTemplate::NewOrder,
        format!("{}: order {}", config.shop_name, order.order_number),
        order.email.as_str(),
    )
    .with_bcc(&config.bcc)
    .with_field(
        "name",
        format!("{} {}", order.shipping.first_name, order.shipping.last_name),
    )
    .with_field(
        "order_data",
        serde_json::to_value(OrderDetails::from(order))?,
    ))
}

/// Run whichever follow-up steps of `order` are not stamped yet.
///
/// Never fails: each step logs its own error and stays unstamped.
pub async fn complete_followups<S, Q>(
    store: &mut S,
    queue: &mut Q,
    config: &EmailConfig,
    order: &OrderRecord,
    mode: FollowupMode,
    now: DateTime<Utc>,
) -> FollowupOutcome
where
    S: CartStore + CheckoutStore,
    Q: EmailQueue,
{
    let email_enqueued = match order.email_enqueued_at {
        Some(_) => true,
        None => send_confirmation(store, queue, config, order, now).await,
    };
    let cart_cleared = match order.cart_cleared_at {
        Some(_) => true,
        None => clear_ordered_cart(store, order, mode, now).await,
    };

    let outcome = FollowupOutcome {
        email_enqueued,
        cart_cleared,
    };
    if !outcome.is_complete() {
        tracing::warn!(order = %order.id, ?outcome, "Order follow-up incomplete");
    }
    outcome
}

async fn send_confirmation<S, Q>(
    store: &mut S,
    queue: &mut Q,
    config: &EmailConfig,
    order: &OrderRecord,
    now: DateTime<Utc>,
) -> bool
where
    S: CheckoutStore,
    Q: EmailQueue,
{
    let queued = match order_email(config, order) {
        Ok(job) => queue.enqueue(&job).await,
        Err(e) => Err(e),
    };
    if let Err(e) = queued {
        tracing::error!(error = %e, order = %order.id, "Order email not queued");
        return false;
    }
    match store.mark_email_enqueued(order.id, now).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, order = %order.id, "Order email stamp failed");
            false
        }
    }
}

async fn clear_ordered_cart<S>(
    store: &mut S,
    order: &OrderRecord,
    mode: FollowupMode,
    now: DateTime<Utc>,
) -> bool
where
    S: CartStore + CheckoutStore,
{
    let cleared = async {
        let Some(cart) = order.cart_id else {
            return Ok(());
        };
        if mode == FollowupMode::Reconcile
            && let Some(modified) = store.cart_modified_at(cart).await?
            && modified > order.created_at
        {
            tracing::info!(order = %order.id, %cart, "Cart reused since order, not cleared");
            return Ok(());
        }
        match store.clear_cart(cart).await {
            Ok(removed) => {
                tracing::debug!(order = %order.id, %cart, removed, "Ordered cart cleared");
                Ok(())
            }
            Err(RepositoryError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
    .await;

    if let Err(e) = cleared {
        tracing::error!(error = %e, order = %order.id, "Cart clear failed");
        return false;
    }
    match store.mark_cart_cleared(order.id, now).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, order = %order.id, "Cart clear stamp failed");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use emporium_core::checkout::{AddressForm, BillingForm, ShippingMethod, ShippingMethods};
    use emporium_core::{CartId, CurrencyCode, Email, PaymentMethodId};

    use super::*;
    use crate::models::CartOwner;
    use crate::queue::RecordingQueue;
    use crate::services::draft::create_draft_order;
    use crate::store::memory::{MemoryStore, dec};

    struct Fixture {
        store: MemoryStore,
        queue: RecordingQueue,
        checkout: CheckoutConfig,
        auth: AuthConfig,
        email: EmailConfig,
        cart: CartId,
        draft: Uuid,
        method: Uuid,
        now: DateTime<Utc>,
    }

    impl Fixture {
        async fn new() -> Self {
            let mut store = MemoryStore::new();
            store.add_product(3, "Mug", "50", "23", 10);
            store.add_payment_method(1, "Bank transfer");
            let token = Uuid::new_v4();
            let cart = store.seed_anonymous_cart(token);
            store.seed_line(cart, 3, 1);

            let method = Uuid::new_v4();
            let methods: ShippingMethods = [ShippingMethod {
                id: method,
                cost: dec("100"),
                currency: CurrencyCode::Pln,
                name: "Courier".into(),
            }]
            .into_iter()
            .collect();
            let now = Utc::now();
            let draft = create_draft_order(&mut store, CartOwner::Anonymous(token), methods, now)
                .await
                .unwrap();

            Self {
                store,
                queue: RecordingQueue::default(),
                checkout: CheckoutConfig::default(),
                auth: AuthConfig {
                    forgot_password_delay: Duration::ZERO,
                    ..AuthConfig::default()
                },
                email: EmailConfig {
                    queue_name: "emails".into(),
                    bcc: vec!["orders@shop.example.com".into()],
                    shop_name: "Emporium".into(),
                    base_url: "https://shop.example.com".into(),
                },
                cart,
                draft,
                method,
                now,
            }
        }

        fn form(&self) -> CheckoutForm {
            CheckoutForm {
                draft_order_uuid: self.draft,
                shipping_method_uuid: self.method,
                payment_method_id: Some(PaymentMethodId::new(1)),
                shipping: AddressForm {
                    first_name: "Anna".into(),
                    last_name: "Nowak".into(),
                    company_name: String::new(),
                    street: "Długa 5".into(),
                    postcode: "00-950".into(),
                    city: "Warszawa".into(),
                    country_code: Some("PL".into()),
                    country: "Polska".into(),
                    phone: "+48 600 100 200".into(),
                    email: Some("anna@example.com".into()),
                },
                terms_accepted: true,
                ..CheckoutForm::default()
            }
        }

        async fn finalize(
            &mut self,
            form: &CheckoutForm,
            user: Option<&CurrentUser>,
            numbers: &mut OrderNumberGenerator,
        ) -> Result<PlacedOrder, FinalizeError> {
            let finalizer = OrderFinalizer::new(&self.checkout, &self.auth, &self.email);
            finalizer
                .finalize(&mut self.store, &mut self.queue, form, user, numbers, self.now)
                .await
        }
    }

    fn numbers() -> OrderNumberGenerator {
        OrderNumberGenerator::seeded(4, 42)
    }

    #[tokio::test]
    async fn test_guest_order_is_placed() {
        let mut fx = Fixture::new().await;
        let form = fx.form();

        let placed = fx.finalize(&form, None, &mut numbers()).await.unwrap();

        assert!(fx.store.drafts.is_empty());
        let stored = &fx.store.orders[0];
        assert_eq!(stored.order.uuid, placed.uuid);
        assert_eq!(stored.order.total, dec("161.50"));
        assert_eq!(stored.order.user_id, None);
        assert_eq!(stored.order.email, "anna@example.com");
        assert_eq!(stored.order.status_id, fx.checkout.new_status_id);
        assert_eq!(stored.order.invoice.kind, InvoiceKind::Personal);
        assert_eq!(stored.order.invoice.name, "Anna Nowak");
        assert!(stored.email_enqueued_at.is_some());
        assert!(stored.cart_cleared_at.is_some());
        assert!(fx.store.lines_of(fx.cart).is_empty());

        let job = &fx.queue.jobs[0];
        assert_eq!(job.template, EmailTemplate::NewOrder);
        assert_eq!(job.email, "anna@example.com");
        assert_eq!(job.bcc_addresses(), vec!["orders@shop.example.com"]);
        assert_eq!(job.payload["order_data"]["order_number"], placed.order_number.as_str());
    }

    #[tokio::test]
    async fn test_order_data_leaves_out_bookkeeping() {
        let mut fx = Fixture::new().await;
        let form = fx.form();

        fx.finalize(&form, None, &mut numbers()).await.unwrap();

        let order_data = fx.queue.jobs[0].payload["order_data"].as_object().unwrap();
        for internal in ["id", "cart_id", "user_id", "email_enqueued_at", "cart_cleared_at"] {
            assert!(!order_data.contains_key(internal), "{internal}");
        }
        for public in ["uuid", "order_number", "status", "lines", "total", "shipping"] {
            assert!(order_data.contains_key(public), "{public}");
        }
    }

    #[tokio::test]
    async fn test_second_finalize_of_same_draft_fails() {
        let mut fx = Fixture::new().await;
        let form = fx.form();
        let mut numbers = numbers();

        fx.finalize(&form, None, &mut numbers).await.unwrap();
        let second = fx.finalize(&form, None, &mut numbers).await;

        assert!(matches!(second, Err(FinalizeError::DraftNotFound)));
        assert_eq!(fx.store.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_validation_reports_every_field() {
        let mut fx = Fixture::new().await;
        let mut form = fx.form();
        form.shipping.first_name.clear();
        form.terms_accepted = false;
        form.shipping_method_uuid = Uuid::new_v4();
        form.payment_method_id = Some(PaymentMethodId::new(99));

        let err = fx.finalize(&form, None, &mut numbers()).await.unwrap_err();

        let FinalizeError::Validation(errors) = &err else {
            panic!("expected validation error, got {err:?}");
        };
        for field in [
            FieldError::InvalidFirstName,
            FieldError::TermsNotAccepted,
            FieldError::InvalidShippingMethod,
            FieldError::InvalidPaymentMethod,
        ] {
            assert!(errors.contains(field), "missing {field}");
        }
        assert!(err.keys().contains(&"invalid_shipping_method"));
        assert!(fx.store.orders.is_empty());
        assert_eq!(fx.store.drafts.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_only_does_not_place() {
        let fx = Fixture::new().await;
        let mut store = fx.store;
        let finalizer = OrderFinalizer::new(&fx.checkout, &fx.auth, &fx.email);
        let form = CheckoutForm {
            draft_order_uuid: fx.draft,
            shipping_method_uuid: fx.method,
            ..CheckoutForm::default()
        };

        let draft = finalizer.validate(&mut store, &form, false, fx.now).await;

        assert!(matches!(draft, Err(FinalizeError::Validation(_))));
        assert!(store.orders.is_empty());
    }

    #[tokio::test]
    async fn test_expired_draft_is_not_found() {
        let mut fx = Fixture::new().await;
        fx.now += chrono::Duration::hours(25);
        let form = fx.form();

        let err = fx.finalize(&form, None, &mut numbers()).await.unwrap_err();

        assert!(matches!(err, FinalizeError::DraftNotFound));
        assert_eq!(err.keys(), vec!["draft_order_not_found"]);
    }

    #[tokio::test]
    async fn test_taken_order_number_is_regenerated() {
        let mut fx = Fixture::new().await;
        let form = fx.form();
        let mut preview = numbers();
        let taken = preview.next_candidate(fx.now);
        let expected = preview.next_candidate(fx.now);
        fx.store.taken_order_numbers.insert(taken.into_inner());

        let placed = fx.finalize(&form, None, &mut numbers()).await.unwrap();

        assert_eq!(placed.order_number, expected);
        assert_eq!(fx.store.order_number_checks, 2);
    }

    #[tokio::test]
    async fn test_order_number_attempts_are_bounded() {
        let mut fx = Fixture::new().await;
        let form = fx.form();
        let mut preview = numbers();
        for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
            let taken = preview.next_candidate(fx.now);
            fx.store.taken_order_numbers.insert(taken.into_inner());
        }

        let err = fx.finalize(&form, None, &mut numbers()).await.unwrap_err();

        assert!(matches!(err, FinalizeError::OrderNumberExhausted));
        assert_eq!(fx.store.drafts.len(), 1);
    }

    #[tokio::test]
    async fn test_company_invoice() {
        let mut fx = Fixture::new().await;
        let mut form = fx.form();
        form.need_invoice = true;
        form.billing = Some(BillingForm {
            name: "Nowak Sp. z o.o.".into(),
            street: "Prosta 1".into(),
            postcode: "00-001".into(),
            city: "Warszawa".into(),
            country_code: Some("PL".into()),
            country: "Polska".into(),
            tax_id: "  ".into(),
            email: None,
        });

        fx.finalize(&form, None, &mut numbers()).await.unwrap();

        let invoice = &fx.store.orders[0].order.invoice;
        assert_eq!(invoice.kind, InvoiceKind::Company);
        assert_eq!(invoice.name, "Nowak Sp. z o.o.");
        assert_eq!(invoice.tax_id, None);
    }

    #[test]
    fn test_invoice_check_matches_schema() {
        let schema = include_str!("../../migrations/20260301000001_schema.sql");

        // The in-memory store enforces the same rule in `place_order`
        assert!(schema.contains("CHECK (kind = 'company' OR tax_id IS NULL)"));
        assert!(!schema.contains("tax_id IS NOT NULL"));
    }

    #[test]
    fn test_personal_invoice_never_carries_tax_id() {
        let mut form = CheckoutForm {
            need_invoice: false,
            ..CheckoutForm::default()
        };
        form.billing = Some(BillingForm {
            tax_id: "5260001246".into(),
            ..BillingForm::default()
        });

        let invoice = invoice_for(&form);

        assert_eq!(invoice.kind, InvoiceKind::Personal);
        assert_eq!(invoice.tax_id, None);
    }

    #[tokio::test]
    async fn test_create_account_at_checkout() {
        let mut fx = Fixture::new().await;
        let mut form = fx.form();
        form.create_account = true;

        fx.finalize(&form, None, &mut numbers()).await.unwrap();

        let user = fx
            .store
            .user_by_email(&Email::parse("anna@example.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fx.store.orders[0].order.user_id, Some(user.id));
        assert!(fx.store.billing_rows.contains_key(&user.id));
        let templates: Vec<_> = fx.queue.jobs.iter().map(|j| j.template).collect();
        assert_eq!(templates, vec![EmailTemplate::AccountCreated, EmailTemplate::NewOrder]);
        assert_eq!(fx.queue.jobs[0].field_str("password").map(str::len), Some(12));
    }

    #[tokio::test]
    async fn test_create_account_with_registered_email() {
        let mut fx = Fixture::new().await;
        fx.store.seed_user("anna@example.com", "x");
        let mut form = fx.form();
        form.create_account = true;

        let err = fx.finalize(&form, None, &mut numbers()).await.unwrap_err();

        assert!(matches!(err, FinalizeError::AccountExists));
        assert_eq!(err.keys(), vec!["account_exists"]);
        assert!(fx.store.orders.is_empty());
    }

    #[tokio::test]
    async fn test_session_user_order() {
        let mut fx = Fixture::new().await;
        let mut form = fx.form();
        form.shipping.email = None;
        let user = CurrentUser {
            id: UserId::new(500),
            email: Email::parse("jan@example.com").unwrap(),
            name: "Jan Kowalski".into(),
        };

        fx.finalize(&form, Some(&user), &mut numbers()).await.unwrap();

        let order = &fx.store.orders[0].order;
        assert_eq!(order.user_id, Some(user.id));
        assert_eq!(order.email, "jan@example.com");
    }

    #[tokio::test]
    async fn test_followup_failure_keeps_order_and_reconciles() {
        let mut fx = Fixture::new().await;
        fx.queue.fail = true;
        let form = fx.form();

        let placed = fx.finalize(&form, None, &mut numbers()).await.unwrap();

        let stored = &fx.store.orders[0];
        assert_eq!(stored.id, placed.id);
        assert!(stored.email_enqueued_at.is_none());
        assert!(stored.cart_cleared_at.is_some());

        fx.queue.fail = false;
        let record = fx.store.order_by_uuid(placed.uuid).await.unwrap().unwrap();
        let outcome = complete_followups(
            &mut fx.store,
            &mut fx.queue,
            &fx.email,
            &record,
            FollowupMode::Reconcile,
            Utc::now(),
        )
        .await;

        assert!(outcome.is_complete());
        assert!(fx.store.orders[0].email_enqueued_at.is_some());
        assert_eq!(fx.queue.jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_leaves_reused_cart_alone() {
        let mut fx = Fixture::new().await;
        let form = fx.form();
        let placed = fx.finalize(&form, None, &mut numbers()).await.unwrap();

        let mut record = fx.store.order_by_uuid(placed.uuid).await.unwrap().unwrap();
        record.cart_cleared_at = None;
        fx.store.seed_line(fx.cart, 3, 2);
        fx.store.carts.get_mut(&fx.cart).unwrap().last_modified_at =
            record.created_at + chrono::Duration::minutes(5);

        let outcome = complete_followups(
            &mut fx.store,
            &mut fx.queue,
            &fx.email,
            &record,
            FollowupMode::Reconcile,
            Utc::now(),
        )
        .await;

        assert!(outcome.cart_cleared);
        assert_eq!(fx.store.lines_of(fx.cart), vec![(3, 2)]);
    }
}
