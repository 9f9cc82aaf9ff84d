use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DatabaseTransaction, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::identifiers::{IdentifierGenerator, MAX_GENERATION_ATTEMPTS};
use super::pricing::{self, LinePrice};
use super::Actor;
use crate::config::AppConfig;
use crate::entities::{
    customer, order, order_item, order_status_history, GarmentType, OrderStatus, PaymentStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// A garment line on an order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemInput {
    #[serde(alias = "clothType", alias = "itemType")]
    pub garment_type: GarmentType,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    /// Free-form measurement map, e.g. `{"chest": 40, "fit": "slim"}`
    #[schema(value_type = Option<Object>)]
    pub measurements: Option<serde_json::Value>,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
    /// Defaults to zero; staff may price the line later
    #[serde(default)]
    #[validate(custom = "validate_non_negative")]
    pub price: Decimal,
}

fn default_quantity() -> i32 {
    1
}

/// Create an order either from `items` or from a single garment with an `amount`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[serde(alias = "customerName")]
    #[validate(length(min = 1, max = 200))]
    pub customer_name: Option<String>,
    #[serde(alias = "phoneNumber", alias = "phone")]
    #[validate(length(min = 5, max = 32))]
    pub phone_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[serde(default)]
    #[validate]
    pub items: Vec<OrderItemInput>,
    #[serde(alias = "clothType")]
    pub garment_type: Option<GarmentType>,
    #[schema(value_type = Option<Object>)]
    pub measurements: Option<serde_json::Value>,
    /// Only honoured for single-garment orders
    #[validate(custom = "validate_non_negative")]
    pub amount: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub discount: Option<Decimal>,
    #[serde(alias = "advancePayment", alias = "advanceAmount")]
    #[validate(custom = "validate_non_negative")]
    pub advance_amount: Option<Decimal>,
    #[serde(alias = "expectedDeliveryDate", alias = "dueDate")]
    pub expected_delivery_date: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Editable order fields. Identifiers, status and advance are not editable here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderRequest {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: Option<String>,
    #[validate(length(min = 5, max = 32))]
    pub phone_number: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    /// Replaces every line when present
    #[validate]
    pub items: Option<Vec<OrderItemInput>>,
    pub garment_type: Option<GarmentType>,
    #[schema(value_type = Option<Object>)]
    pub measurements: Option<serde_json::Value>,
    #[validate(custom = "validate_non_negative")]
    pub amount: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub discount: Option<Decimal>,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_id: Option<Uuid>,
    /// Matches barcode, order number, customer name or phone
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub garment_type: GarmentType,
    pub description: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub measurements: Option<serde_json::Value>,
    pub quantity: i32,
    pub price: Decimal,
    pub line_total: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(item: order_item::Model) -> Self {
        Self {
            line_total: item.line_total(),
            id: item.id,
            garment_type: item.garment_type,
            description: item.description,
            measurements: item.measurements,
            quantity: item.quantity,
            price: item.price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryEntry {
    pub sequence: i32,
    pub status: OrderStatus,
    pub actor_id: Option<Uuid>,
    pub actor_name: Option<String>,
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<order_status_history::Model> for StatusHistoryEntry {
    fn from(entry: order_status_history::Model) -> Self {
        Self {
            sequence: entry.sequence,
            status: entry.status,
            actor_id: entry.actor_id,
            actor_name: entry.actor_name,
            note: entry.note,
            timestamp: entry.created_at,
        }
    }
}

/// Full staff view of an order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub barcode: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub garment_type: Option<GarmentType>,
    #[schema(value_type = Option<Object>)]
    pub measurements: Option<serde_json::Value>,
    pub items: Vec<OrderItemResponse>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub amount: Decimal,
    pub advance_amount: Decimal,
    pub balance_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub tracking_link: String,
    pub notes: Option<String>,
    pub sms_sent: bool,
    pub sms_sent_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// List row without lines or history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    pub barcode: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub phone_number: String,
    pub amount: Decimal,
    pub advance_amount: Decimal,
    pub balance_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<order::Model> for OrderSummary {
    fn from(o: order::Model) -> Self {
        Self {
            id: o.id,
            order_number: o.order_number,
            barcode: o.barcode,
            customer_id: o.customer_id,
            customer_name: o.customer_name,
            phone_number: o.phone_number,
            amount: o.amount,
            advance_amount: o.advance_amount,
            balance_amount: o.balance_amount,
            payment_status: o.payment_status,
            status: o.status,
            expected_delivery_date: o.expected_delivery_date,
            delivery_date: o.delivery_date,
            created_at: o.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingItem {
    pub garment_type: GarmentType,
    pub description: Option<String>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingStatus {
    pub status: OrderStatus,
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

/// Customer-safe projection returned by public tracking.
///
/// Carries no contact details, notes or staff identities.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackingView {
    pub barcode: String,
    pub order_number: String,
    pub customer_name: String,
    pub status: OrderStatus,
    pub status_label: String,
    pub items: Vec<TrackingItem>,
    pub amount: Decimal,
    pub advance_amount: Decimal,
    pub balance_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub status_history: Vec<TrackingStatus>,
    pub created_at: DateTime<Utc>,
}

/// Contact fields resolved for a new order.
struct Contact {
    customer_id: Option<Uuid>,
    name: String,
    phone: String,
    email: Option<String>,
    address: Option<String>,
}

/// Order lifecycle: creation, edits, status transitions and lookups.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    identifiers: IdentifierGenerator,
    config: Arc<AppConfig>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        let identifiers = IdentifierGenerator::from_config(&config);
        Self {
            db,
            event_sender,
            identifiers,
            config,
        }
    }

    async fn resolve_contact(&self, request: &CreateOrderRequest) -> Result<Contact, ServiceError> {
        let trimmed = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let linked = match request.customer_id {
            Some(id) => Some(
                customer::Entity::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("customer {}", id)))?,
            ),
            None => None,
        };

        let name = trimmed(&request.customer_name).or_else(|| linked.as_ref().map(|c| c.name.clone()));
        let phone =
            trimmed(&request.phone_number).or_else(|| linked.as_ref().map(|c| c.phone.clone()));

        match (name, phone) {
            (Some(name), Some(phone)) => Ok(Contact {
                customer_id: linked.as_ref().map(|c| c.id),
                name,
                phone,
                email: trimmed(&request.email)
                    .or_else(|| linked.as_ref().and_then(|c| c.email.clone())),
                address: trimmed(&request.address)
                    .or_else(|| linked.as_ref().and_then(|c| c.address.clone())),
            }),
            _ => Err(ServiceError::ValidationError(
                "customer_name and phone_number are required unless customer_id is given".into(),
            )),
        }
    }

    /// Creates an order with its lines and first history entry.
    ///
    /// Order, lines, history and the customer's running totals are written in
    /// one transaction. A unique-index conflict on the generated identifiers
    /// regenerates them and retries.
    #[instrument(skip(self, request, actor))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        actor: &Actor,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        if request.items.is_empty() && request.garment_type.is_none() {
            return Err(ServiceError::ValidationError(
                "either items or garment_type is required".into(),
            ));
        }

        let contact = self.resolve_contact(&request).await?;

        let lines: Vec<LinePrice> = request
            .items
            .iter()
            .map(|i| LinePrice::new(i.price, i.quantity))
            .collect();
        let totals = pricing::compute_totals(
            &lines,
            request.discount.unwrap_or_default(),
            request.amount.unwrap_or_default(),
            request.advance_amount.unwrap_or_default(),
        );

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let barcode = self.identifiers.unique_barcode(&*self.db).await?;
            let order_number = self.identifiers.next_order_number(&*self.db).await?;

            let txn = self.db.begin().await.map_err(|e| {
                error!(error = %e, "Failed to start transaction for order creation");
                ServiceError::DatabaseError(e)
            })?;

            let result = self
                .insert_order_rows(&txn, &request, &contact, &totals, &barcode, &order_number, actor)
                .await;

            match result {
                Ok(order_id) => {
                    txn.commit().await.map_err(|e| {
                        error!(error = %e, order_id = %order_id, "Failed to commit order creation");
                        ServiceError::DatabaseError(e)
                    })?;

                    info!(order_id = %order_id, barcode = %barcode, order_number = %order_number, "Order created");
                    crate::metrics::record_order_created();
                    self.event_sender
                        .send_or_log(Event::OrderCreated(order_id))
                        .await;
                    return self.get_order(order_id).await;
                }
                Err(e) => {
                    if let Err(rollback) = txn.rollback().await {
                        warn!(error = %rollback, "Rollback after failed order insert failed");
                    }
                    if e.is_conflict() {
                        warn!(attempt, barcode = %barcode, order_number = %order_number, "Identifier conflict, regenerating");
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(ServiceError::GenerationFailed(format!(
            "could not allocate unique order identifiers after {} attempts",
            MAX_GENERATION_ATTEMPTS
        )))
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_order_rows(
        &self,
        txn: &DatabaseTransaction,
        request: &CreateOrderRequest,
        contact: &Contact,
        totals: &pricing::Totals,
        barcode: &str,
        order_number: &str,
        actor: &Actor,
    ) -> Result<Uuid, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.to_string()),
            barcode: Set(barcode.to_string()),
            customer_id: Set(contact.customer_id),
            customer_name: Set(contact.name.clone()),
            phone_number: Set(contact.phone.clone()),
            email: Set(contact.email.clone()),
            address: Set(contact.address.clone()),
            garment_type: Set(request.garment_type),
            measurements: Set(request.measurements.clone()),
            subtotal: Set(totals.subtotal),
            discount: Set(request.discount.unwrap_or_default()),
            amount: Set(totals.amount),
            advance_amount: Set(request.advance_amount.unwrap_or_default()),
            balance_amount: Set(totals.balance_amount),
            payment_status: Set(totals.payment_status),
            status: Set(OrderStatus::Pending),
            expected_delivery_date: Set(request.expected_delivery_date),
            delivery_date: Set(None),
            tracking_link: Set(self.config.tracking_link(barcode)),
            notes: Set(request.notes.clone()),
            sms_sent: Set(false),
            sms_sent_at: Set(None),
            created_by: Set(actor.id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await
        .map_err(|e| ServiceError::from_write(e, "order identifier"))?;

        insert_items(txn, order_id, &request.items).await?;

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            sequence: Set(1),
            status: Set(OrderStatus::Pending),
            actor_id: Set(actor.id),
            actor_name: Set(actor.name.clone()),
            note: Set(Some("Order created".to_string())),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;

        if let Some(customer_id) = contact.customer_id {
            customer::Entity::update_many()
                .col_expr(
                    customer::Column::TotalOrders,
                    Expr::col(customer::Column::TotalOrders).add(1),
                )
                .col_expr(
                    customer::Column::TotalSpent,
                    Expr::col(customer::Column::TotalSpent).add(totals.amount),
                )
                .col_expr(customer::Column::UpdatedAt, Expr::value(now))
                .filter(customer::Column::Id.eq(customer_id))
                .exec(txn)
                .await?;
        }

        Ok(order_id)
    }

    /// Edits an order and recomputes its derived fields.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn update_order(
        &self,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;
        let result = self.apply_update(&txn, order_id, request).await;
        match result {
            Ok(()) => txn.commit().await?,
            Err(e) => {
                let _ = txn.rollback().await;
                return Err(e);
            }
        }

        info!(order_id = %order_id, "Order updated");
        self.get_order(order_id).await
    }

    async fn apply_update(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<(), ServiceError> {
        let existing = find_order(txn, order_id).await?;

        let lines: Vec<LinePrice> = match &request.items {
            Some(items) => {
                order_item::Entity::delete_many()
                    .filter(order_item::Column::OrderId.eq(order_id))
                    .exec(txn)
                    .await?;
                insert_items(txn, order_id, items).await?;
                items
                    .iter()
                    .map(|i| LinePrice::new(i.price, i.quantity))
                    .collect()
            }
            None => load_items(txn, order_id)
                .await?
                .iter()
                .map(|i| LinePrice::new(i.price, i.quantity))
                .collect(),
        };

        if !lines.is_empty() && request.amount.is_some() {
            return Err(ServiceError::ValidationError(
                "amount is derived from items and cannot be set directly".into(),
            ));
        }

        let discount = request.discount.unwrap_or(existing.discount);
        let amount = request.amount.unwrap_or(existing.amount);
        let totals = pricing::compute_totals(&lines, discount, amount, existing.advance_amount);

        let mut active = existing.into_active_model();
        if let Some(name) = request.customer_name {
            active.customer_name = Set(name);
        }
        if let Some(phone) = request.phone_number {
            active.phone_number = Set(phone);
        }
        if let Some(email) = request.email {
            active.email = Set(Some(email));
        }
        if let Some(address) = request.address {
            active.address = Set(Some(address));
        }
        if let Some(garment) = request.garment_type {
            active.garment_type = Set(Some(garment));
        }
        if let Some(measurements) = request.measurements {
            active.measurements = Set(Some(measurements));
        }
        if let Some(date) = request.expected_delivery_date {
            active.expected_delivery_date = Set(Some(date));
        }
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        active.discount = Set(discount);
        active.subtotal = Set(totals.subtotal);
        active.amount = Set(totals.amount);
        active.update(txn).await?;
        Ok(())
    }

    /// Moves an order to `status`, appending to its history.
    ///
    /// Setting the status it already holds changes nothing. Any status may
    /// follow any other.
    #[instrument(skip(self, request, actor), fields(order_id = %order_id, new_status = %request.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
        actor: &Actor,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;
        let result = transition(&txn, order_id, request.status, request.note, actor).await;
        let old_status = match result {
            Ok(old) => {
                txn.commit().await.map_err(|e| {
                    error!(error = %e, order_id = %order_id, "Failed to commit status change");
                    ServiceError::DatabaseError(e)
                })?;
                old
            }
            Err(e) => {
                let _ = txn.rollback().await;
                return Err(e);
            }
        };

        if let Some(old_status) = old_status {
            info!(order_id = %order_id, from = %old_status, to = %request.status, "Order status changed");
            crate::metrics::record_status_change(&request.status.to_string());
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status: request.status,
                })
                .await;
        }

        self.get_order(order_id).await
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db;
        let order = find_order(db, order_id).await?;
        let items = load_items(db, order_id).await?;
        let history = load_history(db, order_id).await?;
        Ok(to_response(order, items, history))
    }

    /// Case-insensitive barcode lookup.
    pub async fn find_by_barcode(&self, barcode: &str) -> Result<order::Model, ServiceError> {
        let normalized = barcode.trim().to_ascii_uppercase();
        order::Entity::find()
            .filter(order::Column::Barcode.eq(normalized.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order with barcode {}", normalized)))
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> Result<OrderResponse, ServiceError> {
        let order = self.find_by_barcode(barcode).await?;
        self.get_order(order.id).await
    }

    /// Public tracking view for a barcode in any casing.
    #[instrument(skip(self))]
    pub async fn track(&self, barcode: &str) -> Result<TrackingView, ServiceError> {
        let order = self.find_by_barcode(barcode).await?;
        let items = load_items(&*self.db, order.id).await?;
        let history = load_history(&*self.db, order.id).await?;
        Ok(to_tracking_view(order, items, history))
    }

    pub async fn history(&self, order_id: Uuid) -> Result<Vec<StatusHistoryEntry>, ServiceError> {
        find_order(&*self.db, order_id).await?;
        Ok(load_history(&*self.db, order_id)
            .await?
            .into_iter()
            .map(StatusHistoryEntry::from)
            .collect())
    }

    /// Newest first; returns the page and the total match count.
    pub async fn list_orders(
        &self,
        filter: &OrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderSummary>, u64), ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.filter(order::Column::PaymentStatus.eq(payment_status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(order::Column::Barcode.contains(search.to_ascii_uppercase().as_str()))
                    .add(order::Column::OrderNumber.contains(search))
                    .add(order::Column::CustomerName.contains(search))
                    .add(order::Column::PhoneNumber.contains(search)),
            );
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders.into_iter().map(OrderSummary::from).collect(), total))
    }

    /// Orders belonging to the customer profile linked to `user_id`.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderSummary>, u64), ServiceError> {
        let profile = customer::Entity::find()
            .filter(customer::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?;
        match profile {
            Some(profile) => {
                let filter = OrderFilter {
                    customer_id: Some(profile.id),
                    ..Default::default()
                };
                self.list_orders(&filter, page, per_page).await
            }
            None => Ok((Vec::new(), 0)),
        }
    }
}

/// Applies a status change inside `txn`. Returns the previous status, or
/// `None` when the order already held `new_status`.
pub(crate) async fn transition(
    txn: &DatabaseTransaction,
    order_id: Uuid,
    new_status: OrderStatus,
    note: Option<String>,
    actor: &Actor,
) -> Result<Option<OrderStatus>, ServiceError> {
    let order = find_order(txn, order_id).await?;
    let old_status = order.status;
    if old_status == new_status {
        return Ok(None);
    }

    let now = Utc::now();
    let stamp_delivery = new_status.is_terminal_delivery() && order.delivery_date.is_none();

    let last_sequence: Option<i32> = order_status_history::Entity::find()
        .select_only()
        .column(order_status_history::Column::Sequence)
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .order_by_desc(order_status_history::Column::Sequence)
        .into_tuple()
        .one(txn)
        .await?;

    let mut active = order.into_active_model();
    active.status = Set(new_status);
    if stamp_delivery {
        active.delivery_date = Set(Some(now));
    }
    active.update(txn).await?;

    order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        sequence: Set(last_sequence.unwrap_or(0) + 1),
        status: Set(new_status),
        actor_id: Set(actor.id),
        actor_name: Set(actor.name.clone()),
        note: Set(note),
        created_at: Set(now),
    }
    .insert(txn)
    .await
    .map_err(|e| ServiceError::from_write(e, "status history entry"))?;

    Ok(Some(old_status))
}

pub(crate) async fn find_order<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(db)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to fetch order");
            ServiceError::DatabaseError(e)
        })?
        .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))
}

async fn insert_items<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
    items: &[OrderItemInput],
) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    let rows = items
        .iter()
        .enumerate()
        .map(|(position, item)| order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            position: Set(position as i32),
            garment_type: Set(item.garment_type),
            description: Set(item.description.clone()),
            measurements: Set(item.measurements.clone()),
            quantity: Set(item.quantity),
            price: Set(item.price),
            created_at: Set(now),
        });
    order_item::Entity::insert_many(rows).exec(db).await?;
    Ok(())
}

async fn load_items<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
) -> Result<Vec<order_item::Model>, ServiceError> {
    Ok(order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Position)
        .all(db)
        .await?)
}

async fn load_history<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
) -> Result<Vec<order_status_history::Model>, ServiceError> {
    Ok(order_status_history::Entity::find()
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .order_by_asc(order_status_history::Column::Sequence)
        .all(db)
        .await?)
}

fn to_response(
    order: order::Model,
    items: Vec<order_item::Model>,
    history: Vec<order_status_history::Model>,
) -> OrderResponse {
    OrderResponse {
        id: order.id,
        order_number: order.order_number,
        barcode: order.barcode,
        customer_id: order.customer_id,
        customer_name: order.customer_name,
        phone_number: order.phone_number,
        email: order.email,
        address: order.address,
        garment_type: order.garment_type,
        measurements: order.measurements,
        items: items.into_iter().map(OrderItemResponse::from).collect(),
        subtotal: order.subtotal,
        discount: order.discount,
        amount: order.amount,
        advance_amount: order.advance_amount,
        balance_amount: order.balance_amount,
        payment_status: order.payment_status,
        status: order.status,
        status_history: history.into_iter().map(StatusHistoryEntry::from).collect(),
        expected_delivery_date: order.expected_delivery_date,
        delivery_date: order.delivery_date,
        tracking_link: order.tracking_link,
        notes: order.notes,
        sms_sent: order.sms_sent,
        sms_sent_at: order.sms_sent_at,
        created_by: order.created_by,
        created_at: order.created_at,
        updated_at: order.updated_at,
    }
}

fn to_tracking_view(
    order: order::Model,
    items: Vec<order_item::Model>,
    history: Vec<order_status_history::Model>,
) -> TrackingView {
    let mut tracking_items: Vec<TrackingItem> = items
        .into_iter()
        .map(|i| TrackingItem {
            garment_type: i.garment_type,
            description: i.description,
            quantity: i.quantity,
        })
        .collect();
    if tracking_items.is_empty() {
        if let Some(garment_type) = order.garment_type {
            tracking_items.push(TrackingItem {
                garment_type,
                description: None,
                quantity: 1,
            });
        }
    }

    TrackingView {
        barcode: order.barcode,
        order_number: order.order_number,
        customer_name: order.customer_name,
        status: order.status,
        status_label: order.status.label().to_string(),
        items: tracking_items,
        amount: order.amount,
        advance_amount: order.advance_amount,
        balance_amount: order.balance_amount,
        payment_status: order.payment_status,
        expected_delivery_date: order.expected_delivery_date,
        delivery_date: order.delivery_date,
        status_history: history
            .into_iter()
            .map(|h| TrackingStatus {
                status: h.status,
                label: h.status.label().to_string(),
                timestamp: h.created_at,
            })
            .collect(),
        created_at: order.created_at,
    }
}
