use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::pricing;

/// Workflow stage of a garment order.
///
/// Both the detailed shop-floor stages and the simplified customer-facing
/// stages are accepted. Any stage may follow any other.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "measuring")]
    Measuring,
    #[sea_orm(string_value = "stitching")]
    Stitching,
    #[sea_orm(string_value = "qc")]
    Qc,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "measurement-taken")]
    MeasurementTaken,
    #[sea_orm(string_value = "cutting-done")]
    CuttingDone,
    #[sea_orm(string_value = "stitching-in-progress")]
    StitchingInProgress,
    #[sea_orm(string_value = "ready-for-trial")]
    ReadyForTrial,
    #[sea_orm(string_value = "trial-done")]
    TrialDone,
    #[sea_orm(string_value = "ready-for-delivery")]
    ReadyForDelivery,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "picked-up")]
    PickedUp,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Human readable label used in customer messages.
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Received => "Received",
            OrderStatus::Measuring => "Measuring",
            OrderStatus::Stitching => "Stitching",
            OrderStatus::Qc => "Quality Check",
            OrderStatus::Ready => "Ready",
            OrderStatus::Pending => "Pending",
            OrderStatus::MeasurementTaken => "Measurement Taken",
            OrderStatus::CuttingDone => "Cutting Done",
            OrderStatus::StitchingInProgress => "Stitching In Progress",
            OrderStatus::ReadyForTrial => "Ready For Trial",
            OrderStatus::TrialDone => "Trial Done",
            OrderStatus::ReadyForDelivery => "Ready For Delivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::PickedUp => "Picked Up",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    /// Statuses that trigger the "ready for pickup" notification.
    pub fn is_ready_for_pickup(&self) -> bool {
        matches!(self, OrderStatus::Ready | OrderStatus::ReadyForDelivery)
    }

    /// Statuses that stamp the delivery date.
    pub fn is_terminal_delivery(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::PickedUp)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "paid")]
    Paid,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GarmentType {
    #[sea_orm(string_value = "shirt")]
    Shirt,
    #[sea_orm(string_value = "pants")]
    Pants,
    #[sea_orm(string_value = "suit")]
    Suit,
    #[sea_orm(string_value = "dress")]
    Dress,
    #[sea_orm(string_value = "kurta")]
    Kurta,
    #[sea_orm(string_value = "blouse")]
    Blouse,
    #[sea_orm(string_value = "other")]
    Other,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    #[sea_orm(unique)]
    pub barcode: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub address: Option<String>,
    /// Garment type for single-item orders
    pub garment_type: Option<GarmentType>,
    /// Measurements for single-item orders
    pub measurements: Option<Json>,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub advance_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))")]
    pub balance_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
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

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::order_status_history::Entity")]
    StatusHistory,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payment,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::order_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

fn current<V>(value: &ActiveValue<V>) -> Option<&V>
where
    V: Into<sea_orm::Value>,
{
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v),
        ActiveValue::NotSet => None,
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    /// Balance and payment status are never persisted stale.
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if let (Some(amount), Some(advance)) =
            (current(&self.amount).copied(), current(&self.advance_amount).copied())
        {
            let settled = pricing::settle(amount, advance);
            self.balance_amount = ActiveValue::Set(settled.balance_amount);
            self.payment_status = ActiveValue::Set(settled.payment_status);
        }
        self.updated_at = ActiveValue::Set(Utc::now());
        Ok(self)
    }
}
