//! Payment reconciliation for manual, checkout-verified and webhook payments.
//!
//! Every path ends in [`PaymentService::apply_payment`], which writes the
//! payment row and bumps the order's advance in one transaction.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::orders::find_order;
use super::Actor;
use crate::config::AppConfig;
use crate::entities::{
    gateway_checkout, payment, PaymentMethod, PaymentRecordStatus, PaymentStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC of a webhook body.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

const DEFAULT_CURRENCY: &str = "INR";

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::InternalError(format!("invalid HMAC key: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature against `payload`.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Payload signed by the gateway on checkout completion.
pub fn checkout_payload(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    format!("{}|{}", gateway_order_id, gateway_payment_id)
}

fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::InvalidInput(format!("amount {} out of range", amount)))
}

fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

fn validate_positive(value: &Decimal) -> Result<(), validator::ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = validator::ValidationError::new("positive");
        err.message = Some("must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

/// Manual payment taken at the counter.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RecordPaymentRequest {
    pub order_id: Uuid,
    #[validate(custom = "validate_positive")]
    pub amount: Decimal,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateGatewayOrderRequest {
    pub order_id: Uuid,
    /// Defaults to the outstanding balance
    #[validate(custom = "validate_positive")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayOrderResponse {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub amount: Decimal,
    pub currency: String,
    /// Public key id for the checkout widget
    pub key_id: Option<String>,
}

/// Checkout completion reported by the client.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 128))]
    pub gateway_order_id: String,
    #[validate(length(min = 1, max = 128))]
    pub gateway_payment_id: String,
    #[validate(length(min = 1, max = 256))]
    pub signature: String,
    /// Must equal the amount the checkout was opened for
    #[validate(custom = "validate_positive")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentRecordStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<payment::Model> for PaymentView {
    fn from(p: payment::Model) -> Self {
        Self {
            id: p.id,
            order_id: p.order_id,
            customer_id: p.customer_id,
            amount: p.amount,
            currency: p.currency,
            method: p.method,
            status: p.status,
            gateway_order_id: p.gateway_order_id,
            gateway_payment_id: p.gateway_payment_id,
            notes: p.notes,
            recorded_by: p.recorded_by,
            created_at: p.created_at,
        }
    }
}

/// Order balance after a payment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderSettlement {
    pub amount: Decimal,
    pub advance_amount: Decimal,
    pub balance_amount: Decimal,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub payment: PaymentView,
    pub order: OrderSettlement,
    /// True when the gateway payment id was already recorded
    pub duplicate: bool,
}

/// Gateway webhook body; only the fields we act on.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: Option<WebhookPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub payment: WebhookPaymentWrapper,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPaymentWrapper {
    pub entity: WebhookPayment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayment {
    pub id: String,
    pub order_id: Option<String>,
    /// Minor currency units
    pub amount: i64,
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: serde_json::Value,
}

impl WebhookPayment {
    /// Our order id, carried in the gateway's free-form notes.
    fn notes_order_id(&self) -> Result<Uuid, ServiceError> {
        self.notes
            .get("order_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| ServiceError::BadRequest("webhook payment carries no order_id".into()))
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied(PaymentResponse),
    Ignored { event: String },
}

/// Everything needed to apply one payment.
#[derive(Debug, Clone)]
pub struct ApplyPayment {
    pub order_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub currency: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub notes: Option<String>,
}

impl ApplyPayment {
    pub fn manual(order_id: Uuid, amount: Decimal, method: PaymentMethod) -> Self {
        Self {
            order_id,
            amount,
            method,
            currency: DEFAULT_CURRENCY.to_string(),
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_signature: None,
            notes: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GatewayOrderBody {
    id: String,
    amount: i64,
    currency: String,
}

/// HTTP client for creating gateway-side orders.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: Option<String>,
    key_id: Option<String>,
    key_secret: Option<String>,
}

impl GatewayClient {
    pub fn new(
        client: reqwest::Client,
        base_url: Option<String>,
        key_id: Option<String>,
        key_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url,
            key_id,
            key_secret,
        }
    }

    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        Self::new(
            client,
            config.gateway_api_url.clone(),
            config.gateway_key_id.clone(),
            config.gateway_key_secret.clone(),
        )
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Creates an order on the gateway for `amount` in major units. Our
    /// order id goes into the notes, which the gateway echoes on webhooks.
    #[instrument(skip(self))]
    pub async fn create_order(
        &self,
        order_id: Uuid,
        amount: Decimal,
        currency: &str,
        receipt: &str,
    ) -> Result<(String, Decimal, String), ServiceError> {
        let (Some(base_url), Some(key_id), Some(key_secret)) =
            (&self.base_url, &self.key_id, &self.key_secret)
        else {
            return Err(ServiceError::ServiceUnavailable(
                "payment gateway is not configured".into(),
            ));
        };

        let url = format!("{}/orders", base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "amount": to_minor_units(amount)?,
            "currency": currency,
            "receipt": receipt,
            "notes": { "order_id": order_id.to_string() },
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(key_id, Some(key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gateway order request failed");
                ServiceError::ExternalServiceError(format!("gateway unreachable: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "Gateway rejected order");
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway returned {}",
                status
            )));
        }

        let created: GatewayOrderBody = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("unexpected gateway response: {}", e))
        })?;
        Ok((created.id, from_minor_units(created.amount), created.currency))
    }
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    gateway: GatewayClient,
    key_secret: Option<String>,
    webhook_secret: Option<String>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        gateway: GatewayClient,
        key_secret: Option<String>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
            key_secret,
            webhook_secret,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        client: reqwest::Client,
    ) -> Self {
        Self::new(
            db,
            event_sender,
            GatewayClient::from_config(config, client),
            config.gateway_key_secret.clone(),
            config.gateway_webhook_secret.clone(),
        )
    }

    /// Records a completed payment and adds it to the order's advance.
    ///
    /// Overpayment is accepted. A gateway payment id that is already recorded
    /// returns the existing payment with `duplicate` set and changes nothing.
    #[instrument(skip(self, input, actor), fields(order_id = %input.order_id, method = %input.method))]
    pub async fn apply_payment(
        &self,
        input: ApplyPayment,
        actor: &Actor,
    ) -> Result<PaymentResponse, ServiceError> {
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "amount must be greater than zero".into(),
            ));
        }

        if let Some(existing) = self.find_duplicate(input.gateway_payment_id.as_deref()).await? {
            return Ok(existing);
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start payment transaction");
            ServiceError::DatabaseError(e)
        })?;

        let result = insert_and_settle(&txn, &input, actor).await;
        let (payment, settlement) = match result {
            Ok(applied) => {
                txn.commit().await.map_err(|e| {
                    error!(error = %e, order_id = %input.order_id, "Failed to commit payment");
                    ServiceError::DatabaseError(e)
                })?;
                applied
            }
            Err(e) => {
                let _ = txn.rollback().await;
                if e.is_conflict() {
                    // lost a race with a concurrent delivery of the same gateway payment
                    if let Some(existing) =
                        self.find_duplicate(input.gateway_payment_id.as_deref()).await?
                    {
                        return Ok(existing);
                    }
                }
                return Err(e);
            }
        };

        info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            amount = %payment.amount,
            payment_status = %settlement.payment_status,
            "Payment applied"
        );
        crate::metrics::record_payment_applied(&payment.method.to_string());
        self.event_sender
            .send_or_log(Event::PaymentApplied {
                order_id: payment.order_id,
                payment_id: payment.id,
                amount: payment.amount,
            })
            .await;

        Ok(PaymentResponse {
            payment: payment.into(),
            order: settlement,
            duplicate: false,
        })
    }

    async fn find_duplicate(
        &self,
        gateway_payment_id: Option<&str>,
    ) -> Result<Option<PaymentResponse>, ServiceError> {
        let Some(gateway_payment_id) = gateway_payment_id else {
            return Ok(None);
        };
        let Some(existing) = payment::Entity::find()
            .filter(payment::Column::GatewayPaymentId.eq(gateway_payment_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        info!(gateway_payment_id, payment_id = %existing.id, "Gateway payment already recorded");
        let order = find_order(&*self.db, existing.order_id).await?;
        Ok(Some(PaymentResponse {
            payment: existing.into(),
            order: OrderSettlement {
                amount: order.amount,
                advance_amount: order.advance_amount,
                balance_amount: order.balance_amount,
                payment_status: order.payment_status,
            },
            duplicate: true,
        }))
    }

    pub async fn record_manual(
        &self,
        request: RecordPaymentRequest,
        actor: &Actor,
    ) -> Result<PaymentResponse, ServiceError> {
        request.validate()?;
        let mut input = ApplyPayment::manual(request.order_id, request.amount, request.method);
        input.notes = request.notes;
        self.apply_payment(input, actor).await
    }

    pub async fn list_for_order(&self, order_id: Uuid) -> Result<Vec<PaymentView>, ServiceError> {
        find_order(&*self.db, order_id).await?;
        Ok(payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_asc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(PaymentView::from)
            .collect())
    }

    /// Opens a gateway checkout for an order.
    pub async fn create_gateway_order(
        &self,
        request: CreateGatewayOrderRequest,
    ) -> Result<GatewayOrderResponse, ServiceError> {
        request.validate()?;
        let order = find_order(&*self.db, request.order_id).await?;
        let amount = match request.amount {
            Some(amount) => amount,
            None if order.balance_amount > Decimal::ZERO => order.balance_amount,
            None => {
                return Err(ServiceError::BadRequest(format!(
                    "order {} has no outstanding balance",
                    order.barcode
                )))
            }
        };

        let (gateway_order_id, amount, currency) = self
            .gateway
            .create_order(order.id, amount, DEFAULT_CURRENCY, &order.order_number)
            .await?;

        gateway_checkout::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            gateway_order_id: Set(gateway_order_id.clone()),
            amount: Set(amount),
            currency: Set(currency.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_write(e, "gateway checkout"))?;
        info!(order_id = %order.id, gateway_order_id = %gateway_order_id, %amount, "Gateway order created");

        Ok(GatewayOrderResponse {
            order_id: order.id,
            gateway_order_id,
            amount,
            currency,
            key_id: self.gateway.key_id().map(str::to_string),
        })
    }

    /// Verifies a checkout signature and applies the payment.
    #[instrument(skip(self, request, actor), fields(order_id = %request.order_id))]
    pub async fn verify_gateway_payment(
        &self,
        request: VerifyPaymentRequest,
        actor: &Actor,
    ) -> Result<PaymentResponse, ServiceError> {
        request.validate()?;
        let secret = self.key_secret.as_deref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("payment gateway is not configured".into())
        })?;

        let payload = checkout_payload(&request.gateway_order_id, &request.gateway_payment_id);
        if !verify_signature(secret, payload.as_bytes(), &request.signature) {
            warn!(gateway_payment_id = %request.gateway_payment_id, "Checkout signature mismatch");
            return Err(ServiceError::InvalidSignature(
                "payment signature verification failed".into(),
            ));
        }

        // the signature covers only the gateway ids; order and amount come from our record
        let checkout = self
            .find_checkout(&request.gateway_order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest(format!(
                    "unknown gateway order {}",
                    request.gateway_order_id
                ))
            })?;
        if checkout.order_id != request.order_id {
            warn!(
                gateway_order_id = %checkout.gateway_order_id,
                checkout_order_id = %checkout.order_id,
                "Checkout presented for a different order"
            );
            return Err(ServiceError::BadRequest(format!(
                "gateway order {} does not belong to order {}",
                checkout.gateway_order_id, request.order_id
            )));
        }
        if let Some(amount) = request.amount {
            if amount != checkout.amount {
                warn!(claimed = %amount, expected = %checkout.amount, "Checkout amount mismatch");
                return Err(ServiceError::BadRequest(format!(
                    "amount {} does not match checkout amount {}",
                    amount, checkout.amount
                )));
            }
        }

        self.apply_payment(
            ApplyPayment {
                order_id: checkout.order_id,
                amount: checkout.amount,
                method: PaymentMethod::Gateway,
                currency: checkout.currency,
                gateway_order_id: Some(request.gateway_order_id),
                gateway_payment_id: Some(request.gateway_payment_id),
                gateway_signature: Some(request.signature),
                notes: None,
            },
            actor,
        )
        .await
    }

    /// Handles a raw webhook delivery. The signature is checked before the
    /// body is parsed.
    #[instrument(skip(self, body, signature), fields(body_len = body.len()))]
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("payment webhook is not configured".into())
        })?;

        let signature = signature.ok_or_else(|| {
            ServiceError::InvalidSignature(format!("missing {} header", SIGNATURE_HEADER))
        })?;
        if !verify_signature(secret, body, signature) {
            warn!("Webhook signature mismatch");
            return Err(ServiceError::InvalidSignature(
                "webhook signature verification failed".into(),
            ));
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid webhook payload: {}", e)))?;

        if envelope.event != "payment.captured" {
            info!(event = %envelope.event, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored {
                event: envelope.event,
            });
        }

        let entity = envelope
            .payload
            .map(|p| p.payment.entity)
            .ok_or_else(|| ServiceError::BadRequest("webhook payload missing payment".into()))?;
        let order_id = self.webhook_order_id(&entity).await?;

        let applied = self
            .apply_payment(
                ApplyPayment {
                    order_id,
                    amount: from_minor_units(entity.amount),
                    method: PaymentMethod::Gateway,
                    currency: entity
                        .currency
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                    gateway_order_id: entity.order_id.clone(),
                    gateway_payment_id: Some(entity.id.clone()),
                    gateway_signature: Some(signature.to_string()),
                    notes: Some("gateway webhook".to_string()),
                },
                &Actor::named("gateway-webhook"),
            )
            .await?;
        Ok(WebhookOutcome::Applied(applied))
    }

    async fn find_checkout(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<gateway_checkout::Model>, ServiceError> {
        Ok(gateway_checkout::Entity::find()
            .filter(gateway_checkout::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?)
    }

    /// A checkout we opened is authoritative; otherwise fall back to notes.
    async fn webhook_order_id(&self, entity: &WebhookPayment) -> Result<Uuid, ServiceError> {
        if let Some(gateway_order_id) = entity.order_id.as_deref() {
            if let Some(checkout) = self.find_checkout(gateway_order_id).await? {
                return Ok(checkout.order_id);
            }
        }
        entity.notes_order_id()
    }
}

async fn insert_and_settle(
    txn: &DatabaseTransaction,
    input: &ApplyPayment,
    actor: &Actor,
) -> Result<(payment::Model, OrderSettlement), ServiceError> {
    let order = find_order(txn, input.order_id).await?;

    let payment = payment::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        customer_id: Set(order.customer_id),
        amount: Set(input.amount),
        currency: Set(input.currency.clone()),
        method: Set(input.method),
        status: Set(PaymentRecordStatus::Completed),
        gateway_order_id: Set(input.gateway_order_id.clone()),
        gateway_payment_id: Set(input.gateway_payment_id.clone()),
        gateway_signature: Set(input.gateway_signature.clone()),
        notes: Set(input.notes.clone()),
        recorded_by: Set(actor.id),
        created_at: Set(Utc::now()),
    }
    .insert(txn)
    .await
    .map_err(|e| ServiceError::from_write(e, "gateway payment"))?;

    let advance = order.advance_amount + input.amount;
    let mut active = order.into_active_model();
    active.advance_amount = Set(advance);
    let updated = active.update(txn).await?;

    Ok((
        payment,
        OrderSettlement {
            amount: updated.amount,
            advance_amount: updated.advance_amount,
            balance_amount: updated.balance_amount,
            payment_status: updated.payment_status,
        },
    ))
}
