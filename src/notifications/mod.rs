//! Best-effort customer notifications.
//!
//! Dispatch never fails the state change that triggered it: every provider
//! call resolves to a [`DeliveryOutcome`] which is logged and counted.

pub mod email;
pub mod sms;
pub mod templates;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::{
    customer, notification, order, order_item, user, NotificationType, OrderStatus,
};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::services::notifications::{InAppNotificationService, NewNotification};
use crate::tracing::{log_error, ErrorKind};

pub use email::HttpEmailProvider;
pub use sms::{HttpSmsProvider, TextChannel};

/// Notification provider errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider rejected request with status {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Sends text messages (SMS or WhatsApp).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Channel label, e.g. "sms" or "whatsapp"
    fn channel(&self) -> &'static str;

    /// Returns the provider's message id.
    async fn send_text(&self, to: &str, body: &str) -> Result<String, NotificationError>;
}

/// Sends plain-text email.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Returns the provider's message id.
    async fn send_email(&self, to: &str, subject: &str, body: &str)
        -> Result<String, NotificationError>;
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent { provider_id: String },
    NotConfigured { channel: String },
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Sent { .. } => "sent",
            DeliveryOutcome::NotConfigured { .. } => "not_configured",
            DeliveryOutcome::Failed { .. } => "failed",
        }
    }
}

/// Prefixes `default_country_code` when the number has no leading '+'.
///
/// Separators are dropped and local trunk zeros are stripped first.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    if trimmed.starts_with('+') {
        return Some(format!("+{}", digits));
    }

    let local = digits.trim_start_matches('0');
    if local.is_empty() {
        return None;
    }
    let code: String = default_country_code
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    Some(format!("+{}{}", code, local))
}

/// Routes domain events to SMS, email and in-app notifications.
pub struct NotificationDispatcher {
    db: Arc<DatabaseConnection>,
    sms: Option<Arc<dyn SmsProvider>>,
    email: Option<Arc<dyn EmailProvider>>,
    in_app: InAppNotificationService,
    shop_name: String,
    default_country_code: String,
}

impl NotificationDispatcher {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sms: Option<Arc<dyn SmsProvider>>,
        email: Option<Arc<dyn EmailProvider>>,
        shop_name: impl Into<String>,
        default_country_code: impl Into<String>,
    ) -> Self {
        let in_app = InAppNotificationService::new(db.clone());
        Self {
            db,
            sms,
            email,
            in_app,
            shop_name: shop_name.into(),
            default_country_code: default_country_code.into(),
        }
    }

    /// Builds the dispatcher with whichever providers are fully configured.
    pub fn from_config(
        config: &AppConfig,
        db: Arc<DatabaseConnection>,
        client: reqwest::Client,
    ) -> Self {
        let sms = HttpSmsProvider::from_config(config, client.clone())
            .map(|p| Arc::new(p) as Arc<dyn SmsProvider>);
        let email = HttpEmailProvider::from_config(config, client)
            .map(|p| Arc::new(p) as Arc<dyn EmailProvider>);
        if sms.is_none() {
            info!("SMS provider not configured; text notifications disabled");
        }
        if email.is_none() {
            info!("Email provider not configured; email notifications disabled");
        }
        Self::new(
            db,
            sms,
            email,
            config.shop_name.clone(),
            config.default_country_code.clone(),
        )
    }

    pub async fn handle(&self, event: Event) {
        let kind = event.kind();
        let result = match event {
            Event::OrderCreated(order_id) => self.on_order_created(order_id).await.map(|_| ()),
            Event::OrderStatusChanged {
                order_id,
                new_status,
                ..
            } => self
                .on_status_changed(order_id, new_status)
                .await
                .map(|_| ()),
            Event::PaymentApplied {
                order_id,
                payment_id,
                amount,
            } => {
                info!(order_id = %order_id, payment_id = %payment_id, amount = %amount, "Payment applied");
                Ok(())
            }
            Event::BroadcastPublished {
                title,
                message,
                recipients,
            } => self
                .on_broadcast(&title, &message, &recipients)
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            log_error(&e, ErrorKind::Internal, Some(kind));
        }
    }

    /// Sends a text message through the configured SMS/WhatsApp provider.
    pub async fn send_text(&self, phone: &str, body: &str) -> DeliveryOutcome {
        let Some(provider) = self.sms.as_ref() else {
            let outcome = DeliveryOutcome::NotConfigured {
                channel: "sms".to_string(),
            };
            crate::metrics::record_notification("sms", outcome.label());
            return outcome;
        };

        let outcome = match normalize_phone(phone, &self.default_country_code) {
            None => DeliveryOutcome::Failed {
                reason: format!("invalid phone number '{}'", phone),
            },
            Some(to) => match provider.send_text(&to, body).await {
                Ok(provider_id) => DeliveryOutcome::Sent { provider_id },
                Err(e) => {
                    log_error(&e, ErrorKind::External, Some(provider.channel()));
                    DeliveryOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
        };
        crate::metrics::record_notification(provider.channel(), outcome.label());
        outcome
    }

    /// Sends an email through the configured provider.
    pub async fn send_email(&self, to: &str, subject: &str, body: &str) -> DeliveryOutcome {
        let Some(provider) = self.email.as_ref() else {
            let outcome = DeliveryOutcome::NotConfigured {
                channel: "email".to_string(),
            };
            crate::metrics::record_notification("email", outcome.label());
            return outcome;
        };

        let outcome = match provider.send_email(to, subject, body).await {
            Ok(provider_id) => DeliveryOutcome::Sent { provider_id },
            Err(e) => {
                log_error(&e, ErrorKind::External, Some("email"));
                DeliveryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        crate::metrics::record_notification("email", outcome.label());
        outcome
    }

    async fn load_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", order_id)))
    }

    /// Login account of the order's customer, if any.
    async fn customer_user(&self, order: &order::Model) -> Result<Option<Uuid>, ServiceError> {
        let Some(customer_id) = order.customer_id else {
            return Ok(None);
        };
        Ok(customer::Entity::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .and_then(|c| c.user_id))
    }

    async fn notify_in_app(
        &self,
        order: &order::Model,
        notification_type: NotificationType,
        title: String,
        message: String,
    ) {
        let user_id = match self.customer_user(order).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => return,
            Err(e) => {
                log_error(&e, ErrorKind::Database, Some("in-app notification recipient"));
                return;
            }
        };
        let result = self
            .in_app
            .create(NewNotification {
                user_id,
                notification_type,
                title,
                message,
                order_id: Some(order.id),
                metadata: Some(serde_json::json!({ "barcode": order.barcode })),
            })
            .await;
        if let Err(e) = result {
            log_error(&e, ErrorKind::Database, Some("in-app notification"));
        }
    }

    /// Text with the tracking link; flags `sms_sent` on acknowledgment.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn on_order_created(&self, order_id: Uuid) -> Result<DeliveryOutcome, ServiceError> {
        let order = self.load_order(order_id).await?;
        let body = templates::order_created_text(&self.shop_name, &order);
        let outcome = self.send_text(&order.phone_number, &body).await;

        match &outcome {
            DeliveryOutcome::Sent { provider_id } => {
                info!(provider_id = %provider_id, "Order confirmation sent");
                order::Entity::update_many()
                    .col_expr(order::Column::SmsSent, Expr::value(true))
                    .col_expr(order::Column::SmsSentAt, Expr::value(Utc::now()))
                    .filter(order::Column::Id.eq(order_id))
                    .exec(&*self.db)
                    .await?;
            }
            other => warn!(outcome = ?other, "Order confirmation not delivered"),
        }

        self.notify_in_app(
            &order,
            NotificationType::OrderConfirmation,
            format!("Order {} received", order.barcode),
            body,
        )
        .await;

        Ok(outcome)
    }

    /// Ready statuses get email plus text; any other status gets a text.
    #[instrument(skip(self), fields(order_id = %order_id, status = %new_status))]
    pub async fn on_status_changed(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<Vec<DeliveryOutcome>, ServiceError> {
        let order = self.load_order(order_id).await?;
        let mut outcomes = Vec::new();

        if new_status.is_ready_for_pickup() {
            let items = order_item::Entity::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .order_by_asc(order_item::Column::Position)
                .all(&*self.db)
                .await?;

            if let Some(email) = order.email.as_deref().filter(|e| !e.trim().is_empty()) {
                let (subject, body) = templates::ready_email(&self.shop_name, &order, &items);
                outcomes.push(self.send_email(email, &subject, &body).await);
            }
            let text = templates::ready_text(&self.shop_name, &order);
            outcomes.push(self.send_text(&order.phone_number, &text).await);

            self.notify_in_app(
                &order,
                NotificationType::ReadyForPickup,
                format!("Order {} is ready", order.barcode),
                text,
            )
            .await;
        } else {
            let text = templates::status_update_text(&self.shop_name, &order, new_status);
            outcomes.push(self.send_text(&order.phone_number, &text).await);

            self.notify_in_app(
                &order,
                NotificationType::StatusUpdate,
                format!("Order {}: {}", order.barcode, new_status.label()),
                text,
            )
            .await;
        }

        for outcome in outcomes.iter().filter(|o| !o.is_sent()) {
            warn!(outcome = ?outcome, "Status notification not delivered");
        }
        Ok(outcomes)
    }

    /// Emails every recipient that still has unread notifications.
    ///
    /// Sends are issued concurrently; each failure is isolated.
    #[instrument(skip(self, message, recipients), fields(recipients = recipients.len()))]
    pub async fn on_broadcast(
        &self,
        title: &str,
        message: &str,
        recipients: &[Uuid],
    ) -> Result<Vec<DeliveryOutcome>, ServiceError> {
        if self.email.is_none() {
            info!("Email provider not configured; skipping broadcast emails");
            return Ok(Vec::new());
        }

        let with_unread: Vec<Uuid> = notification::Entity::find()
            .select_only()
            .column(notification::Column::UserId)
            .filter(notification::Column::UserId.is_in(recipients.to_vec()))
            .filter(notification::Column::IsRead.eq(false))
            .group_by(notification::Column::UserId)
            .into_tuple()
            .all(&*self.db)
            .await?;
        if with_unread.is_empty() {
            return Ok(Vec::new());
        }

        let targets: Vec<String> = user::Entity::find()
            .select_only()
            .column(user::Column::Email)
            .filter(user::Column::Id.is_in(with_unread))
            .into_tuple()
            .all(&*self.db)
            .await?;

        let (subject, body) = templates::broadcast_email(&self.shop_name, title, message);
        let sends = targets
            .iter()
            .map(|email| self.send_email(email, &subject, &body));
        let outcomes = join_all(sends).await;

        info!(
            sent = outcomes.iter().filter(|o| o.is_sent()).count(),
            attempted = outcomes.len(),
            "Broadcast emails dispatched"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("9876543210", "+91", Some("+919876543210"))]
    #[case("09876543210", "+91", Some("+919876543210"))]
    #[case("+44 20 7946 0958", "+91", Some("+442079460958"))]
    #[case("98765-43210", "91", Some("+919876543210"))]
    #[case("(555) 010-9999", "+1", Some("+15550109999"))]
    #[case("", "+91", None)]
    #[case("000", "+91", None)]
    fn phone_normalization(
        #[case] raw: &str,
        #[case] code: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(normalize_phone(raw, code).as_deref(), expected);
    }

    fn dispatcher_without_providers() -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::new(DatabaseConnection::Disconnected),
            None,
            None,
            "Stitch Co",
            "+91",
        )
    }

    #[tokio::test]
    async fn unconfigured_channels_report_not_configured() {
        let dispatcher = dispatcher_without_providers();
        assert_eq!(
            dispatcher.send_text("9876543210", "hi").await,
            DeliveryOutcome::NotConfigured {
                channel: "sms".into()
            }
        );
        assert_eq!(
            dispatcher.send_email("a@b.c", "s", "b").await,
            DeliveryOutcome::NotConfigured {
                channel: "email".into()
            }
        );
    }

    fn failing_sms() -> MockSmsProvider {
        let mut sms = MockSmsProvider::new();
        sms.expect_channel().return_const("sms");
        sms.expect_send_text().returning(|_, _| {
            Err(NotificationError::Provider {
                status: 503,
                body: "down".into(),
            })
        });
        sms
    }

    fn dispatcher_with(
        sms: MockSmsProvider,
        email: Option<MockEmailProvider>,
    ) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::new(DatabaseConnection::Disconnected),
            Some(Arc::new(sms)),
            email.map(|e| Arc::new(e) as Arc<dyn EmailProvider>),
            "Stitch Co",
            "+91",
        )
    }

    #[tokio::test]
    async fn provider_failure_becomes_failed_outcome() {
        let dispatcher = dispatcher_with(failing_sms(), None);
        let outcome = dispatcher.send_text("9876543210", "hi").await;
        assert_eq!(outcome.label(), "failed");
    }

    #[tokio::test]
    async fn texts_go_to_the_normalized_number() {
        let mut sms = MockSmsProvider::new();
        sms.expect_channel().return_const("whatsapp");
        sms.expect_send_text()
            .withf(|to, body| to == "+919876543210" && body == "hi")
            .times(1)
            .returning(|_, _| Ok("SM42".into()));

        let outcome = dispatcher_with(sms, None)
            .send_text("098765 43210", "hi")
            .await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Sent {
                provider_id: "SM42".into()
            }
        );
    }

    #[tokio::test]
    async fn invalid_phone_is_not_sent() {
        let mut sms = MockSmsProvider::new();
        sms.expect_channel().return_const("sms");
        sms.expect_send_text().never();

        let outcome = dispatcher_with(sms, None).send_text("n/a", "hi").await;
        assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn email_failure_is_isolated() {
        let mut email = MockEmailProvider::new();
        email
            .expect_send_email()
            .returning(|_, _, _| Err(NotificationError::InvalidRecipient("bounce".into())));

        let outcome = dispatcher_with(failing_sms(), Some(email))
            .send_email("x@example.com", "s", "b")
            .await;
        assert_eq!(outcome.label(), "failed");
    }
}
