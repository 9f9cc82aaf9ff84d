pub mod admin;
pub mod auth;
pub mod customers;
pub mod notifications;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod tracking;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    customers::CustomerService, notifications::InAppNotificationService, orders::OrderService,
    payments::PaymentService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub customers: Arc<CustomerService>,
    pub notifications: Arc<InAppNotificationService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(
                db.clone(),
                event_sender.clone(),
                config.clone(),
            )),
            payments: Arc::new(PaymentService::from_config(
                &config,
                db.clone(),
                event_sender,
                http_client,
            )),
            customers: Arc::new(CustomerService::new(db.clone())),
            notifications: Arc::new(InAppNotificationService::new(db)),
        }
    }
}

/// `image/png` response for a rendered barcode.
pub(crate) fn png_response(bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        bytes,
    )
        .into_response()
}
