//! TailorTrack
//!
//! Order lifecycle, payment reconciliation and customer notifications for
//! tailoring shops.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod barcode;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::Extension,
    http::HeaderValue,
    response::Json,
    routing::{delete, get, patch, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::{AuthRouterExt, AuthService};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires every service from one connection, one event channel and one
    /// outbound HTTP client.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<config::AppConfig>,
        event_sender: events::EventSender,
        http_client: reqwest::Client,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            auth::AuthConfig::from_app_config(&config),
            db.clone(),
        ));
        let services = handlers::AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
            http_client,
        );
        Self {
            db,
            config,
            event_sender,
            auth,
            services,
        }
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub search: Option<String>,
}

pub(crate) fn default_page() -> u64 {
    1
}
pub(crate) fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let limit = limit.max(1);
        Self {
            items,
            total,
            page: page.max(1),
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!meta.timestamp.is_empty());
    }

    #[tokio::test]
    async fn validation_errors_response_includes_metadata() {
        let response = crate::tracing::scope_request_id(
            crate::tracing::RequestId::new("meta-validation"),
            async { ApiResponse::<()>::validation_errors(vec!["missing".into()]) },
        )
        .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-validation"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn paginated_response_rounds_pages_up() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 41, 1, 20);
        assert_eq!(page.total_pages, 3);

        let empty = PaginatedResponse::<u8>::new(Vec::new(), 0, 0, 0);
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.limit, 1);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Shared client for gateway and notification providers.
pub fn build_http_client(cfg: &config::AppConfig) -> Result<reqwest::Client, errors::ServiceError> {
    reqwest::Client::builder()
        .timeout(cfg.outbound_timeout())
        .user_agent(concat!("tailortrack/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| errors::ServiceError::InternalError(format!("http client: {}", e)))
}

// Authenticated API, grouped by the permission each route needs
pub fn api_v1_routes() -> Router<AppState> {
    let orders_read = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/by-barcode/:barcode",
            get(handlers::orders::get_order_by_barcode),
        )
        .route("/orders/:id/history", get(handlers::orders::get_order_history))
        .route(
            "/orders/:id/barcode.png",
            get(handlers::orders::order_barcode_png),
        )
        .with_permission(perm::ORDERS_READ);

    let orders_create = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .with_permission(perm::ORDERS_CREATE);

    let orders_update = Router::new()
        .route("/orders/:id", put(handlers::orders::update_order))
        .route(
            "/orders/:id/status",
            patch(handlers::orders::update_order_status),
        )
        .with_permission(perm::ORDERS_UPDATE);

    let orders_own = Router::new()
        .route("/me/orders", get(handlers::orders::my_orders))
        .with_permission(perm::ORDERS_OWN);

    let payments_read = Router::new()
        .route(
            "/payments/order/:order_id",
            get(handlers::payments::list_order_payments),
        )
        .with_permission(perm::PAYMENTS_READ);

    let payments_create = Router::new()
        .route("/payments", post(handlers::payments::record_payment))
        .route(
            "/payments/gateway/order",
            post(handlers::payments::create_gateway_order),
        )
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .with_permission(perm::PAYMENTS_CREATE);

    // Payment webhook (does not require auth, but signature-verified)
    let payment_webhook = Router::new().route(
        "/payments/webhook",
        post(handlers::payment_webhooks::payment_webhook),
    );

    let customers_read = Router::new()
        .route("/customers", get(handlers::customers::list_customers))
        .route("/customers/:id", get(handlers::customers::get_customer))
        .route(
            "/customers/:id/measurements",
            get(handlers::customers::measurement_history),
        )
        .with_permission(perm::CUSTOMERS_READ);

    let customers_create = Router::new()
        .route("/customers", post(handlers::customers::create_customer))
        .with_permission(perm::CUSTOMERS_CREATE);

    let customers_update = Router::new()
        .route(
            "/customers/:id/measurements",
            put(handlers::customers::update_measurements),
        )
        .with_permission(perm::CUSTOMERS_UPDATE);

    let notifications_read = Router::new()
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/unread-count",
            get(handlers::notifications::unread_count),
        )
        .with_permission(perm::NOTIFICATIONS_READ);

    let notifications_update = Router::new()
        .route(
            "/notifications/:id/read",
            post(handlers::notifications::mark_read),
        )
        .route(
            "/notifications/:id/unread",
            post(handlers::notifications::mark_unread),
        )
        .route(
            "/notifications/:id",
            delete(handlers::notifications::delete_notification),
        )
        .with_permission(perm::NOTIFICATIONS_UPDATE);

    let admin = Router::new()
        .route("/admin/broadcast", post(handlers::admin::broadcast))
        .with_permission(perm::NOTIFICATIONS_BROADCAST);

    Router::new()
        .route("/status", get(api_status))
        .merge(orders_read)
        .merge(orders_create)
        .merge(orders_update)
        .merge(orders_own)
        .merge(payments_read)
        .merge(payments_create)
        .merge(payment_webhook)
        .merge(customers_read)
        .merge(customers_create)
        .merge(customers_update)
        .merge(notifications_read)
        .merge(notifications_update)
        .merge(admin)
}

/// Account endpoints; only `/me` needs a token.
pub fn auth_routes() -> Router<AppState> {
    let me = Router::new()
        .route("/me", get(handlers::auth::me))
        .with_auth();

    Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .merge(me)
}

/// Customer-facing tracking pages; no authentication.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/track/:barcode", get(handlers::tracking::track_order))
        .route(
            "/track/:barcode/barcode.png",
            get(handlers::tracking::tracking_barcode_png),
        )
}

/// CORS from configured origins, or permissive when the environment allows it.
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!("Using permissive CORS because explicit origins were not configured");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

/// The complete HTTP application.
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let auth = state.auth.clone();
    let db = state.db.clone();

    Router::new()
        .route("/", get(|| async { "tailortrack up" }))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .nest("/auth", auth_routes())
        .merge(public_routes())
        .merge(openapi::swagger_ui())
        .with_state(state)
        .nest("/health", health::health_routes(db))
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors)
        // Auth middleware looks the service up from request extensions
        .layer(Extension(auth))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "build_time": build_time,
        "service": "tailortrack",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}
