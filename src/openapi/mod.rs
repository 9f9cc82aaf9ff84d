use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TailorTrack API",
        version = "0.1.0",
        description = r#"
# TailorTrack

Order intake, status tracking, payment reconciliation and customer
notifications for tailoring shops.

## Authentication

Staff and customer endpoints take a JWT issued by `/auth/login` or
`/auth/register`:

```
Authorization: Bearer <your-jwt-token>
```

Tracking pages under `/track` and the gateway webhook are public. The
webhook is verified with an HMAC-SHA256 signature instead.

## Money

Amounts are decimal strings in the shop currency with two fractional
digits. Balances may go negative when a customer overpays.

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Order intake and lifecycle"),
        (name = "tracking", description = "Public order tracking"),
        (name = "payments", description = "Payment reconciliation"),
        (name = "customers", description = "Customer profiles and measurements"),
        (name = "notifications", description = "In-app notifications"),
        (name = "admin", description = "Administrative endpoints"),
        (name = "auth", description = "Accounts and tokens")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_barcode,
        crate::handlers::orders::update_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::get_order_history,
        crate::handlers::orders::order_barcode_png,
        crate::handlers::orders::my_orders,

        // Tracking
        crate::handlers::tracking::track_order,
        crate::handlers::tracking::tracking_barcode_png,

        // Payments
        crate::handlers::payments::record_payment,
        crate::handlers::payments::list_order_payments,
        crate::handlers::payments::create_gateway_order,
        crate::handlers::payments::verify_payment,
        crate::handlers::payment_webhooks::payment_webhook,

        // Customers
        crate::handlers::customers::create_customer,
        crate::handlers::customers::list_customers,
        crate::handlers::customers::get_customer,
        crate::handlers::customers::update_measurements,
        crate::handlers::customers::measurement_history,

        // Notifications
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::unread_count,
        crate::handlers::notifications::mark_read,
        crate::handlers::notifications::mark_unread,
        crate::handlers::notifications::delete_notification,
        crate::handlers::admin::broadcast,

        // Auth
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::me,
    ),
    components(
        schemas(
            crate::ListQuery,

            // Enumerations
            crate::entities::OrderStatus,
            crate::entities::PaymentStatus,
            crate::entities::GarmentType,
            crate::entities::PaymentMethod,
            crate::entities::PaymentRecordStatus,
            crate::entities::NotificationType,
            crate::entities::UserRole,

            // Orders
            crate::services::orders::OrderItemInput,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::UpdateOrderRequest,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::StatusHistoryEntry,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderSummary,
            crate::services::orders::TrackingItem,
            crate::services::orders::TrackingStatus,
            crate::services::orders::TrackingView,

            // Payments
            crate::services::payments::RecordPaymentRequest,
            crate::services::payments::CreateGatewayOrderRequest,
            crate::services::payments::GatewayOrderResponse,
            crate::services::payments::VerifyPaymentRequest,
            crate::services::payments::PaymentView,
            crate::services::payments::OrderSettlement,
            crate::services::payments::PaymentResponse,
            crate::services::payments::WebhookOutcome,

            // Customers
            crate::services::customers::CreateCustomerRequest,
            crate::services::customers::UpdateMeasurementsRequest,
            crate::services::customers::CustomerResponse,
            crate::services::customers::MeasurementSnapshot,

            // Notifications
            crate::services::notifications::NotificationResponse,
            crate::services::notifications::BroadcastRequest,
            crate::handlers::notifications::UnreadCount,
            crate::handlers::admin::BroadcastResponse,

            // Auth
            crate::auth::RegisterRequest,
            crate::auth::LoginRequest,
            crate::auth::UserView,
            crate::auth::TokenResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_surface() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).expect("openapi serializes");
        assert!(json.contains("TailorTrack API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/track/{barcode}"));
        assert!(json.contains("/api/v1/payments/webhook"));
        assert!(json.contains("/auth/login"));
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDocV1::openapi();
        let components = doc.components.expect("components present");
        assert!(components.security_schemes.contains_key("Bearer"));
    }
}
