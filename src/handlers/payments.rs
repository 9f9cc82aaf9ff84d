use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::payments::{
    CreateGatewayOrderRequest, GatewayOrderResponse, PaymentResponse, PaymentView,
    RecordPaymentRequest, VerifyPaymentRequest,
};
use crate::{ApiResponse, AppState};

/// Record a counter payment (cash, card, UPI)
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    summary = "Record payment",
    description = "Adds the amount to the order's advance. Overpayment is accepted.",
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment applied", body = ApiResponse<PaymentResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ServiceError> {
    let applied = state
        .services
        .payments
        .record_manual(request, &auth_user.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(applied))))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/order/{order_id}",
    summary = "Payments for an order",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payments, oldest first", body = ApiResponse<Vec<PaymentView>>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn list_order_payments(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<PaymentView>>>, ServiceError> {
    let payments = state.services.payments.list_for_order(order_id).await?;
    Ok(Json(ApiResponse::success(payments)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/gateway/order",
    summary = "Open a gateway checkout",
    request_body = CreateGatewayOrderRequest,
    responses(
        (status = 200, description = "Gateway order created", body = ApiResponse<GatewayOrderResponse>),
        (status = 502, description = "Gateway error", body = crate::errors::ErrorResponse),
        (status = 503, description = "Gateway not configured", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn create_gateway_order(
    State(state): State<AppState>,
    Json(request): Json<CreateGatewayOrderRequest>,
) -> Result<Json<ApiResponse<GatewayOrderResponse>>, ServiceError> {
    let created = state.services.payments.create_gateway_order(request).await?;
    Ok(Json(ApiResponse::success(created)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    summary = "Verify a gateway checkout",
    description = "Checks the checkout signature and applies the amount recorded when the checkout was opened. A repeated gateway payment id returns the existing payment.",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified and applied", body = ApiResponse<PaymentResponse>),
        (status = 400, description = "Signature mismatch or checkout does not match the order", body = crate::errors::ErrorResponse),
        (status = 503, description = "Gateway not configured", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let applied = state
        .services
        .payments
        .verify_gateway_payment(request, &auth_user.actor())
        .await?;
    Ok(Json(ApiResponse::success(applied)))
}
