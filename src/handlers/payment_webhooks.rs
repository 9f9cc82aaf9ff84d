use axum::{extract::State, http::HeaderMap, response::Json};
use bytes::Bytes;

use crate::errors::ServiceError;
use crate::services::payments::{WebhookOutcome, SIGNATURE_HEADER};
use crate::{ApiResponse, AppState};

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    params(("x-gateway-signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body")),
    responses(
        (status = 200, description = "Webhook accepted", body = ApiResponse<WebhookOutcome>),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookOutcome>>, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state
        .services
        .payments
        .handle_webhook(&body, signature)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}
