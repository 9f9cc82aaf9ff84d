use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::events::Event;
use crate::services::notifications::BroadcastRequest;
use crate::{ApiResponse, AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BroadcastResponse {
    pub recipients: usize,
}

/// Admin broadcast to every customer account
#[utoipa::path(
    post,
    path = "/api/v1/admin/broadcast",
    summary = "Broadcast a message",
    description = "Creates an in-app notification for every active customer account. Email fan-out runs in the background.",
    request_body = BroadcastRequest,
    responses(
        (status = 202, description = "Broadcast accepted", body = ApiResponse<BroadcastResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admins only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn broadcast(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<BroadcastRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BroadcastResponse>>), ServiceError> {
    let recipients = state.services.notifications.broadcast(&request).await?;
    info!(admin = %auth_user.user_id, recipients = recipients.len(), "Broadcast published");

    let count = recipients.len();
    if count > 0 {
        state
            .event_sender
            .send_or_log(Event::BroadcastPublished {
                title: request.title,
                message: request.message,
                recipients,
            })
            .await;
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(BroadcastResponse { recipients: count })),
    ))
}
