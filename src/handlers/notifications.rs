use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::notifications::NotificationResponse;
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCount {
    pub unread: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    summary = "My notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Notifications, newest first", body = ApiResponse<PaginatedResponse<NotificationResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<NotificationResponse>>>, ServiceError> {
    let (rows, total) = state
        .services
        .notifications
        .list_for_user(auth_user.user_id, query.unread_only, query.page, query.limit)
        .await?;
    let items = rows.into_iter().map(NotificationResponse::from).collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        query.page,
        query.limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    summary = "Unread notification count",
    responses((status = 200, description = "Unread count", body = ApiResponse<UnreadCount>)),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn unread_count(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<UnreadCount>>, ServiceError> {
    let unread = state
        .services
        .notifications
        .unread_count(auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(UnreadCount { unread })))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/read",
    summary = "Mark notification read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Updated notification", body = ApiResponse<NotificationResponse>),
        (status = 404, description = "Not found or not yours", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<NotificationResponse>>, ServiceError> {
    let updated = state
        .services
        .notifications
        .set_read(auth_user.user_id, id, true)
        .await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/{id}/unread",
    summary = "Mark notification unread",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Updated notification", body = ApiResponse<NotificationResponse>),
        (status = 404, description = "Not found or not yours", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn mark_unread(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<NotificationResponse>>, ServiceError> {
    let updated = state
        .services
        .notifications
        .set_read(auth_user.user_id, id, false)
        .await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/notifications/{id}",
    summary = "Delete notification",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found or not yours", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "notifications"
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .notifications
        .delete(auth_user.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
