use axum::{extract::State, http::StatusCode, response::Json};

use crate::auth::{AuthUser, LoginRequest, RegisterRequest, TokenResponse, UserView};
use crate::errors::ServiceError;
use crate::{ApiResponse, AppState};

#[utoipa::path(
    post,
    path = "/auth/register",
    summary = "Customer self-registration",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<TokenResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TokenResponse>>), ServiceError> {
    let token = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(token))))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    summary = "Log in",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token", body = ApiResponse<TokenResponse>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<TokenResponse>>, ServiceError> {
    let token = state.auth.login(request).await?;
    Ok(Json(ApiResponse::success(token)))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    summary = "Current user",
    responses(
        (status = 200, description = "The authenticated account", body = ApiResponse<UserView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<UserView>>, ServiceError> {
    let account = state.auth.current_user(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(account)))
}
