use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::customers::{
    CreateCustomerRequest, CustomerResponse, MeasurementSnapshot, UpdateMeasurementsRequest,
};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    post,
    path = "/api/v1/customers",
    summary = "Create customer",
    request_body = CreateCustomerRequest,
    responses(
        (status = 201, description = "Customer created", body = ApiResponse<CustomerResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerResponse>>), ServiceError> {
    let created = state
        .services
        .customers
        .create_customer(request, &auth_user.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers",
    summary = "List customers",
    params(("page" = Option<u64>, Query, description = "Page number (default: 1)"),
           ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
           ("search" = Option<String>, Query, description = "Name, phone or email fragment")),
    responses(
        (status = 200, description = "Customers", body = ApiResponse<PaginatedResponse<CustomerResponse>>),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<CustomerResponse>>>, ServiceError> {
    let (items, total) = state
        .services
        .customers
        .list_customers(query.search.as_deref(), query.page, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items,
        total,
        query.page,
        query.limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}",
    summary = "Get customer",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer", body = ApiResponse<CustomerResponse>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ServiceError> {
    let customer = state.services.customers.get_customer(id).await?;
    Ok(Json(ApiResponse::success(customer)))
}

#[utoipa::path(
    put,
    path = "/api/v1/customers/{id}/measurements",
    summary = "Update measurements",
    description = "Replaces the measurement profile and records a history snapshot",
    params(("id" = Uuid, Path, description = "Customer id")),
    request_body = UpdateMeasurementsRequest,
    responses(
        (status = 200, description = "Customer with new measurements", body = ApiResponse<CustomerResponse>),
        (status = 400, description = "Invalid measurements", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn update_measurements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateMeasurementsRequest>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ServiceError> {
    let updated = state
        .services
        .customers
        .update_measurements(id, request, &auth_user.actor())
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}/measurements",
    summary = "Measurement history",
    params(("id" = Uuid, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Snapshots, newest first", body = ApiResponse<Vec<MeasurementSnapshot>>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "customers"
)]
pub async fn measurement_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<MeasurementSnapshot>>>, ServiceError> {
    let history = state.services.customers.measurement_history(id).await?;
    Ok(Json(ApiResponse::success(history)))
}
