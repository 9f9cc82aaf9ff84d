//! Public order tracking. No authentication; responses never carry contact
//! details or staff identities.

use axum::{
    extract::{Path, State},
    response::{Json, Response},
};

use super::png_response;
use crate::barcode::{self, RenderOptions};
use crate::errors::ServiceError;
use crate::services::orders::TrackingView;
use crate::{ApiResponse, AppState};

#[utoipa::path(
    get,
    path = "/track/{barcode}",
    summary = "Track an order",
    description = "Customer-facing order status. The barcode is matched in any casing.",
    params(("barcode" = String, Path, description = "Order barcode")),
    responses(
        (status = 200, description = "Tracking view", body = ApiResponse<TrackingView>),
        (status = 404, description = "Unknown barcode", body = crate::errors::ErrorResponse),
    ),
    tag = "tracking"
)]
pub async fn track_order(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> Result<Json<ApiResponse<TrackingView>>, ServiceError> {
    let view = state.services.orders.track(&barcode).await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    get,
    path = "/track/{barcode}/barcode.png",
    summary = "Tracking barcode image",
    params(("barcode" = String, Path, description = "Order barcode")),
    responses(
        (status = 200, description = "Code 128 PNG", content_type = "image/png"),
        (status = 404, description = "Unknown barcode", body = crate::errors::ErrorResponse),
    ),
    tag = "tracking"
)]
pub async fn tracking_barcode_png(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.find_by_barcode(&barcode).await?;
    let png = barcode::render_png(&order.barcode, RenderOptions::default())?;
    Ok(png_response(png))
}
