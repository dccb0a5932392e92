use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Principal,
    errors::ServiceError,
    services::settlement::{PaymentOutcome, SettlementResult},
    ApiResponse, AppState,
};

/// Normalized settlement trigger, for operators and trusted internal callers.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettleOrderRequest {
    pub order_id: Uuid,
    pub outcome: PaymentOutcome,
    pub transaction_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/settlements",
    summary = "Settle order",
    description = "Applies a payment outcome to an order. Redelivery of the same outcome is a no-op.",
    request_body = SettleOrderRequest,
    responses(
        (status = 200, description = "Settlement result", body = ApiResponse<SettlementResult>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "settlements"
)]
pub async fn settle_order(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<SettleOrderRequest>,
) -> Result<Json<ApiResponse<SettlementResult>>, ServiceError> {
    tracing::info!(
        operator = %principal.user_id,
        order_id = %request.order_id,
        outcome = %request.outcome,
        "manual settlement"
    );
    let result = state
        .services
        .settlement
        .settle(request.order_id, request.outcome, request.transaction_id)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}
