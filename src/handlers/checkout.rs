use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::Principal,
    errors::ServiceError,
    gateways::{PaymentProvider, PaymentSession},
    handlers::orders::OrderResponse,
    services::{checkout::CheckoutRequest as CheckoutInput, orders::OrderLine, settlement::SettlementResult},
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CheckoutRequest {
    /// Lines to buy; the caller's cart is used when omitted
    pub items: Option<Vec<OrderLine>>,
    pub promo_code: Option<String>,
    #[serde(default)]
    pub is_free: bool,
    /// Required unless the order is free
    pub provider: Option<PaymentProvider>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    /// Where to send the buyer to pay; absent for free orders
    pub payment: Option<PaymentSession>,
    pub settlement: Option<SettlementResult>,
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Check out",
    description = "Build an order from explicit lines or the cart and open a payment session with the chosen provider.",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Empty cart, missing provider or provider not configured", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or promo code not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Promo code rejected", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider unavailable; the order was marked FAILED", body = crate::errors::ErrorResponse),
    ),
    tag = "checkout"
)]
pub async fn checkout(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    let outcome = state
        .services
        .checkout
        .checkout(CheckoutInput {
            user_id: principal.user_id,
            items: request.items,
            promo_code: request.promo_code,
            is_free: request.is_free,
            provider: request.provider,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CheckoutResponse {
            order: OrderResponse::from(&outcome.order),
            payment: outcome.session,
            settlement: outcome.settlement,
        })),
    ))
}
