use axum::{extract::State, response::Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::Principal,
    errors::ServiceError,
    handlers::common::validate_input,
    services::promotions::PromoRejection,
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ValidatePromoRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub cart_subtotal: Decimal,
}

/// Either a usable discount or the reason the code cannot be applied.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PromoValidationResponse {
    pub valid: bool,
    pub code: String,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<PromoRejection>,
}

#[utoipa::path(
    post,
    path = "/api/v1/promotions/validate",
    summary = "Validate promo code",
    description = "Price a promo code against a cart subtotal without redeeming it. Rejections are reported in the body.",
    request_body = ValidatePromoRequest,
    responses(
        (status = 200, description = "Validation result", body = ApiResponse<PromoValidationResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
    ),
    tag = "promotions"
)]
pub async fn validate_promo(
    State(state): State<AppState>,
    _principal: Principal,
    Json(request): Json<ValidatePromoRequest>,
) -> Result<Json<ApiResponse<PromoValidationResponse>>, ServiceError> {
    validate_input(&request)?;

    let response = match state
        .services
        .promotions
        .validate(&request.code, request.cart_subtotal)
        .await
    {
        Ok(validation) => PromoValidationResponse {
            valid: true,
            code: validation.code,
            discount_amount: validation.discount_amount,
            final_total: validation.final_total,
            rejection: None,
        },
        Err(ServiceError::PromoRejected(reason)) => PromoValidationResponse {
            valid: false,
            code: request.code.trim().to_uppercase(),
            discount_amount: Decimal::ZERO,
            final_total: request.cart_subtotal,
            rejection: Some(reason),
        },
        Err(e) => return Err(e),
    };

    Ok(Json(ApiResponse::success(response)))
}
