use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::Principal, errors::ServiceError, handlers::common::validate_input,
    services::generation::GenerationReceipt, ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct GenerateContentRequest {
    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/content/generate",
    summary = "Generate content",
    description = "Generates text and pays for it with coins. Nothing is generated when the balance is short.",
    request_body = GenerateContentRequest,
    responses(
        (status = 200, description = "Generated content and new balance", body = ApiResponse<GenerationReceipt>),
        (status = 409, description = "Insufficient balance", body = crate::errors::ErrorResponse),
        (status = 502, description = "Generator failed; no coins were spent", body = crate::errors::ErrorResponse),
        (status = 503, description = "Generation not configured", body = crate::errors::ErrorResponse),
    ),
    tag = "content"
)]
pub async fn generate_content(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<GenerateContentRequest>,
) -> Result<Json<ApiResponse<GenerationReceipt>>, ServiceError> {
    validate_input(&request)?;
    let receipt = state
        .services
        .generation()?
        .generate(principal.user_id, &request.prompt)
        .await?;
    Ok(Json(ApiResponse::success(receipt)))
}
