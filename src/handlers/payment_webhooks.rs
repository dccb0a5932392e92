use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::settlement::{PaymentOutcome, SettlementDisposition},
    ApiResponse, AppState,
};

/// Acknowledgement returned to the provider. Any 2xx stops redelivery.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub provider: String,
    /// false when the event was authentic but carried no payment outcome
    pub processed: bool,
    pub order_id: Option<Uuid>,
    pub outcome: Option<PaymentOutcome>,
    pub status: Option<OrderStatus>,
    pub disposition: Option<SettlementDisposition>,
}

// POST /api/v1/webhooks/:provider
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/{provider}",
    summary = "Payment provider callback",
    description = "Verifies a provider callback at the adapter and settles the referenced order. Safe under redelivery.",
    params(("provider" = String, Path, description = "kashier, paypal or apple_pay")),
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown provider or order", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ServiceError> {
    let gateway = state.services.gateways.by_name(&provider)?;
    let provider = gateway.provider().to_string();

    let callback = match gateway.parse_callback(&headers, &body) {
        Ok(callback) => callback,
        Err(e) => {
            counter!("coin_commerce.webhooks.rejected", 1);
            warn!(%provider, error = %e, "payment webhook rejected");
            return Err(e);
        }
    };

    let Some(callback) = callback else {
        info!(%provider, "payment webhook carried no outcome");
        return Ok(Json(ApiResponse::success(WebhookAck {
            provider,
            processed: false,
            order_id: None,
            outcome: None,
            status: None,
            disposition: None,
        })));
    };

    info!(
        %provider,
        order_id = %callback.order_id,
        outcome = %callback.outcome,
        "payment webhook verified"
    );
    let result = state
        .services
        .settlement
        .settle(callback.order_id, callback.outcome, callback.transaction_id)
        .await?;
    counter!("coin_commerce.webhooks.processed", 1);

    Ok(Json(ApiResponse::success(WebhookAck {
        provider,
        processed: true,
        order_id: Some(result.order_id),
        outcome: Some(callback.outcome),
        status: Some(result.status),
        disposition: Some(result.disposition),
    })))
}
