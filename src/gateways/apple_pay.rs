use super::{parse_order_id, GatewayCallback, PaymentGateway, PaymentProvider, PaymentSession};
use crate::{
    entities::order, errors::ServiceError, services::settlement::PaymentOutcome,
    webhooks::SignatureVerifier,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use tracing::{info, warn};

/// Apple Pay via the merchant's card processor. The payment sheet runs
/// client-side, so there is no redirect; the processor reports the result.
pub struct ApplePayGateway {
    merchant_id: String,
    verifier: SignatureVerifier,
}

#[derive(Debug, Deserialize)]
struct ProcessorEvent {
    order_id: String,
    status: String,
    transaction_id: Option<String>,
}

impl ApplePayGateway {
    pub fn new(merchant_id: impl Into<String>, webhook_secret: &str, tolerance_secs: u64) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            verifier: SignatureVerifier::new(webhook_secret, tolerance_secs),
        }
    }
}

#[async_trait]
impl PaymentGateway for ApplePayGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::ApplePay
    }

    async fn create_session(&self, order: &order::Model) -> Result<PaymentSession, ServiceError> {
        info!(order_id = %order.id, merchant_id = %self.merchant_id, "apple pay session prepared");
        Ok(PaymentSession {
            provider: PaymentProvider::ApplePay,
            reference: format!("{}:{}", self.merchant_id, order.id),
            redirect_url: None,
        })
    }

    fn parse_callback(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<GatewayCallback>, ServiceError> {
        self.verifier.verify(headers, body)?;

        let event: ProcessorEvent = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid apple pay payload: {}", e)))?;
        let outcome = match event.status.to_ascii_lowercase().as_str() {
            "approved" => PaymentOutcome::Success,
            "declined" => PaymentOutcome::Failed,
            "pending" => PaymentOutcome::Pending,
            "cancelled" | "canceled" => PaymentOutcome::Cancelled,
            other => {
                warn!(status = other, "ignoring apple pay event with unknown status");
                return Ok(None);
            }
        };

        Ok(Some(GatewayCallback {
            order_id: parse_order_id(&event.order_id)?,
            outcome,
            transaction_id: event.transaction_id,
        }))
    }
}
