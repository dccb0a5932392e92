use super::{parse_order_id, GatewayCallback, PaymentGateway, PaymentProvider, PaymentSession};
use crate::{
    config::PayPalConfig, entities::order, errors::ServiceError,
    services::settlement::PaymentOutcome, webhooks::SignatureVerifier,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// PayPal Orders v2 checkout.
pub struct PayPalGateway {
    client: reqwest::Client,
    config: PayPalConfig,
    verifier: SignatureVerifier,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event_type: String,
    #[serde(default)]
    resource: Value,
}

impl PayPalGateway {
    pub fn new(config: PayPalConfig, tolerance_secs: u64) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        let verifier = SignatureVerifier::new(config.webhook_secret.clone(), tolerance_secs);
        Ok(Self {
            client,
            config,
            verifier,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let response = self
            .client
            .post(self.endpoint("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(unreachable_gateway)?;

        if !response.status().is_success() {
            error!(status = %response.status(), "paypal token request rejected");
            return Err(ServiceError::ExternalServiceError(format!(
                "paypal authentication failed with status {}",
                response.status()
            )));
        }
        let token: AccessToken = response.json().await.map_err(unreachable_gateway)?;
        Ok(token.access_token)
    }
}

fn unreachable_gateway(e: reqwest::Error) -> ServiceError {
    ServiceError::ExternalServiceError(format!("paypal request failed: {}", e))
}

/// Our order id travels as `custom_id` on the purchase unit.
fn custom_id(resource: &Value) -> Option<&str> {
    resource
        .get("custom_id")
        .and_then(Value::as_str)
        .or_else(|| resource.pointer("/purchase_units/0/custom_id").and_then(Value::as_str))
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paypal
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_session(&self, order: &order::Model) -> Result<PaymentSession, ServiceError> {
        let token = self.access_token().await?;
        let payload = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": order.id.to_string(),
                "custom_id": order.id.to_string(),
                "amount": {
                    "currency_code": order.currency,
                    "value": format!("{:.2}", order.total),
                }
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.cancel_url,
                "user_action": "PAY_NOW",
            }
        });

        let response = self
            .client
            .post(self.endpoint("/v2/checkout/orders"))
            .bearer_auth(token)
            .header("PayPal-Request-Id", order.id.to_string())
            .json(&payload)
            .send()
            .await
            .map_err(unreachable_gateway)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(%status, detail = %detail, "paypal order creation rejected");
            return Err(ServiceError::ExternalServiceError(format!(
                "paypal order creation failed with status {}",
                status
            )));
        }

        let created: CreatedOrder = response.json().await.map_err(unreachable_gateway)?;
        let approve = created
            .links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone());
        if approve.is_none() {
            warn!(paypal_order = %created.id, "paypal order has no approval link");
        }
        debug!(paypal_order = %created.id, "paypal order created");

        Ok(PaymentSession {
            provider: PaymentProvider::Paypal,
            reference: created.id,
            redirect_url: approve,
        })
    }

    fn parse_callback(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<GatewayCallback>, ServiceError> {
        self.verifier.verify(headers, body)?;

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid paypal payload: {}", e)))?;
        let outcome = match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => PaymentOutcome::Success,
            "PAYMENT.CAPTURE.DENIED" => PaymentOutcome::Failed,
            "PAYMENT.CAPTURE.PENDING" => PaymentOutcome::Pending,
            "CHECKOUT.ORDER.VOIDED" => PaymentOutcome::Cancelled,
            other => {
                debug!(event_type = other, "ignoring paypal event");
                return Ok(None);
            }
        };

        let order_id = custom_id(&event.resource).ok_or_else(|| {
            ServiceError::BadRequest(format!("paypal {} event lacks custom_id", event.event_type))
        })?;

        Ok(Some(GatewayCallback {
            order_id: parse_order_id(order_id)?,
            outcome,
            transaction_id: event
                .resource
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string),
        }))
    }
}
