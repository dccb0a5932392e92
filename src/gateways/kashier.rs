use super::{parse_order_id, GatewayCallback, PaymentGateway, PaymentProvider, PaymentSession};
use crate::{
    config::KashierConfig,
    entities::order,
    errors::ServiceError,
    services::settlement::PaymentOutcome,
    webhooks::{hmac_sha256_hex, verify_hmac_hex},
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;

pub const SIGNATURE_HEADER: &str = "x-kashier-signature";

/// Kashier hosted payment page.
pub struct KashierGateway {
    config: KashierConfig,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: Option<String>,
    data: Map<String, Value>,
}

impl KashierGateway {
    pub fn new(config: KashierConfig) -> Self {
        Self { config }
    }

    /// Order hash Kashier expects on the payment page URL.
    pub fn order_hash(&self, order_id: &str, amount: &str, currency: &str) -> String {
        let path = format!(
            "/?payment={}.{}.{}.{}",
            self.config.merchant_id, order_id, amount, currency
        );
        hmac_sha256_hex(self.config.api_key.as_bytes(), path.as_bytes())
    }

    /// Query string Kashier signs: the listed keys, sorted, as `key=value` pairs.
    fn signed_query(data: &Map<String, Value>) -> Result<String, ServiceError> {
        let mut keys: Vec<&str> = data
            .get("signatureKeys")
            .and_then(Value::as_array)
            .ok_or_else(|| ServiceError::BadRequest("kashier payload lacks signatureKeys".into()))?
            .iter()
            .filter_map(Value::as_str)
            .collect();
        keys.sort_unstable();

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for key in keys {
            let value = match data.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            query.append_pair(key, &value);
        }
        Ok(query.finish())
    }
}

fn field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

#[async_trait]
impl PaymentGateway for KashierGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Kashier
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_session(&self, order: &order::Model) -> Result<PaymentSession, ServiceError> {
        let order_id = order.id.to_string();
        let amount = format!("{:.2}", order.total);
        let hash = self.order_hash(&order_id, &amount, &order.currency);

        let mut params = vec![
            ("merchantId", self.config.merchant_id.clone()),
            ("orderId", order_id.clone()),
            ("amount", amount),
            ("currency", order.currency.clone()),
            ("hash", hash),
            ("mode", self.config.mode.clone()),
            ("display", "en".to_string()),
        ];
        if let Some(redirect) = &self.config.redirect_url {
            params.push(("merchantRedirect", redirect.clone()));
        }
        if let Some(webhook) = &self.config.webhook_url {
            params.push(("serverWebhook", webhook.clone()));
        }

        let url = Url::parse_with_params(&self.config.checkout_url, &params)
            .map_err(|e| ServiceError::InternalError(format!("invalid kashier checkout url: {}", e)))?;
        debug!("kashier payment page prepared");

        Ok(PaymentSession {
            provider: PaymentProvider::Kashier,
            reference: order_id,
            redirect_url: Some(url.to_string()),
        })
    }

    fn parse_callback(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<GatewayCallback>, ServiceError> {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing kashier signature".to_string()))?;
        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid kashier payload: {}", e)))?;

        let query = Self::signed_query(&envelope.data)?;
        if !verify_hmac_hex(self.config.api_key.as_bytes(), query.as_bytes(), signature) {
            warn!("kashier signature verification failed");
            return Err(ServiceError::Unauthorized(
                "invalid kashier signature".to_string(),
            ));
        }

        if let Some(event) = envelope.event.as_deref() {
            if event != "pay" {
                debug!(event, "ignoring non-payment kashier event");
                return Ok(None);
            }
        }

        let status = field(&envelope.data, "status")
            .or_else(|| field(&envelope.data, "paymentStatus"))
            .unwrap_or_default();
        let outcome = match status.to_ascii_uppercase().as_str() {
            "SUCCESS" => PaymentOutcome::Success,
            "FAILURE" | "FAILED" => PaymentOutcome::Failed,
            "PENDING" => PaymentOutcome::Pending,
            "CANCELLED" | "CANCELED" => PaymentOutcome::Cancelled,
            other => {
                warn!(status = other, "ignoring kashier event with unknown status");
                return Ok(None);
            }
        };

        let order_id = field(&envelope.data, "merchantOrderId")
            .ok_or_else(|| ServiceError::BadRequest("kashier payload lacks merchantOrderId".into()))?;

        Ok(Some(GatewayCallback {
            order_id: parse_order_id(order_id)?,
            outcome,
            transaction_id: field(&envelope.data, "transactionId").map(str::to_string),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn gateway() -> KashierGateway {
        KashierGateway::new(KashierConfig {
            merchant_id: "MID-123".into(),
            api_key: "kashier-key".into(),
            mode: "test".into(),
            checkout_url: "https://checkout.kashier.io".into(),
            redirect_url: Some("https://shop.example.com/payment/return".into()),
            webhook_url: None,
        })
    }

    fn sign(body: &Value) -> HeaderMap {
        let data = body["data"].as_object().unwrap();
        let query = KashierGateway::signed_query(data).unwrap();
        let signature = hmac_sha256_hex(b"kashier-key", query.as_bytes());
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature).unwrap());
        headers
    }

    #[tokio::test]
    async fn session_url_carries_signed_hash() {
        let gateway = gateway();
        let order = order::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: order::OrderStatus::Pending,
            subtotal: dec!(500),
            discount: dec!(100),
            total: dec!(400),
            currency: "EGP".into(),
            is_free: false,
            promo_code_id: None,
            payment_provider: None,
            payment_reference: None,
            transaction_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let session = gateway.create_session(&order).await.unwrap();
        let url = Url::parse(session.redirect_url.as_deref().unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["amount"], "400.00");
        assert_eq!(
            params["hash"],
            gateway.order_hash(&order.id.to_string(), "400.00", "EGP")
        );
        assert_eq!(session.reference, order.id.to_string());
    }

    #[test]
    fn signed_success_callback_parses() {
        let order_id = Uuid::new_v4();
        let body = json!({
            "event": "pay",
            "data": {
                "merchantOrderId": order_id.to_string(),
                "status": "SUCCESS",
                "transactionId": "TX-9",
                "amount": 400,
                "currency": "EGP",
                "signatureKeys": ["merchantOrderId", "status", "amount", "currency", "transactionId"]
            }
        });
        let bytes = serde_json::to_vec(&body).unwrap();

        let callback = gateway()
            .parse_callback(&sign(&body), &bytes)
            .unwrap()
            .unwrap();
        assert_eq!(callback.order_id, order_id);
        assert_eq!(callback.outcome, PaymentOutcome::Success);
        assert_eq!(callback.transaction_id.as_deref(), Some("TX-9"));
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let body = json!({
            "event": "pay",
            "data": {
                "merchantOrderId": Uuid::new_v4().to_string(),
                "status": "SUCCESS",
                "amount": 400,
                "signatureKeys": ["merchantOrderId", "status", "amount"]
            }
        });
        let headers = sign(&body);
        let mut tampered = body.clone();
        tampered["data"]["amount"] = json!(1);
        let bytes = serde_json::to_vec(&tampered).unwrap();

        assert!(matches!(
            gateway().parse_callback(&headers, &bytes),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn refund_events_are_acknowledged_without_outcome() {
        let body = json!({
            "event": "refund",
            "data": {"merchantOrderId": Uuid::new_v4().to_string(), "signatureKeys": ["merchantOrderId"]}
        });
        let bytes = serde_json::to_vec(&body).unwrap();
        assert_eq!(gateway().parse_callback(&sign(&body), &bytes).unwrap(), None);
    }
}
