use assert_matches::assert_matches;
use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;
use coin_commerce::{
    config::PayPalConfig,
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    gateways::{PayPalGateway, PaymentGateway, PaymentProvider},
    services::settlement::PaymentOutcome,
    webhooks::SignatureVerifier,
};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WEBHOOK_SECRET: &str = "paypal-relay-secret";

fn paypal(base_url: String) -> PayPalGateway {
    PayPalGateway::new(
        PayPalConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            base_url,
            return_url: "https://shop.example.com/paypal/return".into(),
            cancel_url: "https://shop.example.com/paypal/cancel".into(),
            webhook_secret: WEBHOOK_SECRET.into(),
        },
        300,
    )
    .unwrap()
}

fn pending_order(total: rust_decimal::Decimal) -> order::Model {
    order::Model {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        status: OrderStatus::Pending,
        subtotal: total,
        discount: dec!(0),
        total,
        currency: "EGP".into(),
        is_free: false,
        promo_code_id: None,
        payment_provider: None,
        payment_reference: None,
        transaction_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn signed(body: &[u8]) -> HeaderMap {
    let timestamp = Utc::now().timestamp();
    let signature = SignatureVerifier::new(WEBHOOK_SECRET, 300).sign(timestamp, body);
    let mut headers = HeaderMap::new();
    headers.insert("x-timestamp", HeaderValue::from(timestamp));
    headers.insert("x-signature", HeaderValue::from_str(&signature).unwrap());
    headers
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A21AA-test",
            "token_type": "Bearer",
            "expires_in": 32400
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn paypal_session_returns_approval_link() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    let order = pending_order(dec!(400));

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .and(header("authorization", "Bearer A21AA-test"))
        .and(header("paypal-request-id", order.id.to_string().as_str()))
        .and(body_partial_json(json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "custom_id": order.id.to_string(),
                "amount": { "currency_code": "EGP", "value": "400.00" }
            }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "5O190127TN364715T",
            "status": "CREATED",
            "links": [
                { "href": "https://api.sandbox.paypal.com/v2/checkout/orders/5O190127TN364715T", "rel": "self" },
                { "href": "https://www.sandbox.paypal.com/checkoutnow?token=5O190127TN364715T", "rel": "approve" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = paypal(server.uri()).create_session(&order).await.unwrap();
    assert_eq!(session.provider, PaymentProvider::Paypal);
    assert_eq!(session.reference, "5O190127TN364715T");
    assert_eq!(
        session.redirect_url.as_deref(),
        Some("https://www.sandbox.paypal.com/checkoutnow?token=5O190127TN364715T")
    );
}

#[tokio::test]
async fn paypal_rejection_surfaces_as_gateway_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "UNPROCESSABLE_ENTITY"
        })))
        .mount(&server)
        .await;

    let err = paypal(server.uri())
        .create_session(&pending_order(dec!(10)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));
}

#[tokio::test]
async fn paypal_bad_credentials_fail_before_order_creation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = paypal(server.uri())
        .create_session(&pending_order(dec!(10)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));
}

#[test]
fn paypal_capture_webhook_is_normalized() {
    let gateway = paypal("http://localhost".into());
    let order_id = Uuid::new_v4();
    let body = json!({
        "id": "WH-1",
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": { "id": "CAPTURE-7", "custom_id": order_id.to_string() }
    })
    .to_string();

    let callback = gateway
        .parse_callback(&signed(body.as_bytes()), body.as_bytes())
        .unwrap()
        .unwrap();
    assert_eq!(callback.order_id, order_id);
    assert_eq!(callback.outcome, PaymentOutcome::Success);
    assert_eq!(callback.transaction_id.as_deref(), Some("CAPTURE-7"));
}

#[test]
fn paypal_denied_capture_reads_nested_custom_id() {
    let gateway = paypal("http://localhost".into());
    let order_id = Uuid::new_v4();
    let body = json!({
        "event_type": "PAYMENT.CAPTURE.DENIED",
        "resource": { "purchase_units": [{ "custom_id": order_id.to_string() }] }
    })
    .to_string();

    let callback = gateway
        .parse_callback(&signed(body.as_bytes()), body.as_bytes())
        .unwrap()
        .unwrap();
    assert_eq!(callback.outcome, PaymentOutcome::Failed);
    assert_eq!(callback.order_id, order_id);
}

#[test]
fn paypal_unrelated_event_is_acknowledged_without_outcome() {
    let gateway = paypal("http://localhost".into());
    let body = json!({ "event_type": "CUSTOMER.DISPUTE.CREATED", "resource": {} }).to_string();
    let parsed = gateway
        .parse_callback(&signed(body.as_bytes()), body.as_bytes())
        .unwrap();
    assert!(parsed.is_none());
}

#[test]
fn paypal_tampered_body_is_rejected() {
    let gateway = paypal("http://localhost".into());
    let body = json!({ "event_type": "PAYMENT.CAPTURE.COMPLETED", "resource": {} }).to_string();
    let headers = signed(body.as_bytes());
    let tampered = body.replace("COMPLETED", "DENIED");
    assert_matches!(
        gateway.parse_callback(&headers, tampered.as_bytes()),
        Err(ServiceError::Unauthorized(_))
    );
}
