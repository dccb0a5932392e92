#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, HeaderValue, Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use coin_commerce::{
    app_router,
    auth::{Role, USER_ID_HEADER, USER_ROLE_HEADER},
    config::AppConfig,
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::{
        order,
        product::{self, ProductKind},
        promo_code::{self, DiscountType},
    },
    errors::ServiceError,
    gateways::{
        ApplePayGateway, GatewayCallback, GatewayRegistry, PaymentGateway, PaymentProvider,
        PaymentSession,
    },
    handlers::AppServices,
    notifications::{DeliveryNotice, DeliveryNotifier, NotificationError},
    services::generation::{ContentGenerator, GeneratedText},
    webhooks::SignatureVerifier,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseTransaction, DbBackend, DbErr, ExecResult,
    QueryResult, Set, Statement,
};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const APPLE_PAY_SECRET: &str = "apple-pay-test-secret";
pub const GENERATION_COST: i64 = 30;

/// Collects delivery notices; can be switched to fail every send.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<DeliveryNotice>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<DeliveryNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeliveryNotifier for RecordingNotifier {
    async fn notify_delivery(&self, notice: DeliveryNotice) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("relay offline".into()));
        }
        self.notices.lock().unwrap().push(notice);
        Ok(())
    }
}

/// Generator with a fixed price that counts its invocations.
pub struct StaticGenerator {
    pub cost: i64,
    calls: AtomicUsize,
}

impl StaticGenerator {
    pub fn new(cost: i64) -> Self {
        Self {
            cost,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentGenerator for StaticGenerator {
    async fn quote(&self, _prompt: &str) -> Result<i64, ServiceError> {
        Ok(self.cost)
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedText, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedText {
            text: format!("Generated: {}", prompt),
            cost: self.cost,
        })
    }
}

/// Stands in for Kashier with a provider that cannot be reached.
pub struct UnreachableGateway;

#[async_trait]
impl PaymentGateway for UnreachableGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Kashier
    }

    async fn create_session(&self, _order: &order::Model) -> Result<PaymentSession, ServiceError> {
        Err(ServiceError::ExternalServiceError(
            "kashier is unreachable".into(),
        ))
    }

    fn parse_callback(
        &self,
        _headers: &HeaderMap,
        _body: &[u8],
    ) -> Result<Option<GatewayCallback>, ServiceError> {
        Err(ServiceError::Unauthorized("no callbacks expected".into()))
    }
}

/// Promo code row to seed, with permissive defaults.
#[derive(Debug, Clone)]
pub struct PromoSeed {
    pub code: &'static str,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_amount: Option<Decimal>,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl PromoSeed {
    pub fn percentage(code: &'static str, value: Decimal) -> Self {
        Self::new(code, DiscountType::Percentage, value)
    }

    pub fn fixed(code: &'static str, value: Decimal) -> Self {
        Self::new(code, DiscountType::Fixed, value)
    }

    fn new(code: &'static str, discount_type: DiscountType, discount_value: Decimal) -> Self {
        Self {
            code,
            discount_type,
            discount_value,
            minimum_amount: None,
            max_uses: None,
            used_count: 0,
            expires_at: None,
            is_active: true,
        }
    }
}

/// Test application with an in-memory database and the full router.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub state: AppState,
    pub router: Router,
    pub notifier: Arc<RecordingNotifier>,
    pub generator: Arc<StaticGenerator>,
}

impl TestApp {
    /// Wallets start empty.
    pub async fn new() -> Self {
        Self::with_signup_bonus(0).await
    }

    pub async fn with_signup_bonus(signup_bonus: i64) -> Self {
        let db = Arc::new(
            establish_connection_with_config(&DbConfig::sqlite_memory())
                .await
                .expect("connect sqlite"),
        );
        run_migrations(&db).await.expect("run migrations");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.coins.signup_bonus = signup_bonus;

        let notifier = Arc::new(RecordingNotifier::default());
        let generator = Arc::new(StaticGenerator::new(GENERATION_COST));
        let gateways = GatewayRegistry::new()
            .with(Arc::new(ApplePayGateway::new(
                "merchant.test",
                APPLE_PAY_SECRET,
                cfg.payment_webhook_tolerance_secs,
            )))
            .with(Arc::new(UnreachableGateway));

        let services = AppServices::new(
            db.clone(),
            &cfg,
            notifier.clone(),
            Some(generator.clone() as Arc<dyn ContentGenerator>),
            gateways,
            None,
        );
        let state = AppState {
            db: db.clone(),
            config: cfg,
            services,
        };
        let router = app_router(state.clone());

        Self {
            db,
            state,
            router,
            notifier,
            generator,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        kind: ProductKind,
        coin_amount: Option<i64>,
        download_url: Option<&str>,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            kind: Set(kind),
            coin_amount: Set(coin_amount),
            download_url: Set(download_url.map(str::to_string)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert product")
    }

    pub async fn seed_standard(&self, price: Decimal) -> product::Model {
        self.seed_product("Notebook", price, ProductKind::Standard, None, None)
            .await
    }

    pub async fn seed_coin_package(&self, price: Decimal, coins: i64) -> product::Model {
        self.seed_product(
            &format!("{} coins", coins),
            price,
            ProductKind::CoinPackage,
            Some(coins),
            None,
        )
        .await
    }

    pub async fn seed_digital(&self, price: Decimal) -> product::Model {
        self.seed_product(
            "Prompt pack",
            price,
            ProductKind::Digital,
            None,
            Some("https://cdn.example.com/prompt-pack.zip"),
        )
        .await
    }

    pub async fn seed_promo(&self, seed: PromoSeed) -> promo_code::Model {
        let now = Utc::now();
        promo_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(seed.code.to_string()),
            discount_type: Set(seed.discount_type),
            discount_value: Set(seed.discount_value),
            minimum_amount: Set(seed.minimum_amount),
            max_uses: Set(seed.max_uses),
            used_count: Set(seed.used_count),
            expires_at: Set(seed.expires_at),
            is_active: Set(seed.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert promo code")
    }

    /// Sends a JSON request as `caller`; anonymous when `None`.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        caller: Option<(Uuid, Role)>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = caller {
            builder = builder
                .header(USER_ID_HEADER, user_id.to_string())
                .header(USER_ROLE_HEADER, role.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("build request")).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Posts `body` to a provider webhook with a signature made from `secret`.
    pub async fn signed_webhook(&self, provider: &str, body: &str, secret: &str) -> Response {
        let timestamp = Utc::now().timestamp();
        let signature = SignatureVerifier::new(secret, 300).sign(timestamp, body.as_bytes());
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/v1/webhooks/{}", provider))
            .header("content-type", "application/json")
            .header("x-timestamp", HeaderValue::from(timestamp))
            .header("x-signature", signature)
            .body(Body::from(body.to_string()))
            .expect("build webhook request");
        self.send(request).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response is JSON")
}

pub fn apple_pay_event(order_id: Uuid, status: &str, transaction_id: &str) -> String {
    serde_json::json!({
        "order_id": order_id,
        "status": status,
        "transaction_id": transaction_id,
    })
    .to_string()
}

/// Transaction wrapper that runs competing writes right before the first
/// UPDATE of `table`, as if another request committed between our read and
/// our conditional write.
pub struct ContendedConnection<'a> {
    inner: &'a DatabaseTransaction,
    table: &'static str,
    competing: Mutex<Vec<Statement>>,
    interleaved: AtomicUsize,
}

impl<'a> ContendedConnection<'a> {
    pub fn new(inner: &'a DatabaseTransaction, table: &'static str, competing: Vec<Statement>) -> Self {
        Self {
            inner,
            table,
            competing: Mutex::new(competing),
            interleaved: AtomicUsize::new(0),
        }
    }

    /// Number of times the competing writes ran (0 or 1).
    pub fn interleaved(&self) -> usize {
        self.interleaved.load(Ordering::SeqCst)
    }

    async fn interleave(&self, stmt: &Statement) -> Result<(), DbErr> {
        if !stmt.sql.starts_with(&format!("UPDATE \"{}\"", self.table)) {
            return Ok(());
        }
        let competing = std::mem::take(&mut *self.competing.lock().unwrap());
        if competing.is_empty() {
            return Ok(());
        }
        self.interleaved.fetch_add(1, Ordering::SeqCst);
        for write in competing {
            self.inner.execute(write).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionTrait for ContendedConnection<'_> {
    fn get_database_backend(&self) -> DbBackend {
        self.inner.get_database_backend()
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        self.interleave(&stmt).await?;
        self.inner.execute(stmt).await
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        self.inner.execute_unprepared(sql).await
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        self.interleave(&stmt).await?;
        self.inner.query_one(stmt).await
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        self.inner.query_all(stmt).await
    }

    fn support_returning(&self) -> bool {
        self.inner.support_returning()
    }
}
