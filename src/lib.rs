//! Coin Commerce
//!
//! Order, payment settlement and coin ledger backend for a storefront that
//! sells goods, downloads and coin packages.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateways;
pub mod handlers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod webhooks;

use axum::{
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, Capability};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        Self {
            items,
            total,
            page,
            per_page,
            total_pages: handlers::common::total_pages(total, per_page),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`, each group gated on its capability.
pub fn api_v1_routes() -> Router<AppState> {
    let ordering = Router::new()
        .route("/checkout", post(handlers::checkout::checkout))
        .route("/orders", post(handlers::orders::create_order))
        .with_capability(Capability::PlaceOrder);

    // Ownership is checked per order; the route only needs an identity
    let order_reads = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .with_capability(Capability::ReadOwnOrders);

    let promotions = Router::new()
        .route(
            "/promotions/validate",
            post(handlers::promotions::validate_promo),
        )
        .with_capability(Capability::ValidatePromo);

    let wallet = Router::new()
        .route("/coins/balance", get(handlers::coins::get_balance))
        .route("/coins/transactions", get(handlers::coins::list_transactions))
        .with_capability(Capability::ReadOwnWallet);

    let spending = Router::new()
        .route("/coins/spend", post(handlers::coins::spend_coins))
        .route(
            "/content/generate",
            post(handlers::content::generate_content),
        )
        .with_capability(Capability::SpendCoins);

    let cart = Router::new()
        .route(
            "/cart",
            get(handlers::carts::get_cart).delete(handlers::carts::clear_cart),
        )
        .route("/cart/items", post(handlers::carts::add_item))
        .route(
            "/cart/items/:product_id",
            put(handlers::carts::update_item).delete(handlers::carts::remove_item),
        )
        .with_capability(Capability::ManageOwnCart);

    let operations = Router::new()
        .route("/settlements", post(handlers::settlements::settle_order))
        .route("/coins/:user_id/refund", post(handlers::coins::refund_coins))
        .with_capability(Capability::ManualSettlement);

    let audit = Router::new()
        .route("/coins/:user_id/verify", get(handlers::coins::verify_ledger))
        .with_capability(Capability::LedgerAudit);

    // Authenticated by provider signatures, not caller identity
    let webhooks = Router::new().route(
        "/webhooks/:provider",
        post(handlers::payment_webhooks::payment_webhook),
    );

    Router::new()
        .merge(ordering)
        .merge(order_reads)
        .merge(promotions)
        .merge(wallet)
        .merge(spending)
        .merge(cart)
        .merge(operations)
        .merge(audit)
        .merge(webhooks)
}

/// The full application: health, OpenAPI document and the v1 API behind the
/// identity layer.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/health", handlers::health::health_routes())
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::openapi_routes())
        .layer(axum::middleware::from_fn(auth::identity_from_headers))
        .with_state(state)
}
