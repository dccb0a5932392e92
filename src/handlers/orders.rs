use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{authorize_owner, Capability, Principal},
    entities::{
        order::{self, OrderStatus},
        order_item,
        product::ProductKind,
    },
    errors::ServiceError,
    handlers::common::{validate_input, PaginationParams},
    services::{
        orders::{CreateOrderInput, OrderLine, OrderWithItems},
        settlement::SettlementResult,
    },
    ApiResponse, AppState, PaginatedResponse,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub kind: ProductKind,
    pub quantity: i32,
    /// Unit price at the time the order was built
    pub price: Decimal,
    pub coins_per_unit: i64,
}

impl From<&order_item::Model> for OrderItemResponse {
    fn from(item: &order_item::Model) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            kind: item.kind,
            quantity: item.quantity,
            price: item.price,
            coins_per_unit: item.coins_per_unit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub is_free: bool,
    pub promo_code_id: Option<Uuid>,
    pub payment_provider: Option<String>,
    pub payment_reference: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&order::Model> for OrderSummary {
    fn from(order: &order::Model) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            subtotal: order.subtotal,
            discount: order.discount,
            total: order.total,
            currency: order.currency.clone(),
            is_free: order.is_free,
            promo_code_id: order.promo_code_id,
            payment_provider: order.payment_provider.clone(),
            payment_reference: order.payment_reference.clone(),
            transaction_id: order.transaction_id.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: OrderSummary,
    pub items: Vec<OrderItemResponse>,
}

impl From<&OrderWithItems> for OrderResponse {
    fn from(order: &OrderWithItems) -> Self {
        Self {
            order: OrderSummary::from(&order.order),
            items: order.items.iter().map(OrderItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderLine>,
    pub promo_code: Option<String>,
    /// Set when the client expects the order to cost nothing
    #[serde(default)]
    pub is_free: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order: OrderResponse,
    /// Present when the order was free and settled immediately
    pub settlement: Option<SettlementResult>,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    description = "Build an order from explicit lines. Orders totalling zero settle immediately.",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CreateOrderResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or promo code not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Promo code expired, exhausted or below minimum", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateOrderResponse>>), ServiceError> {
    validate_input(&request)?;

    let created = state
        .services
        .orders
        .create_order(CreateOrderInput {
            user_id: principal.user_id,
            items: request.items,
            promo_code: request.promo_code,
            is_free: request.is_free,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CreateOrderResponse {
            order: OrderResponse::from(&created.order),
            settlement: created.settlement,
        })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Order belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    authorize_owner(
        &principal,
        order.order.user_id,
        Capability::ReadOwnOrders,
        Capability::ReadAnyOrder,
    )?;
    Ok(Json(ApiResponse::success(OrderResponse::from(&order))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List my orders",
    params(PaginationParams),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<OrderSummary>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderSummary>>>, ServiceError> {
    let (page, per_page) = params.normalized();
    let (orders, total) = state
        .services
        .orders
        .list_orders_for_user(principal.user_id, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        orders.iter().map(OrderSummary::from).collect(),
        total,
        page,
        per_page,
    ))))
}
