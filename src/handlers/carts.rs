use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Principal, entities::cart_item, errors::ServiceError, handlers::common::validate_input,
    ApiResponse, AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<cart_item::Model> for CartItemResponse {
    fn from(item: cart_item::Model) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            updated_at: item.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    /// Zero removes the line
    #[validate(range(min = 0, max = 1000, message = "Quantity must be between 0 and 1000"))]
    pub quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Get my cart",
    responses((status = 200, description = "Cart contents", body = ApiResponse<CartResponse>)),
    tag = "cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    let items = state.services.cart.list_items(principal.user_id).await?;
    Ok(Json(ApiResponse::success(CartResponse {
        items: items.into_iter().map(CartItemResponse::from).collect(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    summary = "Add to cart",
    description = "Adds a product; adding one already in the cart increases its quantity.",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Updated line", body = ApiResponse<CartItemResponse>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<AddCartItemRequest>,
) -> Result<Json<ApiResponse<CartItemResponse>>, ServiceError> {
    validate_input(&request)?;
    let item = state
        .services
        .cart
        .add_item(principal.user_id, request.product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::success(CartItemResponse::from(item))))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{product_id}",
    summary = "Set cart quantity",
    params(("product_id" = Uuid, Path, description = "Product in the cart")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated line", body = ApiResponse<CartItemResponse>),
        (status = 204, description = "Line removed"),
        (status = 404, description = "Product is not in the cart", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(product_id): Path<Uuid>,
    Json(request): Json<UpdateCartItemRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&request)?;
    let updated = state
        .services
        .cart
        .update_quantity(principal.user_id, product_id, request.quantity)
        .await?;
    Ok(match updated {
        Some(item) => Json(ApiResponse::success(CartItemResponse::from(item))).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{product_id}",
    summary = "Remove from cart",
    params(("product_id" = Uuid, Path, description = "Product in the cart")),
    responses(
        (status = 204, description = "Line removed"),
        (status = 404, description = "Product is not in the cart", body = crate::errors::ErrorResponse),
    ),
    tag = "cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    principal: Principal,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    if state
        .services
        .cart
        .remove_item(principal.user_id, product_id)
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound(format!(
            "Product {} is not in the cart",
            product_id
        )))
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    summary = "Empty my cart",
    responses((status = 204, description = "Cart emptied")),
    tag = "cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<StatusCode, ServiceError> {
    state.services.cart.clear(principal.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
