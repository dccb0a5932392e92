use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Principal,
    entities::coin_transaction::{self, TransactionType},
    errors::ServiceError,
    handlers::common::{validate_input, PaginationParams},
    services::ledger::{CoinBalance, LedgerAudit, SpendReceipt},
    ApiResponse, AppState, PaginatedResponse,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CoinTransactionResponse {
    pub id: Uuid,
    pub sequence: i64,
    pub transaction_type: TransactionType,
    /// Signed: positive for credits, negative for spends
    pub amount: i64,
    pub reason: String,
    pub balance_before: i64,
    pub balance_after: i64,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<coin_transaction::Model> for CoinTransactionResponse {
    fn from(tx: coin_transaction::Model) -> Self {
        Self {
            id: tx.id,
            sequence: tx.sequence,
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            reason: tx.reason,
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            related_id: tx.related_id,
            created_at: tx.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SpendCoinsRequest {
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: i64,
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
    /// What the coins paid for
    pub related_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/v1/coins/balance",
    summary = "Coin balance",
    description = "Current wallet balance. The first call provisions the wallet and grants the signup bonus.",
    responses(
        (status = 200, description = "Balance", body = ApiResponse<CoinBalance>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "coins"
)]
pub async fn get_balance(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<ApiResponse<CoinBalance>>, ServiceError> {
    let balance = state.services.ledger.balance(principal.user_id).await?;
    Ok(Json(ApiResponse::success(balance)))
}

#[utoipa::path(
    get,
    path = "/api/v1/coins/transactions",
    summary = "Coin transactions",
    params(PaginationParams),
    responses(
        (status = 200, description = "Newest first", body = ApiResponse<PaginatedResponse<CoinTransactionResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    tag = "coins"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<CoinTransactionResponse>>>, ServiceError> {
    let (page, per_page) = params.normalized();
    let (transactions, total) = state
        .services
        .ledger
        .history(principal.user_id, page, per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        transactions
            .into_iter()
            .map(CoinTransactionResponse::from)
            .collect(),
        total,
        page,
        per_page,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/coins/spend",
    summary = "Spend coins",
    request_body = SpendCoinsRequest,
    responses(
        (status = 200, description = "Coins debited", body = ApiResponse<SpendReceipt>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient balance", body = crate::errors::ErrorResponse),
    ),
    tag = "coins"
)]
pub async fn spend_coins(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<SpendCoinsRequest>,
) -> Result<Json<ApiResponse<SpendReceipt>>, ServiceError> {
    validate_input(&request)?;
    let receipt = state
        .services
        .ledger
        .spend(
            principal.user_id,
            request.amount,
            &request.reason,
            request.related_id,
        )
        .await?;
    Ok(Json(ApiResponse::success(receipt)))
}

#[utoipa::path(
    get,
    path = "/api/v1/coins/{user_id}/verify",
    summary = "Audit a wallet",
    description = "Replays a user's ledger chain against the account totals.",
    params(("user_id" = Uuid, Path, description = "Wallet owner")),
    responses(
        (status = 200, description = "Chain is consistent", body = ApiResponse<LedgerAudit>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "No wallet for this user", body = crate::errors::ErrorResponse),
        (status = 500, description = "Ledger corruption detected", body = crate::errors::ErrorResponse),
    ),
    tag = "coins"
)]
pub async fn verify_ledger(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<LedgerAudit>>, ServiceError> {
    let audit = state.services.ledger.verify(user_id).await?;
    Ok(Json(ApiResponse::success(audit)))
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct RefundCoinsRequest {
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: i64,
    #[validate(length(min = 1, max = 255))]
    pub reason: String,
    /// Order or content the refund relates to
    pub related_id: Option<Uuid>,
}

#[utoipa::path(
    post,
    path = "/api/v1/coins/{user_id}/refund",
    summary = "Refund coins",
    description = "Credits coins back to a wallet as a REFUND entry.",
    params(("user_id" = Uuid, Path, description = "Wallet owner")),
    request_body = RefundCoinsRequest,
    responses(
        (status = 200, description = "Coins credited", body = ApiResponse<CoinTransactionResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    tag = "coins"
)]
pub async fn refund_coins(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<Uuid>,
    Json(request): Json<RefundCoinsRequest>,
) -> Result<Json<ApiResponse<CoinTransactionResponse>>, ServiceError> {
    validate_input(&request)?;
    tracing::info!(operator = %principal.user_id, %user_id, amount = request.amount, "manual coin refund");
    let transaction = state
        .services
        .ledger
        .refund(user_id, request.amount, &request.reason, request.related_id)
        .await?;
    Ok(Json(ApiResponse::success(CoinTransactionResponse::from(
        transaction,
    ))))
}
