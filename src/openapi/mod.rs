use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Coin Commerce API",
        version = "1.0.0",
        description = r#"
# Coin Commerce API

Orders, payment settlement and the coin wallet behind a storefront that sells
goods, downloads and coin packages, and bills AI-generated content in coins.

## Authentication

Requests reach the service through an authenticating proxy which sets
`x-user-id` (UUID) and `x-user-role` (USER, MANAGER or ADMIN). Provider
webhooks are authenticated by their signatures instead.

## Error Handling

Failing requests return an `ErrorResponse` with a machine-readable `code`,
for example `insufficient_balance` or `promo_expired`.

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "checkout", description = "Cart to order to payment session"),
        (name = "orders", description = "Order creation and lookup"),
        (name = "promotions", description = "Promo code pricing"),
        (name = "coins", description = "Coin wallet and ledger"),
        (name = "content", description = "Coin-billed content generation"),
        (name = "cart", description = "Shopping cart"),
        (name = "settlements", description = "Operator settlement"),
        (name = "payments", description = "Payment provider callbacks")
    ),
    paths(
        crate::handlers::checkout::checkout,
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::list_orders,
        crate::handlers::promotions::validate_promo,
        crate::handlers::coins::get_balance,
        crate::handlers::coins::list_transactions,
        crate::handlers::coins::spend_coins,
        crate::handlers::coins::verify_ledger,
        crate::handlers::coins::refund_coins,
        crate::handlers::content::generate_content,
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_item,
        crate::handlers::carts::update_item,
        crate::handlers::carts::remove_item,
        crate::handlers::carts::clear_cart,
        crate::handlers::settlements::settle_order,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(
        schemas(
            crate::handlers::checkout::CheckoutRequest,
            crate::handlers::checkout::CheckoutResponse,
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderSummary,
            crate::handlers::orders::OrderItemResponse,
            crate::handlers::orders::CreateOrderRequest,
            crate::handlers::orders::CreateOrderResponse,
            crate::handlers::promotions::ValidatePromoRequest,
            crate::handlers::promotions::PromoValidationResponse,
            crate::handlers::coins::CoinTransactionResponse,
            crate::handlers::coins::SpendCoinsRequest,
            crate::handlers::coins::RefundCoinsRequest,
            crate::handlers::content::GenerateContentRequest,
            crate::handlers::carts::CartResponse,
            crate::handlers::carts::CartItemResponse,
            crate::handlers::carts::AddCartItemRequest,
            crate::handlers::carts::UpdateCartItemRequest,
            crate::handlers::settlements::SettleOrderRequest,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::services::orders::OrderLine,
            crate::services::promotions::PromoRejection,
            crate::services::settlement::PaymentOutcome,
            crate::services::settlement::SettlementResult,
            crate::services::settlement::SettlementDisposition,
            crate::services::ledger::CoinBalance,
            crate::services::ledger::SpendReceipt,
            crate::services::ledger::LedgerAudit,
            crate::services::generation::GenerationReceipt,
            crate::gateways::PaymentProvider,
            crate::gateways::PaymentSession,
            crate::entities::order::OrderStatus,
            crate::entities::product::ProductKind,
            crate::entities::coin_transaction::TransactionType,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
