use crate::{
    errors::ServiceError,
    gateways::{GatewayRegistry, PaymentProvider, PaymentSession},
    services::{
        cart::CartService,
        orders::{CreateOrderInput, OrderLine, OrderService, OrderWithItems},
        settlement::{PaymentOutcome, SettlementResult, SettlementService},
    },
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    /// Explicit lines; the user's cart is used when absent
    pub items: Option<Vec<OrderLine>>,
    pub promo_code: Option<String>,
    pub is_free: bool,
    pub provider: Option<PaymentProvider>,
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: OrderWithItems,
    pub session: Option<PaymentSession>,
    pub settlement: Option<SettlementResult>,
}

/// Cart to order to payment session.
#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<OrderService>,
    settlement: Arc<SettlementService>,
    cart: Arc<CartService>,
    gateways: Arc<GatewayRegistry>,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<OrderService>,
        settlement: Arc<SettlementService>,
        cart: Arc<CartService>,
        gateways: Arc<GatewayRegistry>,
    ) -> Self {
        Self {
            orders,
            settlement,
            cart,
            gateways,
        }
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id, provider = ?request.provider))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, ServiceError> {
        let items = match request.items {
            Some(items) => items,
            None => self
                .cart
                .list_items(request.user_id)
                .await?
                .into_iter()
                .map(|item| OrderLine {
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect(),
        };
        if items.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".to_string()));
        }

        let priced = self
            .orders
            .price_order(&CreateOrderInput {
                user_id: request.user_id,
                items,
                promo_code: request.promo_code,
                is_free: request.is_free,
            })
            .await?;

        // Resolve the gateway before persisting so a misconfigured provider leaves no order behind
        let gateway = match (priced.is_free(), request.provider) {
            (true, _) => None,
            (false, Some(provider)) => Some(self.gateways.get(provider)?),
            (false, None) => {
                return Err(ServiceError::ValidationError(format!(
                    "a payment provider is required: order total is {}",
                    priced.total
                )))
            }
        };

        let created = self.orders.place_order(priced).await?;

        let order_id = created.order.order.id;
        let gateway = match gateway {
            Some(gateway) if created.settlement.is_none() => gateway,
            _ => {
                return Ok(CheckoutOutcome {
                    order: created.order,
                    session: None,
                    settlement: created.settlement,
                })
            }
        };

        let session = match gateway.create_session(&created.order.order).await {
            Ok(session) => session,
            Err(e) => {
                error!(%order_id, error = %e, "payment session could not be opened");
                self.settlement
                    .settle(order_id, PaymentOutcome::Failed, None)
                    .await?;
                return Err(match e {
                    ServiceError::ExternalServiceError(_) => e,
                    other => ServiceError::ExternalServiceError(other.to_string()),
                });
            }
        };

        self.orders
            .attach_payment_session(order_id, &session.provider.to_string(), &session.reference)
            .await?;
        info!(%order_id, reference = %session.reference, "payment session opened");

        let order = self.orders.get_order(order_id).await?;
        Ok(CheckoutOutcome {
            order,
            session: Some(session),
            settlement: None,
        })
    }
}
