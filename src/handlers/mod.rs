pub mod carts;
pub mod checkout;
pub mod coins;
pub mod common;
pub mod content;
pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod promotions;
pub mod settlements;

use crate::{
    config::AppConfig,
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    gateways::{ApplePayGateway, GatewayRegistry, KashierGateway, PayPalGateway},
    notifications::{DeliveryNotifier, HttpRelayNotifier, LoggingNotifier},
    services::{
        cart::CartService,
        catalog::{CatalogReader, DbCatalog},
        checkout::CheckoutService,
        generation::{ContentGenerator, GenerationService, HttpContentGenerator},
        ledger::LedgerService,
        orders::OrderService,
        promotions::PromotionService,
        settlement::SettlementService,
    },
};
use std::sync::Arc;
use tracing::info;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<dyn CatalogReader>,
    pub promotions: Arc<PromotionService>,
    pub ledger: Arc<LedgerService>,
    pub cart: Arc<CartService>,
    pub settlement: Arc<SettlementService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub gateways: Arc<GatewayRegistry>,
    /// Absent when no content generation endpoint is configured
    pub generation: Option<Arc<GenerationService>>,
}

impl AppServices {
    /// Wires the service graph around injected collaborators.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        notifier: Arc<dyn DeliveryNotifier>,
        generator: Option<Arc<dyn ContentGenerator>>,
        gateways: GatewayRegistry,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let catalog: Arc<dyn CatalogReader> = Arc::new(DbCatalog::new(db_pool.clone()));
        let promotions = Arc::new(PromotionService::new(catalog.clone()));
        let ledger = Arc::new(LedgerService::new(
            db_pool.clone(),
            config.coins.signup_bonus,
            config.coins.max_spend_retries,
            event_sender.clone(),
        ));
        let cart = Arc::new(CartService::new(db_pool.clone(), catalog.clone()));
        let settlement = Arc::new(SettlementService::new(
            db_pool.clone(),
            ledger.clone(),
            catalog.clone(),
            notifier,
            event_sender.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            catalog.clone(),
            promotions.clone(),
            settlement.clone(),
            config.default_currency.clone(),
            event_sender,
        ));
        let gateways = Arc::new(gateways);
        let checkout = Arc::new(CheckoutService::new(
            orders.clone(),
            settlement.clone(),
            cart.clone(),
            gateways.clone(),
        ));
        let generation = generator
            .map(|generator| Arc::new(GenerationService::new(db_pool, ledger.clone(), generator)));

        Self {
            catalog,
            promotions,
            ledger,
            cart,
            settlement,
            orders,
            checkout,
            gateways,
            generation,
        }
    }

    /// Builds every collaborator the configuration enables.
    pub fn from_config(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Result<Self, ServiceError> {
        let tolerance = config.payment_webhook_tolerance_secs;
        let mut gateways = GatewayRegistry::new();
        if let Some(kashier) = &config.kashier {
            gateways.register(Arc::new(KashierGateway::new(kashier.clone())));
        }
        if let Some(paypal) = &config.paypal {
            gateways.register(Arc::new(PayPalGateway::new(paypal.clone(), tolerance)?));
        }
        if let Some(apple_pay) = &config.apple_pay {
            gateways.register(Arc::new(ApplePayGateway::new(
                apple_pay.merchant_id.clone(),
                &apple_pay.webhook_secret,
                tolerance,
            )));
        }
        info!(providers = ?gateways.providers(), "payment gateways configured");

        let notifier: Arc<dyn DeliveryNotifier> = match &config.delivery_webhook_url {
            Some(url) => Arc::new(
                HttpRelayNotifier::new(url.clone())
                    .map_err(|e| ServiceError::InternalError(e.to_string()))?,
            ),
            None => Arc::new(LoggingNotifier),
        };

        let generator: Option<Arc<dyn ContentGenerator>> = match &config.generation {
            Some(generation) => Some(Arc::new(HttpContentGenerator::new(generation.clone())?)),
            None => None,
        };

        Ok(Self::new(
            db_pool,
            config,
            notifier,
            generator,
            gateways,
            event_sender,
        ))
    }

    pub fn generation(&self) -> Result<Arc<GenerationService>, ServiceError> {
        self.generation.clone().ok_or_else(|| {
            ServiceError::ServiceUnavailable("content generation is not configured".to_string())
        })
    }
}
