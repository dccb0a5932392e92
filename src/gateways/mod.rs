//! Payment gateway adapters.
//!
//! Each adapter opens a payment session for an order and turns the
//! provider's callback into a normalized [`GatewayCallback`], verifying the
//! callback signature before anything is parsed.

pub mod apple_pay;
pub mod kashier;
pub mod paypal;

use crate::{entities::order, errors::ServiceError, services::settlement::PaymentOutcome};
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use utoipa::ToSchema;
use uuid::Uuid;

pub use apple_pay::ApplePayGateway;
pub use kashier::KashierGateway;
pub use paypal::PayPalGateway;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentProvider {
    Kashier,
    Paypal,
    ApplePay,
}

/// Where the buyer goes to pay, and how the provider will refer to the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentSession {
    pub provider: PaymentProvider,
    pub reference: String,
    /// Hosted payment page; absent for wallet sheets presented client-side
    pub redirect_url: Option<String>,
}

/// Provider callback reduced to what settlement needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCallback {
    pub order_id: Uuid,
    pub outcome: PaymentOutcome,
    pub transaction_id: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn create_session(&self, order: &order::Model) -> Result<PaymentSession, ServiceError>;

    /// Verifies and parses a raw callback. `Ok(None)` means an authentic
    /// event that carries no payment outcome.
    fn parse_callback(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<GatewayCallback>, ServiceError>;
}

/// Configured adapters keyed by provider.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.provider(), gateway);
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
        self.gateways.get(&provider).cloned().ok_or_else(|| {
            ServiceError::BadRequest(format!("payment provider {} is not configured", provider))
        })
    }

    /// Resolves a provider by its path name, e.g. `apple_pay`.
    pub fn by_name(&self, name: &str) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
        let provider: PaymentProvider = name
            .parse()
            .map_err(|_| ServiceError::NotFound(format!("Unknown payment provider {}", name)))?;
        self.get(provider)
    }

    pub fn providers(&self) -> Vec<PaymentProvider> {
        self.gateways.keys().copied().collect()
    }
}

/// Order id as carried in provider payloads.
pub(crate) fn parse_order_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::BadRequest(format!("callback references unknown order id {}", raw)))
}
