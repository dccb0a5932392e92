use crate::{
    config::GenerationConfig,
    db::DbPool,
    entities::generated_content,
    errors::ServiceError,
    services::ledger::LedgerService,
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Text returned by the generator and the coins it cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub text: String,
    pub cost: i64,
}

/// External AI text generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Coins a request for `prompt` will cost, known before calling out.
    async fn quote(&self, prompt: &str) -> Result<i64, ServiceError>;

    async fn generate(&self, prompt: &str) -> Result<GeneratedText, ServiceError>;
}

/// Generator behind an HTTP endpoint that accepts `{prompt}` and returns `{text, cost?}`.
pub struct HttpContentGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerationResponse {
    text: String,
    cost: Option<i64>,
}

impl HttpContentGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn quote(&self, _prompt: &str) -> Result<i64, ServiceError> {
        Ok(self.config.cost_per_request)
    }

    #[instrument(skip(self, prompt))]
    async fn generate(&self, prompt: &str) -> Result<GeneratedText, ServiceError> {
        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&serde_json::json!({ "prompt": prompt }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("content generation request failed: {}", e))
        })?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "content generation failed with status {}",
                response.status()
            )));
        }
        let body: GenerationResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid generation response: {}", e))
        })?;

        Ok(GeneratedText {
            text: body.text,
            cost: body.cost.unwrap_or(self.config.cost_per_request),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationReceipt {
    pub content_id: Uuid,
    pub content: String,
    pub cost: i64,
    pub new_balance: i64,
}

/// Pays for generated content with coins.
#[derive(Clone)]
pub struct GenerationService {
    db_pool: Arc<DbPool>,
    ledger: Arc<LedgerService>,
    generator: Arc<dyn ContentGenerator>,
}

impl GenerationService {
    pub fn new(
        db_pool: Arc<DbPool>,
        ledger: Arc<LedgerService>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        Self {
            db_pool,
            ledger,
            generator,
        }
    }

    /// Generates content and debits its cost.
    ///
    /// The generator is not called when the quoted cost exceeds the balance.
    /// The debit and the stored content commit together.
    #[instrument(skip(self, prompt))]
    pub async fn generate(
        &self,
        user_id: Uuid,
        prompt: &str,
    ) -> Result<GenerationReceipt, ServiceError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ServiceError::ValidationError("prompt is required".to_string()));
        }

        let quote = self.generator.quote(prompt).await?;
        let wallet = self.ledger.balance(user_id).await?;
        if wallet.balance < quote {
            return Err(ServiceError::InsufficientBalance {
                required: quote,
                available: wallet.balance,
            });
        }

        let output = self.generator.generate(prompt).await?;
        if output.cost > quote {
            warn!(quote, cost = output.cost, "generator charged more than quoted");
        }

        let content_id = Uuid::new_v4();
        let txn = self.db_pool.begin().await?;
        let spend = if output.cost > 0 {
            Some(
                self.ledger
                    .spend_in(&txn, user_id, output.cost, "AI content generation", Some(content_id))
                    .await?,
            )
        } else {
            None
        };
        generated_content::ActiveModel {
            id: Set(content_id),
            user_id: Set(user_id),
            prompt: Set(prompt.to_string()),
            content: Set(output.text.clone()),
            cost: Set(output.cost.max(0)),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        let new_balance = match &spend {
            Some(tx) => {
                self.ledger.publish_transaction(tx).await;
                tx.balance_after
            }
            None => wallet.balance,
        };
        info!(%user_id, %content_id, cost = output.cost, "content generated");

        Ok(GenerationReceipt {
            content_id,
            content: output.text,
            cost: output.cost.max(0),
            new_balance,
        })
    }
}
