use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

/// Download link notice for a settled digital product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryNotice {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub download_url: String,
}

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Relay rejected notice with status {0}")]
    Rejected(u16),
}

/// Outbound delivery channel. Failures are reported to the caller, which
/// must not treat them as fatal for the already-committed settlement.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryNotifier: Send + Sync {
    async fn notify_delivery(&self, notice: DeliveryNotice) -> Result<(), NotificationError>;
}

/// Writes notices to the log; used when no mail relay is configured.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl DeliveryNotifier for LoggingNotifier {
    async fn notify_delivery(&self, notice: DeliveryNotice) -> Result<(), NotificationError> {
        info!(
            order_id = %notice.order_id,
            user_id = %notice.user_id,
            product_id = %notice.product_id,
            download_url = %notice.download_url,
            "delivery notice"
        );
        Ok(())
    }
}

/// Posts notices as JSON to a mail relay.
#[derive(Debug, Clone)]
pub struct HttpRelayNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRelayNotifier {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl DeliveryNotifier for HttpRelayNotifier {
    #[instrument(skip(self, notice), fields(order_id = %notice.order_id))]
    async fn notify_delivery(&self, notice: DeliveryNotice) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&notice)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notice() -> DeliveryNotice {
        DeliveryNotice {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Prompt pack".into(),
            download_url: "https://cdn.example.com/pack.zip".into(),
        }
    }

    #[tokio::test]
    async fn relay_posts_notice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deliveries"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpRelayNotifier::new(format!("{}/deliveries", server.uri())).unwrap();
        notifier.notify_delivery(notice()).await.unwrap();
    }

    #[tokio::test]
    async fn relay_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = HttpRelayNotifier::new(server.uri()).unwrap();
        let err = notifier.notify_delivery(notice()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Rejected(503)));
    }
}
