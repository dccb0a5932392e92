use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events published after a unit of work commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        status: OrderStatus,
    },
    OrderSettled {
        order_id: Uuid,
        status: OrderStatus,
        transaction_id: Option<String>,
    },
    OrderFailed {
        order_id: Uuid,
        reason: String,
    },
    CoinsCredited {
        user_id: Uuid,
        amount: i64,
        balance_after: i64,
        related_id: Option<Uuid>,
    },
    CoinsSpent {
        user_id: Uuid,
        amount: i64,
        balance_after: i64,
        related_id: Option<Uuid>,
    },
    DeliveryFailed {
        order_id: Uuid,
        product_id: Uuid,
        error: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing. Committed work is never undone by a dropped event.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "event dropped");
        }
    }
}

/// Convenience for services holding an optional sender.
pub async fn publish(sender: Option<&EventSender>, event: Event) {
    if let Some(sender) = sender {
        sender.send_or_log(event).await;
    }
}

/// Drains the event channel, logging each event.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                user_id,
                status,
            } => info!(%order_id, %user_id, %status, "order created"),
            Event::OrderSettled {
                order_id, status, ..
            } => info!(%order_id, %status, "order settled"),
            Event::OrderFailed { order_id, reason } => {
                warn!(%order_id, reason = %reason, "order failed")
            }
            Event::CoinsCredited {
                user_id,
                amount,
                balance_after,
                ..
            } => info!(%user_id, amount, balance_after, "coins credited"),
            Event::CoinsSpent {
                user_id,
                amount,
                balance_after,
                ..
            } => info!(%user_id, amount, balance_after, "coins spent"),
            Event::DeliveryFailed {
                order_id,
                product_id,
                error,
                ..
            } => warn!(%order_id, %product_id, error = %error, "delivery notification failed"),
        }
    }

    info!("Event processing loop stopped");
}
