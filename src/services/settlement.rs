use crate::{
    db::DbPool,
    entities::{
        coin_transaction::{self, TransactionType},
        order::{self, Entity as OrderEntity, OrderStatus},
        order_item::{self, Entity as OrderItemEntity},
        product::ProductKind,
    },
    errors::ServiceError,
    events::{publish, Event, EventSender},
    notifications::{DeliveryNotice, DeliveryNotifier},
    services::{
        cart::CartService,
        catalog::CatalogReader,
        ledger::{LedgerEntry, LedgerService},
        promotions::PromotionService,
    },
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Normalized result reported by a payment gateway.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum PaymentOutcome {
    Success,
    Failed,
    Pending,
    Cancelled,
}

impl PaymentOutcome {
    pub fn target_status(self) -> OrderStatus {
        match self {
            Self::Success => OrderStatus::Completed,
            Self::Failed => OrderStatus::Failed,
            Self::Cancelled => OrderStatus::Cancelled,
            Self::Pending => OrderStatus::Processing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SettlementDisposition {
    /// The order moved and side effects ran
    Applied,
    /// The order was already in the requested state; nothing ran
    AlreadySettled,
    /// The transition is not allowed from the current state; nothing ran
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SettlementResult {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub disposition: SettlementDisposition,
    pub coins_credited: i64,
    pub promo_redeemed: bool,
    pub cart_items_removed: u64,
    pub deliveries_sent: usize,
    pub delivery_failures: usize,
}

/// Committed settlement plus the follow-up work that runs outside the transaction.
#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub result: SettlementResult,
    user_id: Uuid,
    transaction_id: Option<String>,
    deliverables: Vec<order_item::Model>,
    credit: Option<coin_transaction::Model>,
}

impl SettlementReport {
    fn unchanged(order: &order::Model, disposition: SettlementDisposition) -> Self {
        Self {
            result: SettlementResult {
                order_id: order.id,
                status: order.status,
                disposition,
                coins_credited: 0,
                promo_redeemed: false,
                cart_items_removed: 0,
                deliveries_sent: 0,
                delivery_failures: 0,
            },
            user_id: order.user_id,
            transaction_id: None,
            deliverables: Vec::new(),
            credit: None,
        }
    }
}

/// Applies payment outcomes to orders. Free orders and gateway callbacks both end up here.
#[derive(Clone)]
pub struct SettlementService {
    db_pool: Arc<DbPool>,
    ledger: Arc<LedgerService>,
    catalog: Arc<dyn CatalogReader>,
    notifier: Arc<dyn DeliveryNotifier>,
    event_sender: Option<Arc<EventSender>>,
}

impl SettlementService {
    pub fn new(
        db_pool: Arc<DbPool>,
        ledger: Arc<LedgerService>,
        catalog: Arc<dyn CatalogReader>,
        notifier: Arc<dyn DeliveryNotifier>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            ledger,
            catalog,
            notifier,
            event_sender,
        }
    }

    /// Settles an order as one unit of work, then runs post-commit delivery.
    ///
    /// Safe under redelivery: a repeated or racing call for the same outcome
    /// reports `AlreadySettled` and changes nothing.
    #[instrument(skip(self))]
    pub async fn settle(
        &self,
        order_id: Uuid,
        outcome: PaymentOutcome,
        transaction_id: Option<String>,
    ) -> Result<SettlementResult, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let report = self.apply(&txn, order_id, outcome, transaction_id).await?;
        txn.commit().await?;

        Ok(self.finish(report).await)
    }

    /// The transactional part of settlement. Everything runs on `conn`; the
    /// caller commits and then hands the report to [`Self::finish`].
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        outcome: PaymentOutcome,
        transaction_id: Option<String>,
    ) -> Result<SettlementReport, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let target = outcome.target_status();

        if order.status == target {
            counter!("coin_commerce.settlements.duplicate", 1);
            info!(%order_id, status = %order.status, "settlement already applied");
            return Ok(SettlementReport::unchanged(
                &order,
                SettlementDisposition::AlreadySettled,
            ));
        }
        if !order.status.can_transition_to(target) {
            counter!("coin_commerce.settlements.ignored", 1);
            warn!(%order_id, from = %order.status, to = %target, "settlement ignored for disallowed transition");
            return Ok(SettlementReport::unchanged(&order, SettlementDisposition::Ignored));
        }

        // Compare-and-set on status: only one settlement of this order can win
        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(target))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()));
        if let Some(reference) = &transaction_id {
            update = update.col_expr(order::Column::TransactionId, Expr::value(reference.clone()));
        }
        let updated = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in(OrderStatus::sources_for(target).iter().copied()))
            .exec(conn)
            .await?;

        if updated.rows_affected == 0 {
            let current = OrderEntity::find_by_id(order_id)
                .one(conn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
            let disposition = if current.status == target {
                counter!("coin_commerce.settlements.duplicate", 1);
                SettlementDisposition::AlreadySettled
            } else {
                counter!("coin_commerce.settlements.ignored", 1);
                SettlementDisposition::Ignored
            };
            info!(%order_id, status = %current.status, "lost settlement race");
            return Ok(SettlementReport::unchanged(&current, disposition));
        }

        let mut report = SettlementReport::unchanged(&order, SettlementDisposition::Applied);
        report.result.status = target;
        report.transaction_id = transaction_id;

        if target == OrderStatus::Completed {
            self.complete(conn, &order, &mut report).await?;
        }

        counter!("coin_commerce.settlements.applied", 1);
        info!(%order_id, from = %order.status, to = %target, "settlement applied");
        Ok(report)
    }

    /// Side effects of a successful payment, inside the settlement transaction.
    async fn complete<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &order::Model,
        report: &mut SettlementReport,
    ) -> Result<(), ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(conn)
            .await?;

        if let Some(promo_id) = order.promo_code_id {
            report.result.promo_redeemed = PromotionService::redeem(conn, promo_id).await?;
        }

        let coins = items
            .iter()
            .try_fold(0i64, |acc, item| item.coins_total()?.checked_add(acc))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "coin total of order {} overflows the wallet",
                    order.id
                ))
            })?;
        if coins > 0 {
            let entry = LedgerEntry::credit(
                order.user_id,
                TransactionType::Purchase,
                coins,
                format!("Coin package purchase, order {}", order.id),
                Some(order.id),
            );
            let credit = self.ledger.apply(conn, &entry).await?;
            report.result.coins_credited = coins;
            report.credit = Some(credit);
        }

        let product_ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
        report.result.cart_items_removed =
            CartService::remove_products(conn, order.user_id, &product_ids).await?;

        report.deliverables = items
            .into_iter()
            .filter(|item| item.kind == ProductKind::Digital)
            .collect();
        Ok(())
    }

    /// Post-commit follow-up: delivery notices and events. Never fails the settlement.
    pub async fn finish(&self, mut report: SettlementReport) -> SettlementResult {
        if report.result.disposition != SettlementDisposition::Applied {
            return report.result;
        }
        let order_id = report.result.order_id;

        for item in std::mem::take(&mut report.deliverables) {
            match self.deliver(order_id, report.user_id, &item).await {
                Ok(()) => report.result.deliveries_sent += 1,
                Err(error) => {
                    report.result.delivery_failures += 1;
                    counter!("coin_commerce.delivery.failures", 1);
                    warn!(%order_id, product_id = %item.product_id, error = %error, "delivery notification failed");
                    publish(
                        self.event_sender.as_deref(),
                        Event::DeliveryFailed {
                            order_id,
                            product_id: item.product_id,
                            error,
                            at: Utc::now(),
                        },
                    )
                    .await;
                }
            }
        }

        if let Some(credit) = &report.credit {
            self.ledger.publish_transaction(credit).await;
        }

        let event = match report.result.status {
            OrderStatus::Failed | OrderStatus::Cancelled => Event::OrderFailed {
                order_id,
                reason: report.result.status.to_string(),
            },
            status => Event::OrderSettled {
                order_id,
                status,
                transaction_id: report.transaction_id.clone(),
            },
        };
        publish(self.event_sender.as_deref(), event).await;

        report.result
    }

    async fn deliver(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        item: &order_item::Model,
    ) -> Result<(), String> {
        let product = self
            .catalog
            .product(item.product_id)
            .await
            .map_err(|e| e.to_string())?;
        let download_url = product
            .and_then(|p| p.download_url)
            .ok_or_else(|| format!("product {} has no download url", item.product_id))?;

        self.notifier
            .notify_delivery(DeliveryNotice {
                order_id,
                user_id,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                download_url,
            })
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::entities::{order_item, product};
    use crate::notifications::{MockDeliveryNotifier, NotificationError};
    use crate::services::catalog::DbCatalog;
    use rust_decimal_macros::dec;
    use sea_orm::{ActiveModelTrait, Set};

    async fn setup(notifier: MockDeliveryNotifier) -> (Arc<DbPool>, SettlementService) {
        let db = Arc::new(
            establish_connection_with_config(&DbConfig::sqlite_memory())
                .await
                .unwrap(),
        );
        run_migrations(&db).await.unwrap();
        let ledger = Arc::new(LedgerService::new(db.clone(), 0, 3, None));
        let catalog = Arc::new(DbCatalog::new(db.clone()));
        let service = SettlementService::new(db.clone(), ledger, catalog, Arc::new(notifier), None);
        (db, service)
    }

    async fn digital_order(db: &DbPool) -> Uuid {
        let now = Utc::now();
        let product_id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(product_id),
            name: Set("Prompt pack".into()),
            price: Set(dec!(10)),
            kind: Set(ProductKind::Digital),
            coin_amount: Set(None),
            download_url: Set(Some("https://cdn.example.com/pack.zip".into())),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();

        let order_id = Uuid::new_v4();
        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(Uuid::new_v4()),
            status: Set(OrderStatus::Pending),
            subtotal: Set(dec!(10)),
            discount: Set(dec!(0)),
            total: Set(dec!(10)),
            currency: Set("EGP".into()),
            is_free: Set(false),
            promo_code_id: Set(None),
            payment_provider: Set(None),
            payment_reference: Set(None),
            transaction_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap();
        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product_id),
            product_name: Set("Prompt pack".into()),
            kind: Set(ProductKind::Digital),
            quantity: Set(1),
            price: Set(dec!(10)),
            coins_per_unit: Set(0),
        }
        .insert(db)
        .await
        .unwrap();
        order_id
    }

    #[tokio::test]
    async fn delivery_failure_does_not_undo_settlement() {
        let mut notifier = MockDeliveryNotifier::new();
        notifier
            .expect_notify_delivery()
            .times(1)
            .returning(|_| Err(NotificationError::Rejected(500)));
        let (db, service) = setup(notifier).await;
        let order_id = digital_order(&db).await;

        let result = service
            .settle(order_id, PaymentOutcome::Success, Some("txn-1".into()))
            .await
            .unwrap();

        assert_eq!(result.status, OrderStatus::Completed);
        assert_eq!(result.disposition, SettlementDisposition::Applied);
        assert_eq!(result.delivery_failures, 1);
        assert_eq!(result.deliveries_sent, 0);

        let stored = OrderEntity::find_by_id(order_id).one(&*db).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(stored.transaction_id.as_deref(), Some("txn-1"));
    }

    #[tokio::test]
    async fn replay_does_not_notify_twice() {
        let mut notifier = MockDeliveryNotifier::new();
        notifier
            .expect_notify_delivery()
            .times(1)
            .returning(|_| Ok(()));
        let (db, service) = setup(notifier).await;
        let order_id = digital_order(&db).await;

        let first = service.settle(order_id, PaymentOutcome::Success, None).await.unwrap();
        let second = service.settle(order_id, PaymentOutcome::Success, None).await.unwrap();

        assert_eq!(first.deliveries_sent, 1);
        assert_eq!(second.disposition, SettlementDisposition::AlreadySettled);
        assert_eq!(second.deliveries_sent, 0);
    }

    #[test]
    fn outcomes_map_to_statuses() {
        assert_eq!(PaymentOutcome::Success.target_status(), OrderStatus::Completed);
        assert_eq!(PaymentOutcome::Pending.target_status(), OrderStatus::Processing);
        assert_eq!("cancelled".parse::<PaymentOutcome>().unwrap(), PaymentOutcome::Cancelled);
    }
}
