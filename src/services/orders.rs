use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity, OrderStatus},
        order_item::{self, Entity as OrderItemEntity},
        product,
    },
    errors::ServiceError,
    events::{publish, Event, EventSender},
    services::{
        catalog::CatalogReader,
        promotions::PromotionService,
        settlement::{PaymentOutcome, SettlementResult, SettlementService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// One requested line of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderLine {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Validate)]
pub struct CreateOrderInput {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderLine>,
    pub promo_code: Option<String>,
    /// Client's claim that the order costs nothing; checked against the computed total
    pub is_free: bool,
}

/// Order with its immutable line items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// A built order plus, for free orders, the settlement that completed it.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: OrderWithItems,
    pub settlement: Option<SettlementResult>,
}

/// Lines resolved against the catalog with the promo applied; nothing persisted yet.
#[derive(Debug, Clone)]
pub struct PricedOrder {
    pub user_id: Uuid,
    lines: Vec<(i32, product::Model)>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    promo_code_id: Option<Uuid>,
}

impl PricedOrder {
    pub fn is_free(&self) -> bool {
        self.total.is_zero()
    }
}

/// Turns validated carts into persisted orders.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    catalog: Arc<dyn CatalogReader>,
    promotions: Arc<PromotionService>,
    settlement: Arc<SettlementService>,
    currency: String,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        catalog: Arc<dyn CatalogReader>,
        promotions: Arc<PromotionService>,
        settlement: Arc<SettlementService>,
        currency: impl Into<String>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            catalog,
            promotions,
            settlement,
            currency: currency.into(),
            event_sender,
        }
    }

    /// Builds and persists an order with prices snapshotted from the catalog.
    ///
    /// Paid orders stay PENDING. Orders totalling zero are settled as paid in
    /// the same transaction that creates them.
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<CreatedOrder, ServiceError> {
        let priced = self.price_order(&input).await?;
        self.place_order(priced).await
    }

    /// Resolves products and the promo code and computes the totals.
    ///
    /// Fails with `NotFound` for unknown or inactive products, with the promo
    /// rejection for an unusable code, and with `ValidationError` when the
    /// caller claims a free order that is not.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, lines = input.items.len()))]
    pub async fn price_order(&self, input: &CreateOrderInput) -> Result<PricedOrder, ServiceError> {
        input.validate()?;
        for line in &input.items {
            line.validate()?;
        }

        let lines = merge_lines(&input.items)?;
        let ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
        let mut products: HashMap<Uuid, product::Model> = self
            .catalog
            .products_by_ids(&ids)
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| (p.id, p))
            .collect();

        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = products.remove(&line.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", line.product_id))
            })?;
            priced.push((line.quantity, product));
        }

        let subtotal: Decimal = priced
            .iter()
            .map(|(quantity, product)| product.price * Decimal::from(*quantity))
            .sum::<Decimal>()
            .round_dp(2);

        let promo = match input.promo_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(self.promotions.validate(code, subtotal).await?),
            _ => None,
        };
        let discount = promo
            .as_ref()
            .map(|p| p.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let total = subtotal - discount;

        if input.is_free && !total.is_zero() {
            return Err(ServiceError::ValidationError(format!(
                "Order is not free: total is {}",
                total
            )));
        }

        Ok(PricedOrder {
            user_id: input.user_id,
            lines: priced,
            subtotal,
            discount,
            total,
            promo_code_id: promo.map(|p| p.promo_code_id),
        })
    }

    /// Persists a priced order; free orders are settled in the same transaction.
    #[instrument(skip(self, priced), fields(user_id = %priced.user_id, total = %priced.total))]
    pub async fn place_order(&self, priced: PricedOrder) -> Result<CreatedOrder, ServiceError> {
        let is_free = priced.is_free();
        let PricedOrder {
            user_id,
            lines,
            subtotal,
            discount,
            total,
            promo_code_id,
        } = priced;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let db = &*self.db_pool;

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            subtotal: Set(subtotal),
            discount: Set(discount),
            total: Set(total),
            currency: Set(self.currency.clone()),
            is_free: Set(is_free),
            promo_code_id: Set(promo_code_id),
            payment_provider: Set(None),
            payment_reference: Set(None),
            transaction_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for (quantity, product) in &lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                kind: Set(product.kind),
                quantity: Set(*quantity),
                price: Set(product.price),
                coins_per_unit: Set(product.coins_per_unit()),
            }
            .insert(&txn)
            .await?;
        }

        let report = if is_free {
            Some(
                self.settlement
                    .apply(&txn, order_id, PaymentOutcome::Success, None)
                    .await?,
            )
        } else {
            None
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        let settlement = match report {
            Some(report) => Some(self.settlement.finish(report).await),
            None => None,
        };

        let order = self.get_order(order_id).await?;
        info!(%order_id, status = %order.order.status, %total, "order created");
        publish(
            self.event_sender.as_deref(),
            Event::OrderCreated {
                order_id,
                user_id,
                status: order.order.status,
            },
        )
        .await;

        Ok(CreatedOrder { order, settlement })
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let db = &*self.db_pool;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;
        Ok(OrderWithItems { order, items })
    }

    /// Newest-first page of a user's orders, plus the total count.
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Records the gateway session that will eventually settle the order.
    #[instrument(skip(self))]
    pub async fn attach_payment_session(
        &self,
        order_id: Uuid,
        provider: &str,
        reference: &str,
    ) -> Result<(), ServiceError> {
        let updated = OrderEntity::update_many()
            .col_expr(order::Column::PaymentProvider, Expr::value(provider.to_string()))
            .col_expr(order::Column::PaymentReference, Expr::value(reference.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db_pool)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        Ok(())
    }
}

/// Folds repeated product ids into one line, keeping first-seen order.
fn merge_lines(items: &[OrderLine]) -> Result<Vec<OrderLine>, ServiceError> {
    let mut merged: Vec<OrderLine> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|line| line.product_id == item.product_id) {
            Some(line) => {
                line.quantity = line.quantity.checked_add(item.quantity).ok_or_else(|| {
                    ServiceError::ValidationError("Quantity out of range".to_string())
                })?
            }
            None => merged.push(item.clone()),
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_lines_are_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_lines(&[
            OrderLine {
                product_id: a,
                quantity: 1,
            },
            OrderLine {
                product_id: b,
                quantity: 2,
            },
            OrderLine {
                product_id: a,
                quantity: 3,
            },
        ])
        .unwrap();

        assert_eq!(
            merged,
            vec![
                OrderLine {
                    product_id: a,
                    quantity: 4
                },
                OrderLine {
                    product_id: b,
                    quantity: 2
                },
            ]
        );
    }

    #[test]
    fn empty_order_fails_validation() {
        let input = CreateOrderInput {
            user_id: Uuid::new_v4(),
            items: vec![],
            promo_code: None,
            is_free: false,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn zero_quantity_fails_validation() {
        let input = CreateOrderInput {
            user_id: Uuid::new_v4(),
            items: vec![OrderLine {
                product_id: Uuid::new_v4(),
                quantity: 0,
            }],
            promo_code: None,
            is_free: false,
        };
        assert!(input.items[0].validate().is_err());
    }
}
