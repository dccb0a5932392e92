use crate::{
    db::DbPool,
    entities::cart_item::{self, Entity as CartItemEntity},
    errors::ServiceError,
    services::catalog::CatalogReader,
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Largest quantity a single cart line may hold.
pub const MAX_LINE_QUANTITY: i32 = 1_000;

/// Per-user cart. One row per (user, product).
#[derive(Clone)]
pub struct CartService {
    db_pool: Arc<DbPool>,
    catalog: Arc<dyn CatalogReader>,
}

impl CartService {
    pub fn new(db_pool: Arc<DbPool>, catalog: Arc<dyn CatalogReader>) -> Self {
        Self { db_pool, catalog }
    }

    /// Adds `quantity` of a product; re-adding accumulates onto the existing line.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<cart_item::Model, ServiceError> {
        check_quantity(quantity)?;
        match self.catalog.product(product_id).await? {
            Some(product) if product.is_active => {}
            _ => {
                return Err(ServiceError::NotFound(format!(
                    "Product {} not found",
                    product_id
                )))
            }
        }

        let db = &*self.db_pool;
        let now = Utc::now();
        let line = cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        };
        CartItemEntity::insert(line)
            .on_conflict(
                OnConflict::columns([cart_item::Column::UserId, cart_item::Column::ProductId])
                    .value(
                        cart_item::Column::Quantity,
                        Expr::col((CartItemEntity, cart_item::Column::Quantity)).add(quantity),
                    )
                    .update_column(cart_item::Column::UpdatedAt)
                    .to_owned(),
            )
            .exec_without_returning(db)
            .await?;

        let mut item = self.find_line(user_id, product_id).await?.ok_or_else(|| {
            ServiceError::InternalError(format!(
                "cart line for product {} missing after upsert",
                product_id
            ))
        })?;
        if item.quantity > MAX_LINE_QUANTITY {
            CartItemEntity::update_many()
                .col_expr(cart_item::Column::Quantity, Expr::value(MAX_LINE_QUANTITY))
                .filter(cart_item::Column::Id.eq(item.id))
                .exec(db)
                .await?;
            item.quantity = MAX_LINE_QUANTITY;
        }
        Ok(item)
    }

    /// Sets a line's quantity. Zero removes the line and returns `None`.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Option<cart_item::Model>, ServiceError> {
        if quantity == 0 {
            self.remove_item(user_id, product_id).await?;
            return Ok(None);
        }
        check_quantity(quantity)?;

        let updated = CartItemEntity::update_many()
            .col_expr(cart_item::Column::Quantity, Expr::value(quantity))
            .col_expr(cart_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db_pool)
            .await?;
        if updated.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not in the cart",
                product_id
            )));
        }
        self.find_line(user_id, product_id).await
    }

    /// Removes a line. Returns false if it was not there.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, ServiceError> {
        let removed = Self::remove_products(&*self.db_pool, user_id, &[product_id]).await?;
        Ok(removed > 0)
    }

    pub async fn list_items(&self, user_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        let items = CartItemEntity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(items)
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItemEntity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db_pool)
            .await?;
        Ok(result.rows_affected)
    }

    /// Deletes the user's lines for `product_ids` inside `conn`. Idempotent.
    pub async fn remove_products<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
        product_ids: &[Uuid],
    ) -> Result<u64, ServiceError> {
        if product_ids.is_empty() {
            return Ok(0);
        }
        let result = CartItemEntity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.is_in(product_ids.iter().copied()))
            .exec(conn)
            .await?;
        debug!(%user_id, removed = result.rows_affected, "cart lines removed");
        Ok(result.rows_affected)
    }

    async fn find_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<cart_item::Model>, ServiceError> {
        let item = CartItemEntity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db_pool)
            .await?;
        Ok(item)
    }
}

fn check_quantity(quantity: i32) -> Result<(), ServiceError> {
    if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
        return Err(ServiceError::ValidationError(format!(
            "quantity must be between 1 and {}",
            MAX_LINE_QUANTITY
        )));
    }
    Ok(())
}
