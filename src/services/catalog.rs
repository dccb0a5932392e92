use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as ProductEntity},
        promo_code::{self, normalize_code, Entity as PromoCodeEntity},
    },
    errors::ServiceError,
};
use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

/// Read-only product and promo lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Returns the products that exist among `ids`, in no particular order.
    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<product::Model>, ServiceError>;

    async fn product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError>;

    /// Case-insensitive lookup by code.
    async fn promo_code_by_code(
        &self,
        code: &str,
    ) -> Result<Option<promo_code::Model>, ServiceError>;
}

#[derive(Clone)]
pub struct DbCatalog {
    db_pool: Arc<DbPool>,
}

impl DbCatalog {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CatalogReader for DbCatalog {
    async fn products_by_ids(&self, ids: &[Uuid]) -> Result<Vec<product::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let products = ProductEntity::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(&*self.db_pool)
            .await?;
        Ok(products)
    }

    async fn product(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(ProductEntity::find_by_id(id).one(&*self.db_pool).await?)
    }

    async fn promo_code_by_code(
        &self,
        code: &str,
    ) -> Result<Option<promo_code::Model>, ServiceError> {
        let promo = PromoCodeEntity::find()
            .filter(promo_code::Column::Code.eq(normalize_code(code)))
            .one(&*self.db_pool)
            .await?;
        Ok(promo)
    }
}
