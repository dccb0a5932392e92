use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// What a product delivers once its order completes.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductKind {
    #[sea_orm(string_value = "STANDARD")]
    Standard,
    /// Downloadable content, delivered by notification after settlement
    #[sea_orm(string_value = "DIGITAL")]
    Digital,
    /// Credits `coin_amount` coins per unit to the buyer's wallet
    #[sea_orm(string_value = "COIN_PACKAGE")]
    CoinPackage,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,
    pub kind: ProductKind,
    pub coin_amount: Option<i64>,
    pub download_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Coins credited per purchased unit; zero for anything but coin packages.
    pub fn coins_per_unit(&self) -> i64 {
        match self.kind {
            ProductKind::CoinPackage => self.coin_amount.unwrap_or(0).max(0),
            _ => 0,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
