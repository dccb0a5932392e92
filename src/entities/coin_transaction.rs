use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    #[sea_orm(string_value = "BONUS")]
    Bonus,
    #[sea_orm(string_value = "PURCHASE")]
    Purchase,
    #[sea_orm(string_value = "SPEND")]
    Spend,
    #[sea_orm(string_value = "REFUND")]
    Refund,
}

impl TransactionType {
    /// Credits carry a positive amount, spends a negative one.
    pub fn is_credit(self) -> bool {
        !matches!(self, Self::Spend)
    }
}

/// Append-only ledger row. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coin_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub sequence: i64,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub reason: String,
    pub balance_before: i64,
    pub balance_after: i64,
    pub related_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::coin_account::Entity",
        from = "Column::UserId",
        to = "super::coin_account::Column::UserId"
    )]
    CoinAccount,
}

impl Related<super::coin_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CoinAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
