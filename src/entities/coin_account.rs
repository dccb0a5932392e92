use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user wallet. `balance == total_earned - total_spent` at every committed state.
///
/// `version` increases by one with every ledger entry and equals the
/// `sequence` of the latest transaction; balance updates are conditional on it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coin_accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coin_transaction::Entity")]
    CoinTransaction,
}

impl Related<super::coin_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CoinTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
