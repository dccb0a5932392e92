use crate::{
    db::DbPool,
    entities::{
        coin_account::{self, Entity as CoinAccountEntity},
        coin_transaction::{self, Entity as CoinTransactionEntity, TransactionType},
    },
    errors::ServiceError,
    events::{publish, Event, EventSender},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Wallet snapshot returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CoinBalance {
    pub user_id: Uuid,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
}

impl From<&coin_account::Model> for CoinBalance {
    fn from(account: &coin_account::Model) -> Self {
        Self {
            user_id: account.user_id,
            balance: account.balance,
            total_earned: account.total_earned,
            total_spent: account.total_spent,
        }
    }
}

/// A balance change to append. `amount` is the magnitude; the sign follows the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub reason: String,
    pub related_id: Option<Uuid>,
}

impl LedgerEntry {
    pub fn credit(
        user_id: Uuid,
        transaction_type: TransactionType,
        amount: i64,
        reason: impl Into<String>,
        related_id: Option<Uuid>,
    ) -> Self {
        Self {
            user_id,
            transaction_type,
            amount,
            reason: reason.into(),
            related_id,
        }
    }

    pub fn spend(
        user_id: Uuid,
        amount: i64,
        reason: impl Into<String>,
        related_id: Option<Uuid>,
    ) -> Self {
        Self::credit(user_id, TransactionType::Spend, amount, reason, related_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SpendReceipt {
    pub transaction_id: Uuid,
    pub new_balance: i64,
}

/// Outcome of a full chain audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LedgerAudit {
    pub user_id: Uuid,
    pub entries: u64,
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
}

/// Per-user coin wallet backed by an append-only transaction ledger.
///
/// Every balance change is a conditional update on the account `version`
/// followed by an insert at `sequence = version + 1`, both inside the
/// caller's transaction. A lost race retries against fresh state.
#[derive(Clone)]
pub struct LedgerService {
    db_pool: Arc<DbPool>,
    signup_bonus: i64,
    max_retries: u32,
    event_sender: Option<Arc<EventSender>>,
}

impl LedgerService {
    pub fn new(
        db_pool: Arc<DbPool>,
        signup_bonus: i64,
        max_retries: u32,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            signup_bonus,
            max_retries: max_retries.max(1),
            event_sender,
        }
    }

    /// Current balance; provisions the wallet with the signup bonus on first access.
    #[instrument(skip(self))]
    pub async fn balance(&self, user_id: Uuid) -> Result<CoinBalance, ServiceError> {
        let db = &*self.db_pool;
        if let Some(account) = CoinAccountEntity::find_by_id(user_id).one(db).await? {
            return Ok(CoinBalance::from(&account));
        }

        let txn = db.begin().await?;
        let created = Self::ensure_account(&txn, user_id).await?;
        let mut bonus = None;
        if created && self.signup_bonus > 0 {
            let entry = LedgerEntry::credit(
                user_id,
                TransactionType::Bonus,
                self.signup_bonus,
                "Signup bonus",
                None,
            );
            bonus = Some(self.apply(&txn, &entry).await?);
        }
        let account = CoinAccountEntity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!("coin account {} missing after insert", user_id))
            })?;
        txn.commit().await?;

        if let Some(tx) = bonus {
            info!(%user_id, amount = tx.amount, "wallet provisioned with signup bonus");
            self.publish_transaction(&tx).await;
        }
        Ok(CoinBalance::from(&account))
    }

    /// Inserts a zero-balance account unless one exists. Returns true if this call created it.
    pub async fn ensure_account<C: ConnectionTrait>(
        conn: &C,
        user_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let account = coin_account::ActiveModel {
            user_id: Set(user_id),
            balance: Set(0),
            total_earned: Set(0),
            total_spent: Set(0),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = CoinAccountEntity::insert(account)
            .on_conflict(
                OnConflict::column(coin_account::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(inserted > 0)
    }

    /// Appends one ledger entry inside `conn` and returns the stored row.
    ///
    /// Credits create the account if it is missing. Spends never do: a
    /// missing account has nothing to spend.
    pub async fn apply<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry: &LedgerEntry,
    ) -> Result<coin_transaction::Model, ServiceError> {
        if entry.amount <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "amount must be positive, got {}",
                entry.amount
            )));
        }
        let is_credit = entry.transaction_type.is_credit();

        for attempt in 1..=self.max_retries {
            let account = match CoinAccountEntity::find_by_id(entry.user_id).one(conn).await? {
                Some(account) => account,
                None if is_credit => {
                    Self::ensure_account(conn, entry.user_id).await?;
                    load_account(conn, entry.user_id).await?
                }
                None => {
                    return Err(ServiceError::InsufficientBalance {
                        required: entry.amount,
                        available: 0,
                    })
                }
            };

            let (signed, balance_after, total_earned, total_spent) = if is_credit {
                let after = account.balance.checked_add(entry.amount).ok_or_else(overflow)?;
                let earned = account
                    .total_earned
                    .checked_add(entry.amount)
                    .ok_or_else(overflow)?;
                (entry.amount, after, earned, account.total_spent)
            } else {
                if account.balance < entry.amount {
                    return Err(ServiceError::InsufficientBalance {
                        required: entry.amount,
                        available: account.balance,
                    });
                }
                let spent = account
                    .total_spent
                    .checked_add(entry.amount)
                    .ok_or_else(overflow)?;
                (
                    -entry.amount,
                    account.balance - entry.amount,
                    account.total_earned,
                    spent,
                )
            };

            let now = Utc::now();
            let sequence = account.version + 1;
            let updated = CoinAccountEntity::update_many()
                .col_expr(coin_account::Column::Balance, Expr::value(balance_after))
                .col_expr(coin_account::Column::TotalEarned, Expr::value(total_earned))
                .col_expr(coin_account::Column::TotalSpent, Expr::value(total_spent))
                .col_expr(coin_account::Column::Version, Expr::value(sequence))
                .col_expr(coin_account::Column::UpdatedAt, Expr::value(now))
                .filter(coin_account::Column::UserId.eq(entry.user_id))
                .filter(coin_account::Column::Version.eq(account.version))
                .exec(conn)
                .await?;

            if updated.rows_affected == 0 {
                counter!("coin_commerce.ledger.version_conflicts", 1);
                debug!(user_id = %entry.user_id, attempt, "coin account changed underneath, retrying");
                continue;
            }

            let transaction = coin_transaction::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(entry.user_id),
                sequence: Set(sequence),
                transaction_type: Set(entry.transaction_type),
                amount: Set(signed),
                reason: Set(entry.reason.clone()),
                balance_before: Set(account.balance),
                balance_after: Set(balance_after),
                related_id: Set(entry.related_id),
                created_at: Set(now),
            }
            .insert(conn)
            .await?;

            if is_credit {
                counter!("coin_commerce.coins.credited", entry.amount as u64);
            } else {
                counter!("coin_commerce.coins.spent", entry.amount as u64);
            }
            return Ok(transaction);
        }

        warn!(user_id = %entry.user_id, retries = self.max_retries, "giving up on contended coin account");
        Err(ServiceError::Conflict(
            "coin balance is being updated concurrently, retry the request".to_string(),
        ))
    }

    /// Debits inside the caller's unit of work. Fails without mutation when funds are short.
    #[instrument(skip(self, conn, reason))]
    pub async fn spend_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        amount: i64,
        reason: &str,
        related_id: Option<Uuid>,
    ) -> Result<coin_transaction::Model, ServiceError> {
        self.apply(conn, &LedgerEntry::spend(user_id, amount, reason, related_id))
            .await
    }

    /// Debits as its own unit of work.
    #[instrument(skip(self, reason))]
    pub async fn spend(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: &str,
        related_id: Option<Uuid>,
    ) -> Result<SpendReceipt, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let transaction = self
            .spend_in(&txn, user_id, amount, reason, related_id)
            .await?;
        txn.commit().await?;

        self.publish_transaction(&transaction).await;
        Ok(SpendReceipt {
            transaction_id: transaction.id,
            new_balance: transaction.balance_after,
        })
    }

    /// Returns coins to a wallet as a REFUND credit.
    #[instrument(skip(self, reason))]
    pub async fn refund(
        &self,
        user_id: Uuid,
        amount: i64,
        reason: &str,
        related_id: Option<Uuid>,
    ) -> Result<coin_transaction::Model, ServiceError> {
        let entry = LedgerEntry::credit(user_id, TransactionType::Refund, amount, reason, related_id);
        let txn = self.db_pool.begin().await?;
        let transaction = self.apply(&txn, &entry).await?;
        txn.commit().await?;

        self.publish_transaction(&transaction).await;
        Ok(transaction)
    }

    /// Newest-first page of a user's ledger, plus the total entry count.
    pub async fn history(
        &self,
        user_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<coin_transaction::Model>, u64), ServiceError> {
        let paginator = CoinTransactionEntity::find()
            .filter(coin_transaction::Column::UserId.eq(user_id))
            .order_by_desc(coin_transaction::Column::Sequence)
            .paginate(&*self.db_pool, per_page.max(1));

        let total = paginator.num_items().await?;
        let transactions = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((transactions, total))
    }

    /// Replays the whole chain and checks it against the account row.
    ///
    /// Any mismatch is reported as `LedgerCorruption` and left untouched.
    #[instrument(skip(self))]
    pub async fn verify(&self, user_id: Uuid) -> Result<LedgerAudit, ServiceError> {
        let db = &*self.db_pool;
        let account = CoinAccountEntity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coin account {} not found", user_id)))?;
        let transactions = CoinTransactionEntity::find()
            .filter(coin_transaction::Column::UserId.eq(user_id))
            .order_by_asc(coin_transaction::Column::Sequence)
            .all(db)
            .await?;

        audit_chain(&account, &transactions).map_err(|detail| {
            error!(%user_id, detail = %detail, "coin ledger corruption detected");
            counter!("coin_commerce.ledger.corruption_detected", 1);
            ServiceError::LedgerCorruption(format!("user {}: {}", user_id, detail))
        })
    }

    pub(crate) async fn publish_transaction(&self, transaction: &coin_transaction::Model) {
        let event = if transaction.transaction_type.is_credit() {
            Event::CoinsCredited {
                user_id: transaction.user_id,
                amount: transaction.amount,
                balance_after: transaction.balance_after,
                related_id: transaction.related_id,
            }
        } else {
            Event::CoinsSpent {
                user_id: transaction.user_id,
                amount: -transaction.amount,
                balance_after: transaction.balance_after,
                related_id: transaction.related_id,
            }
        };
        publish(self.event_sender.as_deref(), event).await;
    }
}

async fn load_account<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<coin_account::Model, ServiceError> {
    CoinAccountEntity::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::InternalError(format!("coin account {} missing after insert", user_id)))
}

fn overflow() -> ServiceError {
    ServiceError::ValidationError("coin amount overflows the wallet".to_string())
}

/// Walks the ledger from an empty wallet. Returns a description of the first broken link.
pub fn audit_chain(
    account: &coin_account::Model,
    transactions: &[coin_transaction::Model],
) -> Result<LedgerAudit, String> {
    let mut running = 0i64;
    let mut earned = 0i64;
    let mut spent = 0i64;

    for (index, tx) in transactions.iter().enumerate() {
        let expected_sequence = index as i64 + 1;
        if tx.sequence != expected_sequence {
            return Err(format!(
                "entry {} has sequence {}, expected {}",
                tx.id, tx.sequence, expected_sequence
            ));
        }
        if tx.balance_before != running {
            return Err(format!(
                "entry {} starts at {}, previous entry ended at {}",
                tx.id, tx.balance_before, running
            ));
        }
        if tx.balance_after != tx.balance_before + tx.amount {
            return Err(format!(
                "entry {} does not add up: {} + {} != {}",
                tx.id, tx.balance_before, tx.amount, tx.balance_after
            ));
        }
        match (tx.transaction_type.is_credit(), tx.amount) {
            (true, amount) if amount > 0 => earned += amount,
            (false, amount) if amount < 0 => spent -= amount,
            (_, amount) => {
                return Err(format!(
                    "entry {} is {} with amount {}",
                    tx.id, tx.transaction_type, amount
                ))
            }
        }
        if tx.balance_after < 0 {
            return Err(format!("entry {} leaves a negative balance", tx.id));
        }
        running = tx.balance_after;
    }

    if account.balance != running
        || account.total_earned != earned
        || account.total_spent != spent
        || account.balance != account.total_earned - account.total_spent
    {
        return Err(format!(
            "account shows balance {} (earned {}, spent {}), ledger replays to {} (earned {}, spent {})",
            account.balance, account.total_earned, account.total_spent, running, earned, spent
        ));
    }
    if account.version != transactions.len() as i64 {
        return Err(format!(
            "account version {} but {} ledger entries",
            account.version,
            transactions.len()
        ));
    }

    Ok(LedgerAudit {
        user_id: account.user_id,
        entries: transactions.len() as u64,
        balance: running,
        total_earned: earned,
        total_spent: spent,
    })
}
