use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::debug;

use crate::domain::{LedgerCause, UserId};
use crate::entities::{ledger_transactions, prelude::*, token_accounts};
use crate::models::ledger::LedgerEntry;

/// Raw account row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub user_id: UserId,
    pub balance: i64,
    pub premium_until: Option<DateTime<Utc>>,
    pub watchlist_notifications: bool,
    pub created_at: DateTime<Utc>,
}

impl From<token_accounts::Model> for AccountSnapshot {
    fn from(model: token_accounts::Model) -> Self {
        Self {
            user_id: UserId::new(model.user_id),
            balance: model.balance,
            premium_until: model.premium_until,
            watchlist_notifications: model.watchlist_notifications,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied(LedgerEntry),
    /// The idempotency key was already used; the original entry is returned.
    Replayed(LedgerEntry),
    /// The guarded update matched no row; nothing was written.
    Insufficient { balance: i64 },
}

pub struct LedgerRepository {
    conn: DatabaseConnection,
}

impl LedgerRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_entry(model: ledger_transactions::Model) -> Result<LedgerEntry> {
        let cause = model
            .cause
            .parse::<LedgerCause>()
            .with_context(|| format!("Corrupt cause on ledger transaction {}", model.id))?;
        Ok(LedgerEntry {
            id: model.id,
            user_id: UserId::new(model.user_id),
            delta: model.delta,
            cause,
            idempotency_key: model.idempotency_key,
            balance_after: model.balance_after,
            created_at: model.created_at,
        })
    }

    async fn ensure_account_on<C: ConnectionTrait>(
        conn: &C,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let account = token_accounts::ActiveModel {
            user_id: Set(user.value()),
            balance: Set(0),
            premium_until: Set(None),
            watchlist_notifications: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        TokenAccounts::insert(account)
            .on_conflict(
                OnConflict::column(token_accounts::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    /// Creates an empty account if none exists. Returns true when created.
    pub async fn ensure_account(&self, user: UserId, now: DateTime<Utc>) -> Result<bool> {
        let existed = TokenAccounts::find_by_id(user.value())
            .one(&self.conn)
            .await?
            .is_some();
        if !existed {
            Self::ensure_account_on(&self.conn, user, now).await?;
        }
        Ok(!existed)
    }

    pub async fn get_account(&self, user: UserId) -> Result<Option<AccountSnapshot>> {
        let model = TokenAccounts::find_by_id(user.value())
            .one(&self.conn)
            .await
            .context("Failed to load token account")?;
        Ok(model.map(AccountSnapshot::from))
    }

    pub async fn find_by_key(&self, key: &str) -> Result<Option<LedgerEntry>> {
        let model = LedgerTransactions::find()
            .filter(ledger_transactions::Column::IdempotencyKey.eq(key))
            .one(&self.conn)
            .await?;
        model.map(Self::map_entry).transpose()
    }

    /// Applies `delta` to the user's balance and appends the transaction as a
    /// single database transaction.
    ///
    /// The account row is written first so the transaction holds the write
    /// lock before it reads anything. The balance update is guarded by
    /// `balance + delta >= 0`; when that guard rejects the update nothing is
    /// written and `Insufficient` is returned.
    pub async fn apply(
        &self,
        user: UserId,
        delta: i64,
        cause: LedgerCause,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<ApplyOutcome> {
        let floor = delta
            .checked_neg()
            .with_context(|| format!("Ledger delta {delta} is out of range"))?;
        let txn = self.conn.begin().await?;

        Self::ensure_account_on(&txn, user, now).await?;

        if let Some(existing) = LedgerTransactions::find()
            .filter(ledger_transactions::Column::IdempotencyKey.eq(key))
            .one(&txn)
            .await?
        {
            txn.commit().await?;
            debug!(key, "Idempotency key already applied");
            return Ok(ApplyOutcome::Replayed(Self::map_entry(existing)?));
        }

        let updated = TokenAccounts::update_many()
            .col_expr(
                token_accounts::Column::Balance,
                Expr::col(token_accounts::Column::Balance).add(delta),
            )
            .col_expr(token_accounts::Column::UpdatedAt, Expr::value(now))
            .filter(token_accounts::Column::UserId.eq(user.value()))
            .filter(token_accounts::Column::Balance.gte(floor))
            .exec(&txn)
            .await?;

        let account = TokenAccounts::find_by_id(user.value())
            .one(&txn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Token account {user} vanished inside transaction"))?;

        if updated.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(ApplyOutcome::Insufficient {
                balance: account.balance,
            });
        }

        let inserted = LedgerTransactions::insert(ledger_transactions::ActiveModel {
            user_id: Set(user.value()),
            delta: Set(delta),
            cause: Set(cause.as_str().to_string()),
            idempotency_key: Set(key.to_string()),
            balance_after: Set(account.balance),
            created_at: Set(now),
            ..Default::default()
        })
        .exec(&txn)
        .await
        .context("Failed to append ledger transaction")?;

        txn.commit().await?;

        Ok(ApplyOutcome::Applied(LedgerEntry {
            id: inserted.last_insert_id,
            user_id: user,
            delta,
            cause,
            idempotency_key: key.to_string(),
            balance_after: account.balance,
            created_at: now,
        }))
    }

    pub async fn set_premium(
        &self,
        user: UserId,
        until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Self::ensure_account_on(&self.conn, user, now).await?;
        TokenAccounts::update_many()
            .col_expr(token_accounts::Column::PremiumUntil, Expr::value(until))
            .col_expr(token_accounts::Column::UpdatedAt, Expr::value(now))
            .filter(token_accounts::Column::UserId.eq(user.value()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn set_notifications(
        &self,
        user: UserId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        Self::ensure_account_on(&self.conn, user, now).await?;
        TokenAccounts::update_many()
            .col_expr(
                token_accounts::Column::WatchlistNotifications,
                Expr::value(enabled),
            )
            .col_expr(token_accounts::Column::UpdatedAt, Expr::value(now))
            .filter(token_accounts::Column::UserId.eq(user.value()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    /// Users among `users` who switched new-episode notifications off.
    pub async fn muted_among(&self, users: &[i64]) -> Result<Vec<i64>> {
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let muted = TokenAccounts::find()
            .select_only()
            .column(token_accounts::Column::UserId)
            .filter(token_accounts::Column::UserId.is_in(users.to_vec()))
            .filter(token_accounts::Column::WatchlistNotifications.eq(false))
            .into_tuple::<i64>()
            .all(&self.conn)
            .await?;
        Ok(muted)
    }

    pub async fn history(&self, user: UserId, limit: u64) -> Result<Vec<LedgerEntry>> {
        let rows = LedgerTransactions::find()
            .filter(ledger_transactions::Column::UserId.eq(user.value()))
            .order_by_desc(ledger_transactions::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?;
        rows.into_iter().map(Self::map_entry).collect()
    }

    pub async fn ledger_sum(&self, user: UserId) -> Result<i64> {
        let sum = LedgerTransactions::find()
            .select_only()
            .column_as(ledger_transactions::Column::Delta.sum(), "total")
            .filter(ledger_transactions::Column::UserId.eq(user.value()))
            .into_tuple::<Option<i64>>()
            .one(&self.conn)
            .await?;
        Ok(sum.flatten().unwrap_or(0))
    }

    pub async fn count_accounts(&self) -> Result<u64> {
        Ok(TokenAccounts::find().count(&self.conn).await?)
    }

    pub async fn count_premium(&self, now: DateTime<Utc>) -> Result<u64> {
        Ok(TokenAccounts::find()
            .filter(token_accounts::Column::PremiumUntil.gt(now))
            .count(&self.conn)
            .await?)
    }

    pub async fn total_balance(&self) -> Result<i64> {
        let sum = TokenAccounts::find()
            .select_only()
            .column_as(token_accounts::Column::Balance.sum(), "total")
            .into_tuple::<Option<i64>>()
            .one(&self.conn)
            .await?;
        Ok(sum.flatten().unwrap_or(0))
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let mut removed = LedgerTransactions::delete_many()
            .exec(&self.conn)
            .await?
            .rows_affected;
        removed += TokenAccounts::delete_many()
            .exec(&self.conn)
            .await?
            .rows_affected;
        Ok(removed)
    }
}
