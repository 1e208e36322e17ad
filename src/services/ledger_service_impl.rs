//! `SeaORM` implementation of the `LedgerService` trait.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::{ApplyOutcome, Store, is_unique_violation};
use crate::domain::{Clock, LedgerCause, UserId};
use crate::models::ledger::{ApplyReceipt, Balance, LedgerEntry, Reconciliation};
use crate::services::fence::OperationFence;
use crate::services::ledger_service::{LedgerError, LedgerService};
use crate::services::locks::KeyedLocks;

pub(crate) fn user_lock_key(user: UserId) -> String {
    format!("ledger:{user}")
}

/// The unfenced write path shared by the ledger, the redeem manager and the
/// download gate. Callers hold the operation fence themselves.
pub struct LedgerWriter {
    store: Arc<Store>,
    locks: Arc<KeyedLocks>,
    clock: Arc<dyn Clock>,
}

impl LedgerWriter {
    #[must_use]
    pub fn new(store: Arc<Store>, locks: Arc<KeyedLocks>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            locks,
            clock,
        }
    }

    /// Serialized per user; the balance check and write happen in one
    /// database transaction.
    pub async fn apply(
        &self,
        user: UserId,
        delta: i64,
        cause: LedgerCause,
        key: &str,
    ) -> Result<ApplyReceipt, LedgerError> {
        // i64::MIN has no negation for the balance guard.
        if delta == 0 || delta == i64::MIN {
            return Err(LedgerError::InvalidAmount(delta));
        }

        let _guard = self.locks.lock(user_lock_key(user)).await;
        let repo = self.store.ledger_repo();

        let outcome = match repo.apply(user, delta, cause, key, self.clock.now()).await {
            Ok(outcome) => outcome,
            Err(e) if is_unique_violation(&e) => {
                // Another writer committed the same key first.
                let existing = repo
                    .find_by_key(key)
                    .await?
                    .ok_or_else(|| LedgerError::Database(format!("{e:#}")))?;
                ApplyOutcome::Replayed(existing)
            }
            Err(e) => return Err(e.into()),
        };

        match outcome {
            ApplyOutcome::Applied(entry) => {
                metrics::counter!("ledger_applied_total", "cause" => cause.as_str()).increment(1);
                info!(
                    user_id = %user,
                    delta,
                    cause = cause.as_str(),
                    key,
                    balance = entry.balance_after,
                    "Ledger transaction applied"
                );
                Ok(ApplyReceipt {
                    entry,
                    replayed: false,
                })
            }
            ApplyOutcome::Replayed(entry) => {
                debug!(user_id = %user, key, "Ledger apply replayed");
                Ok(ApplyReceipt {
                    entry,
                    replayed: true,
                })
            }
            ApplyOutcome::Insufficient { balance } => {
                debug!(user_id = %user, balance, delta, "Ledger apply rejected");
                Err(LedgerError::InsufficientBalance {
                    balance,
                    required: delta.saturating_neg(),
                })
            }
        }
    }

    pub async fn balance(&self, user: UserId) -> Result<Balance, LedgerError> {
        let now = self.clock.now();
        let account = self.store.ledger_repo().get_account(user).await?;

        Ok(account.map_or(
            Balance {
                user_id: user,
                balance: 0,
                premium_until: None,
                premium: false,
            },
            |a| Balance {
                user_id: user,
                balance: a.balance,
                premium_until: a.premium_until,
                premium: is_premium_at(a.premium_until, now),
            },
        ))
    }

    pub async fn is_premium(&self, user: UserId) -> Result<bool, LedgerError> {
        Ok(self.balance(user).await?.premium)
    }
}

/// Premium is active while `premium_until` lies in the future.
#[must_use]
pub fn is_premium_at(premium_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    premium_until.is_some_and(|until| until > now)
}

pub struct SeaOrmLedgerService {
    store: Arc<Store>,
    writer: Arc<LedgerWriter>,
    fence: OperationFence,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<Config>>,
}

impl SeaOrmLedgerService {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        writer: Arc<LedgerWriter>,
        fence: OperationFence,
        clock: Arc<dyn Clock>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            store,
            writer,
            fence,
            clock,
            config,
        }
    }
}

#[async_trait::async_trait]
impl LedgerService for SeaOrmLedgerService {
    async fn register_user(&self, user: UserId) -> Result<Balance, LedgerError> {
        let _fence = self.fence.enter().await?;
        let welcome = self.config.read().await.tokens.welcome_tokens;

        let created = self
            .store
            .ledger_repo()
            .ensure_account(user, self.clock.now())
            .await?;
        if created {
            info!(user_id = %user, "Token account created");
        }

        if welcome > 0 {
            self.writer
                .apply(user, welcome, LedgerCause::Welcome, &format!("welcome:{user}"))
                .await?;
        }

        self.writer.balance(user).await
    }

    async fn balance(&self, user: UserId) -> Result<Balance, LedgerError> {
        self.writer.balance(user).await
    }

    async fn apply(
        &self,
        user: UserId,
        delta: i64,
        cause: LedgerCause,
        idempotency_key: &str,
    ) -> Result<ApplyReceipt, LedgerError> {
        let _fence = self.fence.enter().await?;
        self.writer.apply(user, delta, cause, idempotency_key).await
    }

    async fn admin_adjust(
        &self,
        user: UserId,
        delta: i64,
        idempotency_key: Option<&str>,
    ) -> Result<ApplyReceipt, LedgerError> {
        let cause = if delta > 0 {
            LedgerCause::AdminGrant
        } else {
            LedgerCause::AdminRevoke
        };
        let key = idempotency_key.map_or_else(
            || format!("{}:{}:{}", cause.as_str(), user, uuid::Uuid::new_v4()),
            ToString::to_string,
        );

        self.apply(user, delta, cause, &key).await
    }

    async fn set_premium(&self, user: UserId, until: DateTime<Utc>) -> Result<Balance, LedgerError> {
        let _fence = self.fence.enter().await?;
        self.store
            .ledger_repo()
            .set_premium(user, Some(until), self.clock.now())
            .await?;
        info!(user_id = %user, until = %until, "Premium granted");
        self.writer.balance(user).await
    }

    async fn revoke_premium(&self, user: UserId) -> Result<Balance, LedgerError> {
        let _fence = self.fence.enter().await?;
        self.store
            .ledger_repo()
            .set_premium(user, None, self.clock.now())
            .await?;
        info!(user_id = %user, "Premium revoked");
        self.writer.balance(user).await
    }

    async fn history(&self, user: UserId, limit: u64) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.ledger_repo().history(user, limit).await?)
    }

    async fn reconcile(&self, user: UserId) -> Result<Reconciliation, LedgerError> {
        let repo = self.store.ledger_repo();
        let _guard = self.writer.locks.lock(user_lock_key(user)).await;
        let balance = repo.get_account(user).await?.map_or(0, |a| a.balance);
        let ledger_sum = repo.ledger_sum(user).await?;

        Ok(Reconciliation {
            user_id: user,
            balance,
            ledger_sum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn premium_boundary_is_exclusive() {
        let now = Utc::now();
        assert!(!is_premium_at(None, now));
        assert!(!is_premium_at(Some(now), now));
        assert!(!is_premium_at(Some(now - Duration::seconds(1)), now));
        assert!(is_premium_at(Some(now + Duration::seconds(1)), now));
    }

    #[test]
    fn insufficient_balance_message() {
        let err = LedgerError::InsufficientBalance {
            balance: 0,
            required: 1,
        };
        assert_eq!(err.to_string(), "Insufficient balance: have 0, need 1");
    }
}
