//! Token ledger: per-user balances, premium status and the append-only
//! transaction log.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{LedgerCause, UserId};
use crate::models::ledger::{ApplyReceipt, Balance, LedgerEntry, Reconciliation};
use crate::services::fence::Fenced;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("Invalid token amount: {0}")]
    InvalidAmount(i64),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for LedgerError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

impl From<Fenced> for LedgerError {
    fn from(err: Fenced) -> Self {
        Self::Fatal(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait LedgerService: Send + Sync {
    /// Creates the account and credits the welcome grant once.
    ///
    /// # Errors
    ///
    /// - Returns [`LedgerError::Fatal`] while the store is fenced for a wipe
    /// - Returns [`LedgerError::Database`] on connection failures
    async fn register_user(&self, user: UserId) -> Result<Balance, LedgerError>;

    /// Current balance and premium status. Unknown users read as an empty,
    /// non-premium account.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] on connection failures.
    async fn balance(&self, user: UserId) -> Result<Balance, LedgerError>;

    /// Applies a signed delta. Replaying an idempotency key returns the
    /// original entry and leaves the balance alone.
    ///
    /// # Errors
    ///
    /// - Returns [`LedgerError::InsufficientBalance`] if the balance would go negative
    /// - Returns [`LedgerError::InvalidAmount`] for a zero delta or `i64::MIN`
    /// - Returns [`LedgerError::Fatal`] while the store is fenced for a wipe
    async fn apply(
        &self,
        user: UserId,
        delta: i64,
        cause: LedgerCause,
        idempotency_key: &str,
    ) -> Result<ApplyReceipt, LedgerError>;

    /// Manual add (positive) or remove (negative). Without a key a fresh one
    /// is generated, so the call is not retry-safe.
    ///
    /// # Errors
    ///
    /// Same as [`LedgerService::apply`].
    async fn admin_adjust(
        &self,
        user: UserId,
        delta: i64,
        idempotency_key: Option<&str>,
    ) -> Result<ApplyReceipt, LedgerError>;

    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] on connection failures.
    async fn set_premium(&self, user: UserId, until: DateTime<Utc>) -> Result<Balance, LedgerError>;

    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] on connection failures.
    async fn revoke_premium(&self, user: UserId) -> Result<Balance, LedgerError>;

    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] on connection failures.
    async fn history(&self, user: UserId, limit: u64) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Compares the stored balance with the sum of the user's ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Database`] on connection failures.
    async fn reconcile(&self, user: UserId) -> Result<Reconciliation, LedgerError>;
}
