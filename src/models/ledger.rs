use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{LedgerCause, UserId};

/// Snapshot returned by `balance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub user_id: UserId,
    pub balance: i64,
    pub premium_until: Option<DateTime<Utc>>,
    pub premium: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    pub delta: i64,
    pub cause: LedgerCause,
    pub idempotency_key: String,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of a ledger apply. `replayed` is set when the idempotency key had
/// already been used and the stored entry is returned unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReceipt {
    pub entry: LedgerEntry,
    pub replayed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub user_id: UserId,
    pub balance: i64,
    pub ledger_sum: i64,
}

impl Reconciliation {
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.balance == self.ledger_sum
    }
}
