//! Download gate: the single place where tokens are exchanged for delivery
//! handles, plus the paid "request an anime" path.

use thiserror::Error;

use crate::domain::{Page, RequestId, RequestStatus, UserId, VariantId};
use crate::models::delivery::{Authorization, Delivery};
use crate::models::request::AnimeRequest;
use crate::services::fence::Fenced;
use crate::services::ledger_service::LedgerError;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Episode {0} is not published")]
    NotAvailable(String),

    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: i64, required: i64 },

    #[error("Quality {quality} requires premium")]
    PremiumRequired { quality: String },

    #[error("Delivery handle already consumed")]
    AlreadyConsumed,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for GateError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for GateError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

impl From<Fenced> for GateError {
    fn from(err: Fenced) -> Self {
        Self::Fatal(err.to_string())
    }
}

impl From<LedgerError> for GateError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { balance, required } => {
                Self::InsufficientBalance { balance, required }
            }
            LedgerError::InvalidAmount(amount) => Self::InvalidData(format!("token amount {amount}")),
            LedgerError::Fatal(msg) => Self::Fatal(msg),
            LedgerError::Database(msg) => Self::Database(msg),
        }
    }
}

#[async_trait::async_trait]
pub trait GateService: Send + Sync {
    /// Debits one token (or applies the premium bypass) and issues a one-time
    /// delivery handle. The same `nonce` always yields the same handle and a
    /// single debit.
    ///
    /// # Errors
    ///
    /// - Returns [`GateError::NotFound`] if the variant or its parents do not exist
    /// - Returns [`GateError::NotAvailable`] if the episode is not published
    /// - Returns [`GateError::PremiumRequired`] for premium-only qualities
    /// - Returns [`GateError::InsufficientBalance`] if the user has no tokens
    async fn authorize(
        &self,
        user: UserId,
        variant: VariantId,
        nonce: &str,
    ) -> Result<Authorization, GateError>;

    /// Redeems a handle for the file's storage reference. Works once.
    ///
    /// # Errors
    ///
    /// - Returns [`GateError::NotFound`] for an unknown handle
    /// - Returns [`GateError::AlreadyConsumed`] on the second call
    async fn consume_handle(&self, handle_id: &str) -> Result<Delivery, GateError>;

    /// Files a catalog addition request, charging non-premium users.
    ///
    /// # Errors
    ///
    /// - Returns [`GateError::InvalidData`] for an empty title
    /// - Returns [`GateError::InsufficientBalance`] if the user cannot pay
    async fn request_addition(
        &self,
        user: UserId,
        title: &str,
        language: Option<&str>,
        nonce: &str,
    ) -> Result<AnimeRequest, GateError>;

    /// # Errors
    ///
    /// Returns [`GateError::Database`] on connection failures.
    async fn pending_requests(&self, page: u64) -> Result<Page<AnimeRequest>, GateError>;

    /// # Errors
    ///
    /// - Returns [`GateError::NotFound`] for an unknown request
    /// - Returns [`GateError::InvalidData`] when resolving back to `Pending`
    async fn resolve_request(
        &self,
        id: RequestId,
        status: RequestStatus,
        notes: Option<&str>,
    ) -> Result<AnimeRequest, GateError>;
}
