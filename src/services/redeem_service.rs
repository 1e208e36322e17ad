use thiserror::Error;

use crate::domain::UserId;
use crate::models::redeem::{IssuedLink, RedeemLink, Redemption};
use crate::services::fence::Fenced;
use crate::services::ledger_service::LedgerError;

#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("Redeem link not found")]
    NotFound,

    #[error("Redeem link expired")]
    Expired,

    #[error("Redeem link already completed")]
    AlreadyCompleted,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for RedeemError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for RedeemError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

impl From<Fenced> for RedeemError {
    fn from(err: Fenced) -> Self {
        Self::Fatal(err.to_string())
    }
}

impl From<LedgerError> for RedeemError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Fatal(msg) => Self::Fatal(msg),
            other => Self::Database(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
pub trait RedeemService: Send + Sync {
    /// Creates a pending link for `user` and returns it with its shortened URL.
    ///
    /// # Errors
    ///
    /// - Returns [`RedeemError::RateLimited`] if the user already has a live
    ///   pending link or hit the daily limit
    ///
    /// A failing or slow shortener does not fail the call; the long link is
    /// handed out as the short URL instead.
    async fn issue(&self, user: UserId) -> Result<IssuedLink, RedeemError>;

    /// Completion callback. Credits the generating user exactly once. When
    /// the callback names the `claimant` who opened the link, it is recorded
    /// and, unless it is the link's own creator, credited the joining bonus
    /// once.
    ///
    /// # Errors
    ///
    /// - Returns [`RedeemError::NotFound`] for an unknown token
    /// - Returns [`RedeemError::Expired`] if the link's expiry has passed
    /// - Returns [`RedeemError::AlreadyCompleted`] if it was already redeemed
    async fn resolve(&self, token: &str, claimant: Option<UserId>) -> Result<Redemption, RedeemError>;

    /// The link with its state evaluated at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`RedeemError::NotFound`] for an unknown token.
    async fn link_status(&self, token: &str) -> Result<RedeemLink, RedeemError>;

    /// Deletes unredeemed links that expired more than the grace window ago.
    ///
    /// # Errors
    ///
    /// Returns [`RedeemError::Database`] on connection failures.
    async fn compact_expired(&self) -> Result<u64, RedeemError>;
}
