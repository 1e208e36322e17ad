use thiserror::Error;

use crate::db::WatchlistRow;
use crate::domain::{SeriesId, UserId};
use crate::services::fence::Fenced;

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Watchlist limit of {limit} series reached")]
    LimitReached { limit: u64 },

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for WatchlistError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for WatchlistError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

impl From<Fenced> for WatchlistError {
    fn from(err: Fenced) -> Self {
        Self::Fatal(err.to_string())
    }
}

#[async_trait::async_trait]
pub trait WatchlistService: Send + Sync {
    /// Adds a series to the user's watchlist. Returns false if it was already
    /// there.
    ///
    /// # Errors
    ///
    /// - Returns [`WatchlistError::NotFound`] if the series does not exist
    /// - Returns [`WatchlistError::LimitReached`] when the watchlist is full
    async fn watch(&self, user: UserId, series: SeriesId) -> Result<bool, WatchlistError>;

    /// Returns false if the series was not on the watchlist.
    ///
    /// # Errors
    ///
    /// Returns [`WatchlistError::Database`] on connection failures.
    async fn unwatch(&self, user: UserId, series: SeriesId) -> Result<bool, WatchlistError>;

    /// # Errors
    ///
    /// Returns [`WatchlistError::Database`] on connection failures.
    async fn watchlist(&self, user: UserId) -> Result<Vec<WatchlistRow>, WatchlistError>;

    /// Turns new-episode notifications on or off for the user.
    ///
    /// # Errors
    ///
    /// Returns [`WatchlistError::Database`] on connection failures.
    async fn set_notifications(&self, user: UserId, enabled: bool) -> Result<(), WatchlistError>;
}
