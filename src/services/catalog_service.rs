//! Content catalog: the series → season → episode → variant tree and its
//! publish lifecycle.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::events::{CatalogEvent, EpisodePublished};
use crate::domain::{EpisodeId, Page, SeasonId, SeriesId, VariantId};
use crate::models::catalog::{
    CatalogFilter, Episode, EpisodeInput, FileVariant, LatestEpisode, Season, Series, SeriesInput,
    VariantInput,
};
use crate::services::fence::Fenced;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Episode {episode_id} is not released until {release_at}")]
    NotYetReleased {
        episode_id: EpisodeId,
        release_at: DateTime<Utc>,
    },

    #[error("Invalid catalog data: {0}")]
    InvalidData(String),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl CatalogError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }
}

impl From<sea_orm::DbErr> for CatalogError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for CatalogError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

impl From<Fenced> for CatalogError {
    fn from(err: Fenced) -> Self {
        Self::Fatal(err.to_string())
    }
}

/// Result of [`CatalogService::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// This call flipped the episode to published and emitted the event.
    Published(EpisodePublished),
    /// The episode was already published; nothing happened.
    AlreadyPublished,
}

#[async_trait::async_trait]
pub trait CatalogService: Send + Sync {
    /// # Errors
    ///
    /// - Returns [`CatalogError::Conflict`] if the title is taken
    /// - Returns [`CatalogError::InvalidData`] for an empty title
    async fn create_series(&self, input: SeriesInput) -> Result<Series, CatalogError>;

    /// # Errors
    ///
    /// - Returns [`CatalogError::NotFound`] if the series does not exist
    /// - Returns [`CatalogError::Conflict`] if the new title is taken
    async fn update_series(&self, id: SeriesId, input: SeriesInput) -> Result<Series, CatalogError>;

    /// # Errors
    ///
    /// - Returns [`CatalogError::NotFound`] if the series does not exist
    /// - Returns [`CatalogError::Conflict`] if the number is taken in that series
    async fn create_season(&self, series_id: SeriesId, number: i32) -> Result<Season, CatalogError>;

    /// # Errors
    ///
    /// - Returns [`CatalogError::NotFound`] if the season does not exist
    /// - Returns [`CatalogError::Conflict`] if the number is taken in that series
    async fn update_season(&self, id: SeasonId, number: i32) -> Result<Season, CatalogError>;

    /// # Errors
    ///
    /// - Returns [`CatalogError::NotFound`] if the season does not exist
    /// - Returns [`CatalogError::Conflict`] if the number is taken in that season
    async fn create_episode(&self, input: EpisodeInput) -> Result<Episode, CatalogError>;

    /// Changes number, release time and auto-publish flag. The parent season
    /// is fixed.
    ///
    /// # Errors
    ///
    /// - Returns [`CatalogError::NotFound`] if the episode does not exist
    /// - Returns [`CatalogError::Conflict`] if the number is taken in that season
    async fn update_episode(
        &self,
        id: EpisodeId,
        number: i32,
        release_at: DateTime<Utc>,
        auto_publish: bool,
    ) -> Result<Episode, CatalogError>;

    /// # Errors
    ///
    /// - Returns [`CatalogError::NotFound`] if the episode does not exist
    /// - Returns [`CatalogError::Conflict`] on a duplicate quality/audio/subtitle combination
    async fn create_variant(&self, input: VariantInput) -> Result<FileVariant, CatalogError>;

    /// The parent episode is fixed; `input.episode_id` is ignored.
    ///
    /// # Errors
    ///
    /// - Returns [`CatalogError::NotFound`] if the variant does not exist
    /// - Returns [`CatalogError::Conflict`] on a duplicate quality/audio/subtitle combination
    async fn update_variant(&self, id: VariantId, input: VariantInput) -> Result<FileVariant, CatalogError>;

    /// Makes the episode visible and emits `EpisodePublished` exactly once.
    /// Publishing an already published episode is a no-op.
    ///
    /// # Errors
    ///
    /// - Returns [`CatalogError::NotFound`] if the episode does not exist
    /// - Returns [`CatalogError::NotYetReleased`] if its release time is in the future
    async fn publish(&self, id: EpisodeId) -> Result<PublishOutcome, CatalogError>;

    /// Hides a published episode again. Returns false if it was not published.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the episode does not exist.
    async fn unpublish(&self, id: EpisodeId) -> Result<bool, CatalogError>;

    /// Publishes every auto-publish episode whose release time has passed.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] on connection failures.
    async fn publish_due(&self) -> Result<Vec<EpisodeId>, CatalogError>;

    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the series does not exist.
    async fn get_series(&self, id: SeriesId) -> Result<Series, CatalogError>;

    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the season does not exist.
    async fn get_season(&self, id: SeasonId) -> Result<Season, CatalogError>;

    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the episode does not exist.
    async fn get_episode(&self, id: EpisodeId) -> Result<Episode, CatalogError>;

    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the variant does not exist.
    async fn get_variant(&self, id: VariantId) -> Result<FileVariant, CatalogError>;

    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the series does not exist.
    async fn seasons(&self, series_id: SeriesId) -> Result<Vec<Season>, CatalogError>;

    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the season does not exist.
    async fn episodes(&self, season_id: SeasonId) -> Result<Vec<Episode>, CatalogError>;

    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the episode does not exist.
    async fn variants(&self, episode_id: EpisodeId) -> Result<Vec<FileVariant>, CatalogError>;

    /// Newest published episodes. `None` uses the configured count.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] on connection failures.
    async fn list_latest(&self, limit: Option<u64>) -> Result<Vec<LatestEpisode>, CatalogError>;

    /// Series by popularity. `None` uses the configured count.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] on connection failures.
    async fn list_popular(&self, limit: Option<u64>) -> Result<Vec<Series>, CatalogError>;

    /// Zero-based page of series matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] on connection failures.
    async fn list(&self, filter: CatalogFilter, page: u64) -> Result<Page<Series>, CatalogError>;

    /// Title search through the search index, best match first.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] on connection failures.
    async fn search(&self, text: &str) -> Result<Vec<Series>, CatalogError>;

    /// Bumps the series popularity counter after a download.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] on connection failures.
    async fn increment_popularity(&self, id: SeriesId) -> Result<(), CatalogError>;

    /// Rebuilds the search index from the store.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] on connection failures.
    async fn rebuild_search_index(&self) -> Result<usize, CatalogError>;

    fn subscribe(&self) -> broadcast::Receiver<CatalogEvent>;
}
