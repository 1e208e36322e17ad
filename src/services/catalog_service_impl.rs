//! `SeaORM` implementation of the `CatalogService` trait.
//!
//! Uniqueness keys are checked up front for a readable error and enforced
//! again by unique indexes, so a racing writer still gets `Conflict`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::clients::SearchIndex;
use crate::config::Config;
use crate::db::{Store, is_unique_violation};
use crate::domain::events::{CatalogEvent, EpisodePublished};
use crate::domain::{Clock, EpisodeId, Page, SeasonId, SeriesId, VariantId};
use crate::models::catalog::{
    CatalogFilter, Episode, EpisodeInput, FileVariant, LatestEpisode, Season, Series, SeriesInput,
    VariantInput,
};
use crate::services::catalog_service::{CatalogError, CatalogService, PublishOutcome};
use crate::services::fence::OperationFence;

fn conflict_or(err: anyhow::Error, what: impl FnOnce() -> String) -> CatalogError {
    if is_unique_violation(&err) {
        CatalogError::Conflict(what())
    } else {
        err.into()
    }
}

fn validate_series(input: &SeriesInput) -> Result<(), CatalogError> {
    if input.title.trim().is_empty() {
        return Err(CatalogError::InvalidData("series title is empty".to_string()));
    }
    if !(1900..=2200).contains(&input.release_year) {
        return Err(CatalogError::InvalidData(format!(
            "release year {} out of range",
            input.release_year
        )));
    }
    Ok(())
}

fn validate_variant(input: &VariantInput) -> Result<(), CatalogError> {
    if input.quality.trim().is_empty() || input.storage_ref.trim().is_empty() {
        return Err(CatalogError::InvalidData(
            "variant quality and storage reference are required".to_string(),
        ));
    }
    Ok(())
}

pub struct SeaOrmCatalogService {
    store: Arc<Store>,
    search: Arc<dyn SearchIndex>,
    fence: OperationFence,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<Config>>,
    event_bus: broadcast::Sender<CatalogEvent>,
}

impl SeaOrmCatalogService {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        search: Arc<dyn SearchIndex>,
        fence: OperationFence,
        clock: Arc<dyn Clock>,
        config: Arc<RwLock<Config>>,
        event_bus: broadcast::Sender<CatalogEvent>,
    ) -> Self {
        Self {
            store,
            search,
            fence,
            clock,
            config,
            event_bus,
        }
    }

    async fn require_series(&self, id: SeriesId) -> Result<Series, CatalogError> {
        self.store
            .catalog_repo()
            .get_series(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("series", id))
    }

    async fn require_season(&self, id: SeasonId) -> Result<Season, CatalogError> {
        self.store
            .catalog_repo()
            .get_season(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("season", id))
    }

    async fn require_episode(&self, id: EpisodeId) -> Result<Episode, CatalogError> {
        self.store
            .catalog_repo()
            .get_episode(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("episode", id))
    }

    /// Builds the event payload for a just-published episode.
    async fn published_event(
        &self,
        episode: &Episode,
        published_at: DateTime<Utc>,
    ) -> Result<EpisodePublished, CatalogError> {
        let series = self.require_series(episode.series_id).await?;
        let season = self.require_season(episode.season_id).await?;

        Ok(EpisodePublished {
            series_id: series.id,
            series_title: series.title,
            season_number: season.number,
            episode_id: episode.id,
            episode_number: episode.number,
            published_at,
        })
    }

    fn emit(&self, event: CatalogEvent) {
        // No receivers is fine; dispatch recovery picks the episode up later.
        if self.event_bus.send(event).is_err() {
            debug!("No catalog event subscribers");
        }
    }
}

#[async_trait::async_trait]
impl CatalogService for SeaOrmCatalogService {
    async fn create_series(&self, input: SeriesInput) -> Result<Series, CatalogError> {
        validate_series(&input)?;
        let _fence = self.fence.enter().await?;
        let repo = self.store.catalog_repo();

        if repo.series_title_exists(&input.title, None).await? {
            return Err(CatalogError::Conflict(format!(
                "series titled {:?} already exists",
                input.title
            )));
        }

        let series = repo.insert_series(&input, self.clock.now()).await?;
        self.search.reindex(series.id, &series.title);
        info!(series_id = %series.id, title = %series.title, "Series created");
        Ok(series)
    }

    async fn update_series(&self, id: SeriesId, input: SeriesInput) -> Result<Series, CatalogError> {
        validate_series(&input)?;
        let _fence = self.fence.enter().await?;
        let repo = self.store.catalog_repo();

        if repo.series_title_exists(&input.title, Some(id)).await? {
            return Err(CatalogError::Conflict(format!(
                "series titled {:?} already exists",
                input.title
            )));
        }

        let series = repo
            .update_series(id, &input, self.clock.now())
            .await?
            .ok_or_else(|| CatalogError::not_found("series", id))?;
        self.search.reindex(series.id, &series.title);
        info!(series_id = %id, "Series updated");
        Ok(series)
    }

    async fn create_season(&self, series_id: SeriesId, number: i32) -> Result<Season, CatalogError> {
        if number < 0 {
            return Err(CatalogError::InvalidData(format!("season number {number}")));
        }
        let _fence = self.fence.enter().await?;
        self.require_series(series_id).await?;
        let repo = self.store.catalog_repo();

        let conflict = || format!("season {number} already exists in series {series_id}");
        if repo.find_season(series_id, number).await?.is_some() {
            return Err(CatalogError::Conflict(conflict()));
        }

        let season = repo
            .insert_season(series_id, number, self.clock.now())
            .await
            .map_err(|e| conflict_or(e, conflict))?;
        info!(series_id = %series_id, season_id = %season.id, number, "Season created");
        Ok(season)
    }

    async fn update_season(&self, id: SeasonId, number: i32) -> Result<Season, CatalogError> {
        let _fence = self.fence.enter().await?;
        let current = self.require_season(id).await?;
        let repo = self.store.catalog_repo();

        let conflict = || format!("season {number} already exists in series {}", current.series_id);
        if repo
            .find_season(current.series_id, number)
            .await?
            .is_some_and(|other| other.id != id)
        {
            return Err(CatalogError::Conflict(conflict()));
        }

        repo.update_season_number(id, number)
            .await
            .map_err(|e| conflict_or(e, conflict))?
            .ok_or_else(|| CatalogError::not_found("season", id))
    }

    async fn create_episode(&self, input: EpisodeInput) -> Result<Episode, CatalogError> {
        let _fence = self.fence.enter().await?;
        let season = self.require_season(input.season_id).await?;
        let repo = self.store.catalog_repo();

        let conflict = || format!("episode {} already exists in season {}", input.number, season.id);
        if repo.find_episode(season.id, input.number).await?.is_some() {
            return Err(CatalogError::Conflict(conflict()));
        }

        let episode = repo
            .insert_episode(season.series_id, &input, self.clock.now())
            .await
            .map_err(|e| conflict_or(e, conflict))?;
        info!(
            episode_id = %episode.id,
            season_id = %season.id,
            number = episode.number,
            release_at = %episode.release_at,
            "Episode created"
        );
        Ok(episode)
    }

    async fn update_episode(
        &self,
        id: EpisodeId,
        number: i32,
        release_at: DateTime<Utc>,
        auto_publish: bool,
    ) -> Result<Episode, CatalogError> {
        let _fence = self.fence.enter().await?;
        let current = self.require_episode(id).await?;
        let repo = self.store.catalog_repo();

        let conflict = || format!("episode {number} already exists in season {}", current.season_id);
        if repo
            .find_episode(current.season_id, number)
            .await?
            .is_some_and(|other| other.id != id)
        {
            return Err(CatalogError::Conflict(conflict()));
        }

        repo.update_episode(id, number, release_at, auto_publish)
            .await
            .map_err(|e| conflict_or(e, conflict))?
            .ok_or_else(|| CatalogError::not_found("episode", id))
    }

    async fn create_variant(&self, input: VariantInput) -> Result<FileVariant, CatalogError> {
        validate_variant(&input)?;
        let _fence = self.fence.enter().await?;
        self.require_episode(input.episode_id).await?;
        let repo = self.store.catalog_repo();

        let conflict = || {
            format!(
                "variant {}/{}/{} already exists for episode {}",
                input.quality, input.audio_language, input.subtitle_language, input.episode_id
            )
        };
        if repo.find_variant(&input).await?.is_some() {
            return Err(CatalogError::Conflict(conflict()));
        }

        let variant = repo
            .insert_variant(&input, self.clock.now())
            .await
            .map_err(|e| conflict_or(e, conflict))?;
        info!(variant_id = %variant.id, episode_id = %variant.episode_id, quality = %variant.quality, "File variant created");
        Ok(variant)
    }

    async fn update_variant(&self, id: VariantId, input: VariantInput) -> Result<FileVariant, CatalogError> {
        validate_variant(&input)?;
        let _fence = self.fence.enter().await?;
        let current = self.get_variant(id).await?;
        let repo = self.store.catalog_repo();

        let keyed = VariantInput {
            episode_id: current.episode_id,
            ..input
        };
        let conflict = || format!("variant combination already exists for episode {}", current.episode_id);
        if repo
            .find_variant(&keyed)
            .await?
            .is_some_and(|other| other.id != id)
        {
            return Err(CatalogError::Conflict(conflict()));
        }

        repo.update_variant(id, &keyed)
            .await
            .map_err(|e| conflict_or(e, conflict))?
            .ok_or_else(|| CatalogError::not_found("variant", id))
    }

    async fn publish(&self, id: EpisodeId) -> Result<PublishOutcome, CatalogError> {
        let _fence = self.fence.enter().await?;
        let episode = self.require_episode(id).await?;
        if episode.published {
            debug!(episode_id = %id, "Episode already published");
            return Ok(PublishOutcome::AlreadyPublished);
        }

        let now = self.clock.now();
        if episode.release_at > now {
            return Err(CatalogError::NotYetReleased {
                episode_id: id,
                release_at: episode.release_at,
            });
        }

        // Only the caller whose conditional update flips the flag emits.
        if !self.store.catalog_repo().mark_published(id, now).await? {
            debug!(episode_id = %id, "Lost publish race; already published");
            return Ok(PublishOutcome::AlreadyPublished);
        }

        let published_at = episode.published_at.unwrap_or(now);
        let event = self.published_event(&episode, published_at).await?;
        info!(
            episode_id = %id,
            series_id = %event.series_id,
            season = event.season_number,
            episode = event.episode_number,
            "Episode published"
        );
        self.emit(CatalogEvent::EpisodePublished(event.clone()));
        Ok(PublishOutcome::Published(event))
    }

    async fn unpublish(&self, id: EpisodeId) -> Result<bool, CatalogError> {
        let _fence = self.fence.enter().await?;
        self.require_episode(id).await?;
        let changed = self.store.catalog_repo().mark_unpublished(id).await?;
        if changed {
            info!(episode_id = %id, "Episode unpublished");
            self.emit(CatalogEvent::EpisodeUnpublished { episode_id: id });
        }
        Ok(changed)
    }

    async fn publish_due(&self) -> Result<Vec<EpisodeId>, CatalogError> {
        let due = self
            .store
            .catalog_repo()
            .due_for_publish(self.clock.now())
            .await?;

        let mut published = Vec::new();
        for episode in due {
            match self.publish(episode.id).await {
                Ok(PublishOutcome::Published(_)) => published.push(episode.id),
                Ok(PublishOutcome::AlreadyPublished) => {}
                Err(e) => warn!(episode_id = %episode.id, error = %e, "Scheduled publish failed"),
            }
        }
        Ok(published)
    }

    async fn get_series(&self, id: SeriesId) -> Result<Series, CatalogError> {
        self.require_series(id).await
    }

    async fn get_season(&self, id: SeasonId) -> Result<Season, CatalogError> {
        self.require_season(id).await
    }

    async fn get_episode(&self, id: EpisodeId) -> Result<Episode, CatalogError> {
        self.require_episode(id).await
    }

    async fn get_variant(&self, id: VariantId) -> Result<FileVariant, CatalogError> {
        self.store
            .catalog_repo()
            .get_variant(id)
            .await?
            .ok_or_else(|| CatalogError::not_found("variant", id))
    }

    async fn seasons(&self, series_id: SeriesId) -> Result<Vec<Season>, CatalogError> {
        self.require_series(series_id).await?;
        Ok(self.store.catalog_repo().seasons_for_series(series_id).await?)
    }

    async fn episodes(&self, season_id: SeasonId) -> Result<Vec<Episode>, CatalogError> {
        self.require_season(season_id).await?;
        Ok(self.store.catalog_repo().episodes_for_season(season_id).await?)
    }

    async fn variants(&self, episode_id: EpisodeId) -> Result<Vec<FileVariant>, CatalogError> {
        self.require_episode(episode_id).await?;
        Ok(self.store.catalog_repo().variants_for_episode(episode_id).await?)
    }

    async fn list_latest(&self, limit: Option<u64>) -> Result<Vec<LatestEpisode>, CatalogError> {
        let limit = match limit {
            Some(n) => n,
            None => self.config.read().await.catalog.latest_count,
        };
        Ok(self.store.catalog_repo().latest(limit).await?)
    }

    async fn list_popular(&self, limit: Option<u64>) -> Result<Vec<Series>, CatalogError> {
        let limit = match limit {
            Some(n) => n,
            None => self.config.read().await.catalog.popular_count,
        };
        Ok(self.store.catalog_repo().popular(limit).await?)
    }

    async fn list(&self, filter: CatalogFilter, page: u64) -> Result<Page<Series>, CatalogError> {
        let page_size = self.config.read().await.catalog.page_size;
        let (items, total) = self
            .store
            .catalog_repo()
            .list_series(&filter, page, page_size)
            .await?;

        Ok(Page {
            items,
            page,
            page_size,
            total,
        })
    }

    async fn search(&self, text: &str) -> Result<Vec<Series>, CatalogError> {
        let threshold = self.config.read().await.catalog.search_similarity_threshold;
        let ids = self.search.query(text, threshold);
        debug!(query = text, hits = ids.len(), "Catalog search");
        Ok(self.store.catalog_repo().series_by_ids(&ids).await?)
    }

    async fn increment_popularity(&self, id: SeriesId) -> Result<(), CatalogError> {
        Ok(self.store.catalog_repo().increment_popularity(id).await?)
    }

    async fn rebuild_search_index(&self) -> Result<usize, CatalogError> {
        let repo = self.store.catalog_repo();
        let page_size = 200;
        let mut page = 0;
        let mut indexed = 0;

        self.search.clear();
        loop {
            let (items, _) = repo
                .list_series(&CatalogFilter::default(), page, page_size)
                .await?;
            if items.is_empty() {
                break;
            }
            for series in &items {
                self.search.reindex(series.id, &series.title);
            }
            indexed += items.len();
            page += 1;
        }

        info!(indexed, "Search index rebuilt");
        Ok(indexed)
    }

    fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.event_bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SeriesStatus;

    fn input(title: &str, year: i32) -> SeriesInput {
        SeriesInput {
            title: title.to_string(),
            synopsis: String::new(),
            genres: vec![],
            release_year: year,
            status: SeriesStatus::Ongoing,
            poster_ref: None,
        }
    }

    #[test]
    fn series_validation() {
        assert!(validate_series(&input("Bocchi", 2022)).is_ok());
        assert!(matches!(
            validate_series(&input("  ", 2022)),
            Err(CatalogError::InvalidData(_))
        ));
        assert!(matches!(
            validate_series(&input("Bocchi", 22)),
            Err(CatalogError::InvalidData(_))
        ));
    }

    #[test]
    fn non_unique_errors_stay_database_errors() {
        let err = conflict_or(anyhow::anyhow!("disk full"), || "dup".to_string());
        assert!(matches!(err, CatalogError::Database(_)));
    }
}
