use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::domain::{EpisodeId, SeasonId, SeriesId, SeriesStatus, VariantId, parse_or};
use crate::entities::{episodes, file_variants, prelude::*, seasons, series};
use crate::models::catalog::{
    CatalogFilter, Episode, EpisodeInput, FileVariant, LatestEpisode, Season, Series, SeriesInput,
    VariantInput,
};

pub struct CatalogRepository {
    conn: DatabaseConnection,
}

impl CatalogRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_series(model: series::Model) -> Series {
        let genres = serde_json::from_str(&model.genres).unwrap_or_else(|e| {
            tracing::warn!(series_id = model.id, error = %e, "Unreadable genre list");
            Vec::new()
        });

        Series {
            id: SeriesId::new(model.id),
            title: model.title,
            synopsis: model.synopsis,
            genres,
            release_year: model.release_year,
            status: parse_or(&model.status, SeriesStatus::Ongoing),
            poster_ref: model.poster_ref,
            popularity: model.popularity,
            created_at: model.created_at,
        }
    }

    const fn map_season(model: &seasons::Model) -> Season {
        Season {
            id: SeasonId::new(model.id),
            series_id: SeriesId::new(model.series_id),
            number: model.number,
        }
    }

    const fn map_episode(model: &episodes::Model) -> Episode {
        Episode {
            id: EpisodeId::new(model.id),
            season_id: SeasonId::new(model.season_id),
            series_id: SeriesId::new(model.series_id),
            number: model.number,
            release_at: model.release_at,
            published: model.published,
            published_at: model.published_at,
            auto_publish: model.auto_publish,
        }
    }

    fn map_variant(model: file_variants::Model) -> FileVariant {
        FileVariant {
            id: VariantId::new(model.id),
            episode_id: EpisodeId::new(model.episode_id),
            quality: model.quality,
            audio_language: model.audio_language,
            subtitle_language: model.subtitle_language,
            storage_ref: model.storage_ref,
            file_size_bytes: model.file_size_bytes,
        }
    }

    // ---- series ----

    pub async fn insert_series(&self, input: &SeriesInput, now: DateTime<Utc>) -> Result<Series> {
        let genres = serde_json::to_string(&input.genres)?;

        let model = series::ActiveModel {
            title: Set(input.title.clone()),
            synopsis: Set(input.synopsis.clone()),
            genres: Set(genres),
            release_year: Set(input.release_year),
            status: Set(input.status.as_str().to_string()),
            poster_ref: Set(input.poster_ref.clone()),
            popularity: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert series")?;

        Ok(Self::map_series(model))
    }

    pub async fn update_series(
        &self,
        id: SeriesId,
        input: &SeriesInput,
        now: DateTime<Utc>,
    ) -> Result<Option<Series>> {
        let Some(existing) = series::Entity::find_by_id(id.value()).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: series::ActiveModel = existing.into();
        active.title = Set(input.title.clone());
        active.synopsis = Set(input.synopsis.clone());
        active.genres = Set(serde_json::to_string(&input.genres)?);
        active.release_year = Set(input.release_year);
        active.status = Set(input.status.as_str().to_string());
        active.poster_ref = Set(input.poster_ref.clone());
        active.updated_at = Set(now);

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update series")?;
        Ok(Some(Self::map_series(model)))
    }

    pub async fn get_series(&self, id: SeriesId) -> Result<Option<Series>> {
        let model = series::Entity::find_by_id(id.value()).one(&self.conn).await?;
        Ok(model.map(Self::map_series))
    }

    /// Loads series preserving the order of `ids`. Unknown ids are skipped.
    pub async fn series_by_ids(&self, ids: &[SeriesId]) -> Result<Vec<Series>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<i32> = ids.iter().map(SeriesId::value).collect();
        let mut rows = series::Entity::find()
            .filter(series::Column::Id.is_in(raw.clone()))
            .all(&self.conn)
            .await?;

        let mut ordered = Vec::with_capacity(rows.len());
        for id in raw {
            if let Some(pos) = rows.iter().position(|r| r.id == id) {
                ordered.push(Self::map_series(rows.swap_remove(pos)));
            }
        }
        Ok(ordered)
    }

    pub async fn series_title_exists(&self, title: &str, except: Option<SeriesId>) -> Result<bool> {
        let mut query = series::Entity::find().filter(series::Column::Title.eq(title));
        if let Some(id) = except {
            query = query.filter(series::Column::Id.ne(id.value()));
        }
        Ok(query.count(&self.conn).await? > 0)
    }

    pub async fn popular(&self, limit: u64) -> Result<Vec<Series>> {
        let rows = series::Entity::find()
            .order_by_desc(series::Column::Popularity)
            .order_by_asc(series::Column::Title)
            .limit(limit)
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(Self::map_series).collect())
    }

    /// Filtered listing ordered by title. Returns the page plus the total
    /// number of matches.
    pub async fn list_series(
        &self,
        filter: &CatalogFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<Series>, u64)> {
        let mut query = series::Entity::find();
        if let Some(genre) = &filter.genre {
            // Genres are a JSON array; match the quoted element.
            query = query.filter(series::Column::Genres.contains(format!("\"{genre}\"")));
        }
        if let Some(year) = filter.year {
            query = query.filter(series::Column::ReleaseYear.eq(year));
        }
        if let Some(status) = filter.status {
            query = query.filter(series::Column::Status.eq(status.as_str()));
        }

        let paginator = query
            .order_by_asc(series::Column::Title)
            .paginate(&self.conn, page_size.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page).await?;

        Ok((rows.into_iter().map(Self::map_series).collect(), total))
    }

    pub async fn increment_popularity(&self, id: SeriesId) -> Result<()> {
        series::Entity::update_many()
            .col_expr(
                series::Column::Popularity,
                Expr::col(series::Column::Popularity).add(1),
            )
            .filter(series::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn count_series(&self) -> Result<u64> {
        Ok(series::Entity::find().count(&self.conn).await?)
    }

    // ---- seasons ----

    pub async fn insert_season(
        &self,
        series_id: SeriesId,
        number: i32,
        now: DateTime<Utc>,
    ) -> Result<Season> {
        let model = seasons::ActiveModel {
            series_id: Set(series_id.value()),
            number: Set(number),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert season")?;

        Ok(Self::map_season(&model))
    }

    pub async fn update_season_number(&self, id: SeasonId, number: i32) -> Result<Option<Season>> {
        let Some(existing) = Seasons::find_by_id(id.value()).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: seasons::ActiveModel = existing.into();
        active.number = Set(number);
        let model = active.update(&self.conn).await?;
        Ok(Some(Self::map_season(&model)))
    }

    pub async fn get_season(&self, id: SeasonId) -> Result<Option<Season>> {
        let model = Seasons::find_by_id(id.value()).one(&self.conn).await?;
        Ok(model.as_ref().map(Self::map_season))
    }

    pub async fn find_season(&self, series_id: SeriesId, number: i32) -> Result<Option<Season>> {
        let model = Seasons::find()
            .filter(seasons::Column::SeriesId.eq(series_id.value()))
            .filter(seasons::Column::Number.eq(number))
            .one(&self.conn)
            .await?;
        Ok(model.as_ref().map(Self::map_season))
    }

    pub async fn seasons_for_series(&self, series_id: SeriesId) -> Result<Vec<Season>> {
        let rows = Seasons::find()
            .filter(seasons::Column::SeriesId.eq(series_id.value()))
            .order_by_asc(seasons::Column::Number)
            .all(&self.conn)
            .await?;
        Ok(rows.iter().map(Self::map_season).collect())
    }

    // ---- episodes ----

    pub async fn insert_episode(
        &self,
        series_id: SeriesId,
        input: &EpisodeInput,
        now: DateTime<Utc>,
    ) -> Result<Episode> {
        let model = episodes::ActiveModel {
            season_id: Set(input.season_id.value()),
            series_id: Set(series_id.value()),
            number: Set(input.number),
            release_at: Set(input.release_at),
            published: Set(false),
            published_at: Set(None),
            auto_publish: Set(input.auto_publish),
            notifications_dispatched: Set(false),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert episode")?;

        Ok(Self::map_episode(&model))
    }

    pub async fn update_episode(
        &self,
        id: EpisodeId,
        number: i32,
        release_at: DateTime<Utc>,
        auto_publish: bool,
    ) -> Result<Option<Episode>> {
        let Some(existing) = Episodes::find_by_id(id.value()).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: episodes::ActiveModel = existing.into();
        active.number = Set(number);
        active.release_at = Set(release_at);
        active.auto_publish = Set(auto_publish);
        let model = active.update(&self.conn).await?;
        Ok(Some(Self::map_episode(&model)))
    }

    pub async fn get_episode(&self, id: EpisodeId) -> Result<Option<Episode>> {
        let model = Episodes::find_by_id(id.value()).one(&self.conn).await?;
        Ok(model.as_ref().map(Self::map_episode))
    }

    pub async fn find_episode(&self, season_id: SeasonId, number: i32) -> Result<Option<Episode>> {
        let model = Episodes::find()
            .filter(episodes::Column::SeasonId.eq(season_id.value()))
            .filter(episodes::Column::Number.eq(number))
            .one(&self.conn)
            .await?;
        Ok(model.as_ref().map(Self::map_episode))
    }

    pub async fn episodes_for_season(&self, season_id: SeasonId) -> Result<Vec<Episode>> {
        let rows = Episodes::find()
            .filter(episodes::Column::SeasonId.eq(season_id.value()))
            .order_by_asc(episodes::Column::Number)
            .all(&self.conn)
            .await?;
        Ok(rows.iter().map(Self::map_episode).collect())
    }

    /// Flips `published` to true only if it is currently false. Returns true
    /// when this call performed the transition.
    pub async fn mark_published(&self, id: EpisodeId, now: DateTime<Utc>) -> Result<bool> {
        let result = Episodes::update_many()
            .col_expr(episodes::Column::Published, Expr::value(true))
            .col_expr(
                episodes::Column::PublishedAt,
                Expr::cust_with_values("COALESCE(published_at, ?)", [now]),
            )
            .col_expr(episodes::Column::NotificationsDispatched, Expr::value(false))
            .filter(episodes::Column::Id.eq(id.value()))
            .filter(episodes::Column::Published.eq(false))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn mark_unpublished(&self, id: EpisodeId) -> Result<bool> {
        let result = Episodes::update_many()
            .col_expr(episodes::Column::Published, Expr::value(false))
            .filter(episodes::Column::Id.eq(id.value()))
            .filter(episodes::Column::Published.eq(true))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn mark_dispatched(&self, id: EpisodeId) -> Result<()> {
        Episodes::update_many()
            .col_expr(episodes::Column::NotificationsDispatched, Expr::value(true))
            .filter(episodes::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    /// Unpublished auto-publish episodes whose release time has passed.
    pub async fn due_for_publish(&self, now: DateTime<Utc>) -> Result<Vec<Episode>> {
        let rows = Episodes::find()
            .filter(episodes::Column::AutoPublish.eq(true))
            .filter(episodes::Column::Published.eq(false))
            .filter(episodes::Column::ReleaseAt.lte(now))
            .order_by_asc(episodes::Column::ReleaseAt)
            .all(&self.conn)
            .await?;
        Ok(rows.iter().map(Self::map_episode).collect())
    }

    /// Published episodes whose watchlist dispatch never finished.
    pub async fn undispatched(&self) -> Result<Vec<Episode>> {
        let rows = Episodes::find()
            .filter(episodes::Column::Published.eq(true))
            .filter(episodes::Column::NotificationsDispatched.eq(false))
            .order_by_asc(episodes::Column::PublishedAt)
            .all(&self.conn)
            .await?;
        Ok(rows.iter().map(Self::map_episode).collect())
    }

    pub async fn latest(&self, limit: u64) -> Result<Vec<LatestEpisode>> {
        let rows = Episodes::find()
            .filter(episodes::Column::Published.eq(true))
            .order_by_desc(episodes::Column::PublishedAt)
            .order_by_desc(episodes::Column::Id)
            .limit(limit)
            .find_also_related(Seasons)
            .all(&self.conn)
            .await?;

        let series_ids: Vec<i32> = rows.iter().map(|(e, _)| e.series_id).collect();
        let titles: std::collections::HashMap<i32, String> = series::Entity::find()
            .select_only()
            .column(series::Column::Id)
            .column(series::Column::Title)
            .filter(series::Column::Id.is_in(series_ids))
            .into_tuple::<(i32, String)>()
            .all(&self.conn)
            .await?
            .into_iter()
            .collect();

        Ok(rows
            .into_iter()
            .map(|(episode, season)| LatestEpisode {
                series_title: titles.get(&episode.series_id).cloned().unwrap_or_default(),
                season_number: season.map_or(0, |s| s.number),
                episode: Self::map_episode(&episode),
            })
            .collect())
    }

    pub async fn count_episodes(&self, published_only: bool) -> Result<u64> {
        let mut query = Episodes::find();
        if published_only {
            query = query.filter(episodes::Column::Published.eq(true));
        }
        Ok(query.count(&self.conn).await?)
    }

    // ---- file variants ----

    pub async fn insert_variant(&self, input: &VariantInput, now: DateTime<Utc>) -> Result<FileVariant> {
        let model = file_variants::ActiveModel {
            episode_id: Set(input.episode_id.value()),
            quality: Set(input.quality.clone()),
            audio_language: Set(input.audio_language.clone()),
            subtitle_language: Set(input.subtitle_language.clone()),
            storage_ref: Set(input.storage_ref.clone()),
            file_size_bytes: Set(input.file_size_bytes),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert file variant")?;

        Ok(Self::map_variant(model))
    }

    pub async fn update_variant(
        &self,
        id: VariantId,
        input: &VariantInput,
    ) -> Result<Option<FileVariant>> {
        let Some(existing) = FileVariants::find_by_id(id.value()).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: file_variants::ActiveModel = existing.into();
        active.quality = Set(input.quality.clone());
        active.audio_language = Set(input.audio_language.clone());
        active.subtitle_language = Set(input.subtitle_language.clone());
        active.storage_ref = Set(input.storage_ref.clone());
        active.file_size_bytes = Set(input.file_size_bytes);
        let model = active.update(&self.conn).await?;
        Ok(Some(Self::map_variant(model)))
    }

    pub async fn get_variant(&self, id: VariantId) -> Result<Option<FileVariant>> {
        let model = FileVariants::find_by_id(id.value()).one(&self.conn).await?;
        Ok(model.map(Self::map_variant))
    }

    pub async fn find_variant(&self, input: &VariantInput) -> Result<Option<FileVariant>> {
        let model = FileVariants::find()
            .filter(file_variants::Column::EpisodeId.eq(input.episode_id.value()))
            .filter(file_variants::Column::Quality.eq(input.quality.as_str()))
            .filter(file_variants::Column::AudioLanguage.eq(input.audio_language.as_str()))
            .filter(file_variants::Column::SubtitleLanguage.eq(input.subtitle_language.as_str()))
            .one(&self.conn)
            .await?;
        Ok(model.map(Self::map_variant))
    }

    pub async fn variants_for_episode(&self, episode_id: EpisodeId) -> Result<Vec<FileVariant>> {
        let rows = FileVariants::find()
            .filter(file_variants::Column::EpisodeId.eq(episode_id.value()))
            .order_by_asc(file_variants::Column::Quality)
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(Self::map_variant).collect())
    }

    pub async fn count_variants(&self) -> Result<u64> {
        Ok(FileVariants::find().count(&self.conn).await?)
    }

    // ---- wipe ----

    /// Deletes the catalog tree leaves first.
    pub async fn delete_all(&self) -> Result<u64> {
        let mut removed = 0;
        removed += FileVariants::delete_many().exec(&self.conn).await?.rows_affected;
        removed += Episodes::delete_many().exec(&self.conn).await?.rows_affected;
        removed += Seasons::delete_many().exec(&self.conn).await?.rows_affected;
        removed += series::Entity::delete_many().exec(&self.conn).await?.rows_affected;
        Ok(removed)
    }
}
