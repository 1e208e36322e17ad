use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{EpisodeId, SeasonId, SeriesId, SeriesStatus, VariantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    pub title: String,
    pub synopsis: String,
    pub genres: Vec<String>,
    pub release_year: i32,
    pub status: SeriesStatus,
    pub poster_ref: Option<String>,
    pub popularity: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: SeasonId,
    pub series_id: SeriesId,
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub season_id: SeasonId,
    pub series_id: SeriesId,
    pub number: i32,
    pub release_at: DateTime<Utc>,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub auto_publish: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVariant {
    pub id: VariantId,
    pub episode_id: EpisodeId,
    pub quality: String,
    pub audio_language: String,
    pub subtitle_language: String,
    pub storage_ref: String,
    pub file_size_bytes: Option<i64>,
}

/// Input for creating or fully replacing a series' metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesInput {
    pub title: String,
    pub synopsis: String,
    pub genres: Vec<String>,
    pub release_year: i32,
    pub status: SeriesStatus,
    pub poster_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeInput {
    pub season_id: SeasonId,
    pub number: i32,
    pub release_at: DateTime<Utc>,
    #[serde(default)]
    pub auto_publish: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantInput {
    pub episode_id: EpisodeId,
    pub quality: String,
    pub audio_language: String,
    pub subtitle_language: String,
    pub storage_ref: String,
    pub file_size_bytes: Option<i64>,
}

/// Filters for the paged catalog listing. Every field is optional; an empty
/// filter lists the whole catalog by title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub status: Option<SeriesStatus>,
}

/// A published episode together with the series it belongs to, as shown in
/// the "latest" listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestEpisode {
    pub episode: Episode,
    pub series_title: String,
    pub season_number: i32,
}
