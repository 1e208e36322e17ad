use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::domain::{SeriesId, UserId};
use crate::entities::{prelude::*, series, watchlist_entries};

/// One watchlist row joined with the series title.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WatchlistRow {
    pub series_id: SeriesId,
    pub title: String,
    pub added_at: DateTime<Utc>,
}

pub struct WatchlistRepository {
    conn: DatabaseConnection,
}

impl WatchlistRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Returns true when a new entry was created.
    pub async fn add(&self, user: UserId, series_id: SeriesId, now: DateTime<Utc>) -> Result<bool> {
        let inserted = WatchlistEntries::insert(watchlist_entries::ActiveModel {
            user_id: Set(user.value()),
            series_id: Set(series_id.value()),
            created_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                watchlist_entries::Column::UserId,
                watchlist_entries::Column::SeriesId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;
        Ok(inserted == 1)
    }

    pub async fn remove(&self, user: UserId, series_id: SeriesId) -> Result<bool> {
        let result = WatchlistEntries::delete_many()
            .filter(watchlist_entries::Column::UserId.eq(user.value()))
            .filter(watchlist_entries::Column::SeriesId.eq(series_id.value()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn contains(&self, user: UserId, series_id: SeriesId) -> Result<bool> {
        Ok(WatchlistEntries::find()
            .filter(watchlist_entries::Column::UserId.eq(user.value()))
            .filter(watchlist_entries::Column::SeriesId.eq(series_id.value()))
            .count(&self.conn)
            .await?
            > 0)
    }

    pub async fn count_for(&self, user: UserId) -> Result<u64> {
        Ok(WatchlistEntries::find()
            .filter(watchlist_entries::Column::UserId.eq(user.value()))
            .count(&self.conn)
            .await?)
    }

    pub async fn list_for(&self, user: UserId) -> Result<Vec<WatchlistRow>> {
        let rows = WatchlistEntries::find()
            .filter(watchlist_entries::Column::UserId.eq(user.value()))
            .order_by_desc(watchlist_entries::Column::CreatedAt)
            .find_also_related(series::Entity)
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(entry, series)| WatchlistRow {
                series_id: SeriesId::new(entry.series_id),
                title: series.map(|s| s.title).unwrap_or_default(),
                added_at: entry.created_at,
            })
            .collect())
    }

    /// Every user watching `series_id`.
    pub async fn watchers(&self, series_id: SeriesId) -> Result<Vec<i64>> {
        Ok(WatchlistEntries::find()
            .select_only()
            .column(watchlist_entries::Column::UserId)
            .filter(watchlist_entries::Column::SeriesId.eq(series_id.value()))
            .order_by_asc(watchlist_entries::Column::UserId)
            .into_tuple::<i64>()
            .all(&self.conn)
            .await?)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        Ok(WatchlistEntries::delete_many()
            .exec(&self.conn)
            .await?
            .rows_affected)
    }
}
