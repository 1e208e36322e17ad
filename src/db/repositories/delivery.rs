use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use crate::domain::{EpisodeId, SeriesId, UserId, VariantId};
use crate::entities::{delivery_handles, download_records, prelude::*};
use crate::models::delivery::DeliveryHandle;
use crate::models::stats::LeaderboardEntry;

#[derive(Debug, FromQueryResult)]
struct DownloadCount {
    user_id: i64,
    downloads: i64,
}

pub struct DeliveryRepository {
    conn: DatabaseConnection,
}

impl DeliveryRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_handle(model: delivery_handles::Model) -> DeliveryHandle {
        DeliveryHandle {
            id: model.id,
            user_id: UserId::new(model.user_id),
            variant_id: VariantId::new(model.variant_id),
            charged: model.charged,
            issued_at: model.issued_at,
            consumed_at: model.consumed_at,
        }
    }

    /// Stores a handle unless one already exists for `debit_key`, then returns
    /// whichever handle is stored for that key.
    pub async fn insert_handle(&self, handle: &DeliveryHandle, debit_key: &str) -> Result<DeliveryHandle> {
        DeliveryHandles::insert(delivery_handles::ActiveModel {
            id: Set(handle.id.clone()),
            user_id: Set(handle.user_id.value()),
            variant_id: Set(handle.variant_id.value()),
            debit_key: Set(debit_key.to_string()),
            charged: Set(handle.charged),
            issued_at: Set(handle.issued_at),
            consumed_at: Set(None),
        })
        .on_conflict(
            OnConflict::column(delivery_handles::Column::DebitKey)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await
        .context("Failed to insert delivery handle")?;

        self.handle_for_key(debit_key)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Delivery handle for {debit_key} missing after insert"))
    }

    pub async fn handle_for_key(&self, debit_key: &str) -> Result<Option<DeliveryHandle>> {
        let model = DeliveryHandles::find()
            .filter(delivery_handles::Column::DebitKey.eq(debit_key))
            .one(&self.conn)
            .await?;
        Ok(model.map(Self::map_handle))
    }

    pub async fn get_handle(&self, id: &str) -> Result<Option<DeliveryHandle>> {
        let model = DeliveryHandles::find_by_id(id.to_string())
            .one(&self.conn)
            .await?;
        Ok(model.map(Self::map_handle))
    }

    /// Stamps `consumed_at` if the handle was unused. Returns false otherwise.
    pub async fn consume_handle(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = DeliveryHandles::update_many()
            .col_expr(delivery_handles::Column::ConsumedAt, Expr::value(now))
            .filter(delivery_handles::Column::Id.eq(id))
            .filter(delivery_handles::Column::ConsumedAt.is_null())
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn record_download(
        &self,
        user: UserId,
        variant: VariantId,
        episode: EpisodeId,
        series: SeriesId,
        handle_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        DownloadRecords::insert(download_records::ActiveModel {
            user_id: Set(user.value()),
            variant_id: Set(variant.value()),
            episode_id: Set(episode.value()),
            series_id: Set(series.value()),
            handle_id: Set(handle_id.to_string()),
            created_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(download_records::Column::HandleId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;
        Ok(())
    }

    pub async fn count_downloads_for(&self, user: UserId) -> Result<u64> {
        Ok(DownloadRecords::find()
            .filter(download_records::Column::UserId.eq(user.value()))
            .count(&self.conn)
            .await?)
    }

    pub async fn count_downloads(&self) -> Result<u64> {
        Ok(DownloadRecords::find().count(&self.conn).await?)
    }

    pub async fn leaderboard(&self, limit: u64) -> Result<Vec<LeaderboardEntry>> {
        let rows = DownloadRecords::find()
            .select_only()
            .column(download_records::Column::UserId)
            .column_as(download_records::Column::Id.count(), "downloads")
            .group_by(download_records::Column::UserId)
            .order_by_desc(Expr::cust("downloads"))
            .order_by_asc(download_records::Column::UserId)
            .limit(limit)
            .into_model::<DownloadCount>()
            .all(&self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| LeaderboardEntry {
                user_id: UserId::new(r.user_id),
                downloads: r.downloads,
            })
            .collect())
    }

    pub async fn delete_all(&self) -> Result<u64> {
        let mut removed = DownloadRecords::delete_many()
            .exec(&self.conn)
            .await?
            .rows_affected;
        removed += DeliveryHandles::delete_many()
            .exec(&self.conn)
            .await?
            .rows_affected;
        Ok(removed)
    }
}
