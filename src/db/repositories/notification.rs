use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::domain::{EpisodeId, MarkerState, UserId};
use crate::entities::{notification_markers, prelude::*};

pub struct NotificationRepository {
    conn: DatabaseConnection,
}

impl NotificationRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Claims the (user, episode) pair by inserting a pending marker. Returns
    /// false if any marker for the pair already exists.
    pub async fn claim(&self, user: UserId, episode: EpisodeId, now: DateTime<Utc>) -> Result<bool> {
        let inserted = NotificationMarkers::insert(notification_markers::ActiveModel {
            user_id: Set(user.value()),
            episode_id: Set(episode.value()),
            state: Set(MarkerState::Pending.as_str().to_string()),
            attempts: Set(0),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                notification_markers::Column::UserId,
                notification_markers::Column::EpisodeId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;
        Ok(inserted == 1)
    }

    pub async fn mark_delivered(&self, user: UserId, episode: EpisodeId, now: DateTime<Utc>) -> Result<()> {
        NotificationMarkers::update_many()
            .col_expr(
                notification_markers::Column::State,
                Expr::value(MarkerState::Delivered.as_str()),
            )
            .col_expr(
                notification_markers::Column::Attempts,
                Expr::col(notification_markers::Column::Attempts).add(1),
            )
            .col_expr(notification_markers::Column::LastError, Expr::value(None::<String>))
            .col_expr(notification_markers::Column::UpdatedAt, Expr::value(now))
            .filter(notification_markers::Column::UserId.eq(user.value()))
            .filter(notification_markers::Column::EpisodeId.eq(episode.value()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    /// Records a failed attempt. The marker becomes `Abandoned` once it has
    /// used up `max_attempts`; the resulting state is returned.
    pub async fn mark_failed(
        &self,
        user: UserId,
        episode: EpisodeId,
        error: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<MarkerState> {
        let Some(marker) = NotificationMarkers::find()
            .filter(notification_markers::Column::UserId.eq(user.value()))
            .filter(notification_markers::Column::EpisodeId.eq(episode.value()))
            .one(&self.conn)
            .await?
        else {
            anyhow::bail!("No notification marker for user {user}, episode {episode}");
        };

        let attempts = marker.attempts.saturating_add(1);
        let state = if u32::try_from(attempts).unwrap_or(u32::MAX) >= max_attempts {
            MarkerState::Abandoned
        } else {
            MarkerState::Failed
        };

        NotificationMarkers::update_many()
            .col_expr(notification_markers::Column::State, Expr::value(state.as_str()))
            .col_expr(notification_markers::Column::Attempts, Expr::value(attempts))
            .col_expr(notification_markers::Column::LastError, Expr::value(error))
            .col_expr(notification_markers::Column::UpdatedAt, Expr::value(now))
            .filter(notification_markers::Column::Id.eq(marker.id))
            .exec(&self.conn)
            .await?;
        Ok(state)
    }

    /// Failed markers, plus pending ones left untouched since `stale_before`
    /// (claimed by a run that died).
    fn retryable_condition(stale_before: DateTime<Utc>) -> Condition {
        Condition::any()
            .add(notification_markers::Column::State.eq(MarkerState::Failed.as_str()))
            .add(
                Condition::all()
                    .add(notification_markers::Column::State.eq(MarkerState::Pending.as_str()))
                    .add(notification_markers::Column::UpdatedAt.lt(stale_before)),
            )
    }

    /// Markers eligible for another attempt. Read-only; a retry must still
    /// [`Self::reclaim`] each one before delivering.
    pub async fn retryable(&self, stale_before: DateTime<Utc>) -> Result<Vec<notification_markers::Model>> {
        Ok(NotificationMarkers::find()
            .filter(Self::retryable_condition(stale_before))
            .order_by_asc(notification_markers::Column::UpdatedAt)
            .all(&self.conn)
            .await?)
    }

    /// Moves a retryable marker back to a fresh `Pending`. Returns false if
    /// another retry pass got there first or the marker settled meanwhile.
    pub async fn reclaim(&self, id: i64, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
        let result = NotificationMarkers::update_many()
            .col_expr(
                notification_markers::Column::State,
                Expr::value(MarkerState::Pending.as_str()),
            )
            .col_expr(notification_markers::Column::UpdatedAt, Expr::value(now))
            .filter(notification_markers::Column::Id.eq(id))
            .filter(Self::retryable_condition(stale_before))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn markers_for_episode(&self, episode: EpisodeId) -> Result<Vec<notification_markers::Model>> {
        Ok(NotificationMarkers::find()
            .filter(notification_markers::Column::EpisodeId.eq(episode.value()))
            .order_by_asc(notification_markers::Column::UserId)
            .all(&self.conn)
            .await?)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        Ok(NotificationMarkers::delete_many()
            .exec(&self.conn)
            .await?
            .rows_affected)
    }
}
