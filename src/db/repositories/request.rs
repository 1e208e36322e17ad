use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::domain::{RequestId, RequestStatus, UserId, parse_or};
use crate::entities::{anime_requests, prelude::*};
use crate::models::request::AnimeRequest;

pub struct RequestRepository {
    conn: DatabaseConnection,
}

impl RequestRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_request(model: anime_requests::Model) -> AnimeRequest {
        AnimeRequest {
            id: RequestId::new(model.id),
            user_id: UserId::new(model.user_id),
            request_key: model.request_key,
            title: model.title,
            language: model.language,
            premium: model.premium,
            cost: model.cost,
            status: parse_or(&model.status, RequestStatus::Pending),
            admin_notes: model.admin_notes,
            created_at: model.created_at,
            resolved_at: model.resolved_at,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        user: UserId,
        request_key: &str,
        title: &str,
        language: Option<&str>,
        premium: bool,
        cost: i64,
        now: DateTime<Utc>,
    ) -> Result<AnimeRequest> {
        let model = anime_requests::ActiveModel {
            user_id: Set(user.value()),
            request_key: Set(request_key.to_string()),
            title: Set(title.to_string()),
            language: Set(language.map(str::to_string)),
            premium: Set(premium),
            cost: Set(cost),
            status: Set(RequestStatus::Pending.as_str().to_string()),
            admin_notes: Set(None),
            created_at: Set(now),
            resolved_at: Set(None),
            ..Default::default()
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert anime request")?;

        Ok(Self::map_request(model))
    }

    pub async fn find_by_key(&self, request_key: &str) -> Result<Option<AnimeRequest>> {
        let model = AnimeRequests::find()
            .filter(anime_requests::Column::RequestKey.eq(request_key))
            .one(&self.conn)
            .await?;
        Ok(model.map(Self::map_request))
    }

    pub async fn get(&self, id: RequestId) -> Result<Option<AnimeRequest>> {
        let model = AnimeRequests::find_by_id(id.value()).one(&self.conn).await?;
        Ok(model.map(Self::map_request))
    }

    /// Pending requests, premium first, then oldest first.
    pub async fn list_pending(&self, page: u64, page_size: u64) -> Result<(Vec<AnimeRequest>, u64)> {
        let paginator = AnimeRequests::find()
            .filter(anime_requests::Column::Status.eq(RequestStatus::Pending.as_str()))
            .order_by_desc(anime_requests::Column::Premium)
            .order_by_asc(anime_requests::Column::CreatedAt)
            .paginate(&self.conn, page_size.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page).await?;
        Ok((rows.into_iter().map(Self::map_request).collect(), total))
    }

    pub async fn resolve(
        &self,
        id: RequestId,
        status: RequestStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = AnimeRequests::update_many()
            .col_expr(anime_requests::Column::Status, Expr::value(status.as_str()))
            .col_expr(
                anime_requests::Column::AdminNotes,
                Expr::value(notes.map(str::to_string)),
            )
            .col_expr(anime_requests::Column::ResolvedAt, Expr::value(now))
            .filter(anime_requests::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn count_pending(&self) -> Result<u64> {
        Ok(AnimeRequests::find()
            .filter(anime_requests::Column::Status.eq(RequestStatus::Pending.as_str()))
            .count(&self.conn)
            .await?)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        Ok(AnimeRequests::delete_many()
            .exec(&self.conn)
            .await?
            .rows_affected)
    }
}
