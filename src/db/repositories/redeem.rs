use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::domain::{LinkState, UserId};
use crate::entities::{prelude::*, redeem_links};
use crate::models::redeem::RedeemLink;

pub struct RedeemRepository {
    conn: DatabaseConnection,
}

impl RedeemRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_link(model: redeem_links::Model) -> Result<RedeemLink> {
        let state = model
            .state
            .parse::<LinkState>()
            .with_context(|| format!("Corrupt state on redeem link {}", model.id))?;
        Ok(RedeemLink {
            id: model.id,
            token: model.token,
            user_id: UserId::new(model.user_id),
            state,
            created_at: model.created_at,
            expires_at: model.expires_at,
            completed_at: model.completed_at,
            claimed_by: model.claimed_by.map(UserId::new),
        })
    }

    pub async fn insert(&self, link: &RedeemLink) -> Result<()> {
        redeem_links::ActiveModel {
            id: Set(link.id.clone()),
            token: Set(link.token.clone()),
            user_id: Set(link.user_id.value()),
            state: Set(link.state.as_str().to_string()),
            created_at: Set(link.created_at),
            expires_at: Set(link.expires_at),
            completed_at: Set(link.completed_at),
            claimed_by: Set(link.claimed_by.map(|u| u.value())),
        }
        .insert(&self.conn)
        .await
        .context("Failed to insert redeem link")?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<RedeemLink>> {
        let model = RedeemLinks::find_by_id(id.to_string())
            .one(&self.conn)
            .await?;
        model.map(Self::map_link).transpose()
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<RedeemLink>> {
        let model = RedeemLinks::find()
            .filter(redeem_links::Column::Token.eq(token))
            .one(&self.conn)
            .await?;
        model.map(Self::map_link).transpose()
    }

    /// The user's pending link that has not yet expired, if any.
    pub async fn live_pending_for(&self, user: UserId, now: DateTime<Utc>) -> Result<Option<RedeemLink>> {
        let model = RedeemLinks::find()
            .filter(redeem_links::Column::UserId.eq(user.value()))
            .filter(redeem_links::Column::State.eq(LinkState::Pending.as_str()))
            .filter(redeem_links::Column::ExpiresAt.gt(now))
            .order_by_desc(redeem_links::Column::CreatedAt)
            .one(&self.conn)
            .await?;
        model.map(Self::map_link).transpose()
    }

    pub async fn completed_since(&self, user: UserId, since: DateTime<Utc>) -> Result<u64> {
        Ok(RedeemLinks::find()
            .filter(redeem_links::Column::UserId.eq(user.value()))
            .filter(redeem_links::Column::State.eq(LinkState::Completed.as_str()))
            .filter(redeem_links::Column::CompletedAt.gte(since))
            .count(&self.conn)
            .await?)
    }

    /// Pending → Completed. Returns false if the link was not pending.
    pub async fn mark_completed(
        &self,
        id: &str,
        claimed_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = RedeemLinks::update_many()
            .col_expr(
                redeem_links::Column::State,
                Expr::value(LinkState::Completed.as_str()),
            )
            .col_expr(redeem_links::Column::CompletedAt, Expr::value(now))
            .col_expr(
                redeem_links::Column::ClaimedBy,
                Expr::value(claimed_by.map(|u| u.value())),
            )
            .filter(redeem_links::Column::Id.eq(id))
            .filter(redeem_links::Column::State.eq(LinkState::Pending.as_str()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    pub async fn mark_expired(&self, id: &str) -> Result<bool> {
        let result = RedeemLinks::update_many()
            .col_expr(
                redeem_links::Column::State,
                Expr::value(LinkState::Expired.as_str()),
            )
            .filter(redeem_links::Column::Id.eq(id))
            .filter(redeem_links::Column::State.eq(LinkState::Pending.as_str()))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Deletes never-completed links that expired before `cutoff`.
    pub async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = RedeemLinks::delete_many()
            .filter(redeem_links::Column::State.is_in([
                LinkState::Pending.as_str(),
                LinkState::Expired.as_str(),
            ]))
            .filter(redeem_links::Column::ExpiresAt.lt(cutoff))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_all(&self) -> Result<u64> {
        Ok(RedeemLinks::delete_many()
            .exec(&self.conn)
            .await?
            .rows_affected)
    }
}
