//! Read-only aggregates for profile, leaderboard and operator screens.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::Store;
use crate::domain::{Clock, UserId};
use crate::models::stats::{LeaderboardEntry, Profile, SystemStats};
use crate::services::ledger_service_impl::is_premium_at;

pub struct StatsService {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<Config>>,
}

impl StatsService {
    #[must_use]
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, config: Arc<RwLock<Config>>) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// `None` for users without a token account.
    pub async fn profile(&self, user: UserId) -> Result<Option<Profile>> {
        let Some(account) = self.store.ledger_repo().get_account(user).await? else {
            return Ok(None);
        };
        let downloads = self.store.delivery_repo().count_downloads_for(user).await?;
        let watchlist_size = self.store.watchlist_repo().count_for(user).await?;

        Ok(Some(Profile {
            user_id: user,
            balance: account.balance,
            premium_until: account.premium_until,
            premium: is_premium_at(account.premium_until, self.clock.now()),
            downloads,
            watchlist_size,
            notifications_enabled: account.watchlist_notifications,
            member_since: account.created_at,
        }))
    }

    /// Top downloaders. `None` uses `catalog.leaderboard_count`.
    pub async fn leaderboard(&self, limit: Option<u64>) -> Result<Vec<LeaderboardEntry>> {
        let limit = match limit {
            Some(n) => n,
            None => self.config.read().await.catalog.leaderboard_count,
        };
        self.store.delivery_repo().leaderboard(limit).await
    }

    pub async fn system_stats(&self) -> Result<SystemStats> {
        let ledger = self.store.ledger_repo();
        let catalog = self.store.catalog_repo();

        Ok(SystemStats {
            users: ledger.count_accounts().await?,
            premium_users: ledger.count_premium(self.clock.now()).await?,
            series: catalog.count_series().await?,
            episodes: catalog.count_episodes(false).await?,
            published_episodes: catalog.count_episodes(true).await?,
            variants: catalog.count_variants().await?,
            downloads: self.store.delivery_repo().count_downloads().await?,
            tokens_in_circulation: ledger.total_balance().await?,
            pending_requests: self.store.request_repo().count_pending().await?,
            maintenance: self.store.system_repo().maintenance().await?,
        })
    }
}
