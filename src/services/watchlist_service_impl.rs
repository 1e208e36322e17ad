use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::{Store, WatchlistRow};
use crate::domain::{Clock, SeriesId, UserId};
use crate::services::fence::OperationFence;
use crate::services::ledger_service_impl::LedgerWriter;
use crate::services::locks::KeyedLocks;
use crate::services::watchlist_service::{WatchlistError, WatchlistService};

pub struct SeaOrmWatchlistService {
    store: Arc<Store>,
    writer: Arc<LedgerWriter>,
    locks: Arc<KeyedLocks>,
    fence: OperationFence,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<Config>>,
}

impl SeaOrmWatchlistService {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        writer: Arc<LedgerWriter>,
        locks: Arc<KeyedLocks>,
        fence: OperationFence,
        clock: Arc<dyn Clock>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            store,
            writer,
            locks,
            fence,
            clock,
            config,
        }
    }
}

#[async_trait::async_trait]
impl WatchlistService for SeaOrmWatchlistService {
    async fn watch(&self, user: UserId, series: SeriesId) -> Result<bool, WatchlistError> {
        let _fence = self.fence.enter().await?;
        if self.store.catalog_repo().get_series(series).await?.is_none() {
            return Err(WatchlistError::NotFound(format!("series {series}")));
        }

        // Count-then-insert per user.
        let _guard = self.locks.lock(format!("watch:{user}")).await;
        let repo = self.store.watchlist_repo();
        if repo.contains(user, series).await? {
            debug!(user_id = %user, series_id = %series, "Series already watched");
            return Ok(false);
        }

        let premium = self
            .writer
            .is_premium(user)
            .await
            .map_err(|e| WatchlistError::Database(e.to_string()))?;
        let limit = {
            let config = self.config.read().await;
            if premium {
                config.watchlist.max_items_premium
            } else {
                config.watchlist.max_items_free
            }
        };

        if repo.count_for(user).await? >= limit {
            return Err(WatchlistError::LimitReached { limit });
        }

        let added = repo.add(user, series, self.clock.now()).await?;
        if added {
            info!(user_id = %user, series_id = %series, "Series added to watchlist");
        }
        Ok(added)
    }

    async fn unwatch(&self, user: UserId, series: SeriesId) -> Result<bool, WatchlistError> {
        let _fence = self.fence.enter().await?;
        let removed = self.store.watchlist_repo().remove(user, series).await?;
        if removed {
            info!(user_id = %user, series_id = %series, "Series removed from watchlist");
        }
        Ok(removed)
    }

    async fn watchlist(&self, user: UserId) -> Result<Vec<WatchlistRow>, WatchlistError> {
        Ok(self.store.watchlist_repo().list_for(user).await?)
    }

    async fn set_notifications(&self, user: UserId, enabled: bool) -> Result<(), WatchlistError> {
        let _fence = self.fence.enter().await?;
        self.store
            .ledger_repo()
            .set_notifications(user, enabled, self.clock.now())
            .await?;
        info!(user_id = %user, enabled, "Watchlist notifications toggled");
        Ok(())
    }
}
