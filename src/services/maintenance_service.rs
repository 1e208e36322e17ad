//! Owner-only full wipe and the persisted maintenance flag.
//!
//! The wipe closes the operation fence, persists `WipeInProgress`, deletes
//! every collection children-first and then persists `Wiped`. The fence is
//! never lifted by the wipe itself: a completed wipe is the last operation
//! the process honors, and a failed step leaves `WipeInProgress` behind.
//! Either way the store stays fenced, across restarts too, until an operator
//! calls [`MaintenanceService::clear_wipe_flag`].

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tracing::{error, info, warn};

use crate::clients::SearchIndex;
use crate::config::Config;
use crate::db::Store;
use crate::domain::events::CatalogEvent;
use crate::domain::{Clock, MaintenanceState, UserId};
use crate::services::fence::{Fenced, OperationFence};

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("Only the configured owner may wipe the store")]
    NotOwner,

    #[error("No owner configured; set general.owner_id to enable wiping")]
    OwnerNotConfigured,

    #[error("Wipe aborted at step {step}: {message}; store left in wipe-in-progress state")]
    Fatal { step: &'static str, message: String },

    #[error("Fatal: {0}")]
    Fenced(#[from] Fenced),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for MaintenanceError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for MaintenanceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

/// Rows removed per collection by a completed wipe.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WipeReport {
    pub steps: Vec<(&'static str, u64)>,
}

impl WipeReport {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.steps.iter().map(|(_, n)| n).sum()
    }
}

pub struct MaintenanceService {
    store: Arc<Store>,
    search: Arc<dyn SearchIndex>,
    fence: OperationFence,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<Config>>,
    event_bus: broadcast::Sender<CatalogEvent>,
}

impl MaintenanceService {
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

    /// # Errors
    ///
    /// Returns [`MaintenanceError::Database`] on connection failures.
    pub async fn maintenance_state(&self) -> Result<MaintenanceState, MaintenanceError> {
        Ok(self.store.system_repo().maintenance().await?)
    }

    /// Deletes everything. Waits for in-flight ledger, gate and catalog work
    /// to drain first. New work fails with `Fatal` from then on, including
    /// after the wipe returns.
    ///
    /// # Errors
    ///
    /// - Returns [`MaintenanceError::OwnerNotConfigured`] / [`MaintenanceError::NotOwner`]
    ///   unless `caller` is `general.owner_id`
    /// - Returns [`MaintenanceError::Fenced`] if a wipe already ran or is running
    /// - Returns [`MaintenanceError::Fatal`] naming the step that failed
    pub async fn full_wipe(&self, caller: UserId) -> Result<WipeReport, MaintenanceError> {
        match self.config.read().await.general.owner_id {
            None => return Err(MaintenanceError::OwnerNotConfigured),
            Some(owner) if owner != caller.value() => {
                warn!(caller = %caller, "Rejected wipe from non-owner");
                return Err(MaintenanceError::NotOwner);
            }
            Some(_) => {}
        }

        info!(caller = %caller, "Full wipe requested; fencing operations");
        let _exclusive = self.fence.close().await.inspect_err(|_| {
            warn!(caller = %caller, "Rejected wipe; the store is already fenced");
        })?;

        self.step("mark", || async {
            self.store
                .system_repo()
                .set_maintenance(MaintenanceState::WipeInProgress, self.clock.now())
                .await
                .map(|()| 0)
        })
        .await?;

        let mut report = WipeReport::default();
        report.steps.push((
            "notifications",
            self.step("notifications", || async { self.store.notification_repo().delete_all().await })
                .await?,
        ));
        report.steps.push((
            "watchlist",
            self.step("watchlist", || async { self.store.watchlist_repo().delete_all().await })
                .await?,
        ));
        report.steps.push((
            "requests",
            self.step("requests", || async { self.store.request_repo().delete_all().await })
                .await?,
        ));
        report.steps.push((
            "deliveries",
            self.step("deliveries", || async { self.store.delivery_repo().delete_all().await })
                .await?,
        ));
        report.steps.push((
            "redeem_links",
            self.step("redeem_links", || async { self.store.redeem_repo().delete_all().await })
                .await?,
        ));
        report.steps.push((
            "ledger",
            self.step("ledger", || async { self.store.ledger_repo().delete_all().await })
                .await?,
        ));
        report.steps.push((
            "catalog",
            self.step("catalog", || async { self.store.catalog_repo().delete_all().await })
                .await?,
        ));
        self.search.clear();

        self.step("seal", || async {
            self.store
                .system_repo()
                .set_maintenance(MaintenanceState::Wiped, self.clock.now())
                .await
                .map(|()| 0)
        })
        .await?;

        let _ = self.event_bus.send(CatalogEvent::Wiped);
        info!(removed = report.total(), "Full wipe completed; store stays fenced");
        Ok(report)
    }

    /// Operator recovery after a wipe, failed or completed: returns the store
    /// to `Active` and reopens the fence. The data is whatever the wipe left
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns [`MaintenanceError::Database`] if the flag cannot be written.
    pub async fn clear_wipe_flag(&self) -> Result<(), MaintenanceError> {
        self.store
            .system_repo()
            .set_maintenance(MaintenanceState::Active, self.clock.now())
            .await?;
        self.fence.lift();
        warn!("Wipe flag cleared by operator");
        Ok(())
    }

    async fn step<F, Fut>(&self, step: &'static str, run: F) -> Result<u64, MaintenanceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<u64>>,
    {
        match run().await {
            Ok(removed) => {
                info!(step, removed, "Wipe step finished");
                Ok(removed)
            }
            Err(e) => {
                error!(step, error = %format!("{e:#}"), "Wipe step failed; store stays fenced");
                Err(MaintenanceError::Fatal {
                    step,
                    message: format!("{e:#}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_names_the_step() {
        let err = MaintenanceError::Fatal {
            step: "ledger",
            message: "disk I/O error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Wipe aborted at step ledger: disk I/O error; store left in wipe-in-progress state"
        );
    }

    #[test]
    fn report_totals_steps() {
        let report = WipeReport {
            steps: vec![("ledger", 4), ("catalog", 6)],
        };
        assert_eq!(report.total(), 10);
    }
}
