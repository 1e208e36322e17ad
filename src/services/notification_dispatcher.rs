//! Fans new-episode notifications out to watchlisters.
//!
//! Every (user, episode) pair is claimed with a durable marker before the
//! gateway is called, so a redelivered publish event or a second dispatcher
//! finds the pair taken and sends nothing. Deliveries run concurrently up to
//! `notifications.max_concurrency`, each bounded by the delivery timeout;
//! failures stay on their own marker and are retried by the scheduler.

use anyhow::Result;
use chrono::Duration;
use futures::{StreamExt, stream};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};

use crate::clients::PresentationGateway;
use crate::config::Config;
use crate::db::Store;
use crate::domain::events::{CatalogEvent, EpisodePublished, NotificationIntent, NotificationPayload};
use crate::domain::{Clock, EpisodeId, MarkerState, UserId};
use crate::services::fence::OperationFence;

/// Counts for one dispatch or retry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Users in the notify-set (watchers minus those who muted notifications).
    pub targeted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Failures that used up their last attempt.
    pub abandoned: usize,
    /// Pairs already claimed by an earlier dispatch.
    pub skipped: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: Self) {
        self.targeted += other.targeted;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Failed,
    Abandoned,
}

pub struct NotificationDispatcher {
    store: Arc<Store>,
    gateway: Arc<dyn PresentationGateway>,
    fence: OperationFence,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<Config>>,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        gateway: Arc<dyn PresentationGateway>,
        fence: OperationFence,
        clock: Arc<dyn Clock>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            store,
            gateway,
            fence,
            clock,
            config,
        }
    }

    /// Listens for catalog events until the bus closes.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<CatalogEvent>) {
        info!("Notification dispatcher started");
        loop {
            match events.recv().await {
                Ok(CatalogEvent::EpisodePublished(event)) => {
                    if let Err(e) = self.dispatch(&event).await {
                        error!(episode_id = %event.episode_id, error = %e, "Dispatch failed");
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Missed events are still flagged undispatched in the store.
                    warn!(missed, "Dispatcher lagged behind catalog events; recovering");
                    if let Err(e) = self.recover_undispatched().await {
                        error!(error = %e, "Dispatch recovery failed");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Notification dispatcher stopped");
    }

    /// Notifies every watcher of the event's series exactly once.
    ///
    /// # Errors
    ///
    /// Fails if the store is fenced or unreachable. Individual delivery
    /// failures are recorded on their markers and counted, never returned.
    pub async fn dispatch(&self, event: &EpisodePublished) -> Result<DispatchReport> {
        let _fence = self.fence.enter().await?;
        let now = self.clock.now();

        let watchers = self.store.watchlist_repo().watchers(event.series_id).await?;
        let muted: HashSet<i64> = self
            .store
            .ledger_repo()
            .muted_among(&watchers)
            .await?
            .into_iter()
            .collect();

        let mut report = DispatchReport::default();
        let notifications = self.store.notification_repo();
        let mut claimed = Vec::new();
        for user in watchers.into_iter().filter(|u| !muted.contains(u)) {
            report.targeted += 1;
            let user = UserId::new(user);
            if notifications.claim(user, event.episode_id, now).await? {
                claimed.push(user);
            } else {
                report.skipped += 1;
            }
        }

        report.merge(self.deliver_all(event, claimed).await);
        self.store.catalog_repo().mark_dispatched(event.episode_id).await?;

        info!(
            episode_id = %event.episode_id,
            series_id = %event.series_id,
            targeted = report.targeted,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Episode notifications dispatched"
        );
        Ok(report)
    }

    /// Dispatches a published episode by id. Unpublished or unknown episodes
    /// produce an empty report.
    ///
    /// # Errors
    ///
    /// Same as [`Self::dispatch`].
    pub async fn dispatch_episode(&self, episode: EpisodeId) -> Result<DispatchReport> {
        match self.load_event(episode).await? {
            Some(event) => self.dispatch(&event).await,
            None => {
                debug!(episode_id = %episode, "Episode not published; nothing to dispatch");
                Ok(DispatchReport::default())
            }
        }
    }

    /// Re-dispatches published episodes whose dispatch never completed.
    ///
    /// # Errors
    ///
    /// Fails if the store is fenced or unreachable.
    pub async fn recover_undispatched(&self) -> Result<DispatchReport> {
        let episodes = self.store.catalog_repo().undispatched().await?;
        let mut report = DispatchReport::default();
        for episode in episodes {
            report.merge(self.dispatch_episode(episode.id).await?);
        }
        Ok(report)
    }

    /// Retries failed markers and pending markers abandoned by a crashed run.
    /// Each marker is reclaimed before delivery, so concurrent passes never
    /// send the same notification twice.
    ///
    /// # Errors
    ///
    /// Fails if the store is fenced or unreachable.
    pub async fn retry_failed(&self) -> Result<DispatchReport> {
        let _fence = self.fence.enter().await?;
        let stale_secs = {
            let config = self.config.read().await;
            i64::try_from(config.notifications.delivery_timeout_seconds)
                .unwrap_or(i64::MAX / 4)
                .saturating_mul(3)
        };
        let now = self.clock.now();
        let stale_before = now - Duration::seconds(stale_secs);

        let notifications = self.store.notification_repo();
        let mut report = DispatchReport::default();
        let mut by_episode: BTreeMap<i32, Vec<UserId>> = BTreeMap::new();
        for marker in notifications.retryable(stale_before).await? {
            // Overlapping passes race here; only the winner delivers.
            if !notifications.reclaim(marker.id, stale_before, now).await? {
                debug!(user_id = marker.user_id, episode_id = marker.episode_id, "Marker taken by another retry pass");
                report.skipped += 1;
                continue;
            }
            by_episode
                .entry(marker.episode_id)
                .or_default()
                .push(UserId::new(marker.user_id));
        }

        for (episode, users) in by_episode {
            let episode = EpisodeId::new(episode);
            let Some(event) = self.load_event(episode).await? else {
                debug!(episode_id = %episode, "Skipping retries for unpublished episode");
                continue;
            };
            report.targeted += users.len();
            report.merge(self.deliver_all(&event, users).await);
        }

        if report.targeted > 0 {
            info!(
                retried = report.targeted,
                delivered = report.delivered,
                abandoned = report.abandoned,
                "Notification retry pass finished"
            );
        }
        Ok(report)
    }

    async fn load_event(&self, episode: EpisodeId) -> Result<Option<EpisodePublished>> {
        let catalog = self.store.catalog_repo();
        let Some(episode) = catalog.get_episode(episode).await? else {
            return Ok(None);
        };
        let Some(published_at) = episode.published_at.filter(|_| episode.published) else {
            return Ok(None);
        };
        let Some(series) = catalog.get_series(episode.series_id).await? else {
            return Ok(None);
        };
        let season_number = catalog
            .get_season(episode.season_id)
            .await?
            .map_or(0, |s| s.number);

        Ok(Some(EpisodePublished {
            series_id: series.id,
            series_title: series.title,
            season_number,
            episode_id: episode.id,
            episode_number: episode.number,
            published_at,
        }))
    }

    /// Sends to every claimed user with bounded concurrency and records each
    /// outcome on its marker. Only delivery counts are filled in.
    async fn deliver_all(&self, event: &EpisodePublished, users: Vec<UserId>) -> DispatchReport {
        let (concurrency, timeout, max_attempts) = {
            let config = self.config.read().await;
            (
                config.notifications.max_concurrency.max(1),
                std::time::Duration::from_secs(config.notifications.delivery_timeout_seconds.max(1)),
                config.notifications.max_attempts,
            )
        };
        let payload = NotificationPayload::from(event);

        let outcomes: Vec<Outcome> = stream::iter(users)
            .map(|user| {
                let intent = NotificationIntent {
                    user_id: user,
                    episode_id: event.episode_id,
                    payload: payload.clone(),
                };
                self.deliver_one(intent, timeout, max_attempts)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = DispatchReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Abandoned => {
                    report.failed += 1;
                    report.abandoned += 1;
                }
            }
        }
        report
    }

    async fn deliver_one(
        &self,
        intent: NotificationIntent,
        timeout: std::time::Duration,
        max_attempts: u32,
    ) -> Outcome {
        let user = intent.user_id;
        let episode = intent.episode_id;
        let notifications = self.store.notification_repo();

        let result = match tokio::time::timeout(timeout, self.gateway.deliver(user, &intent.payload)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("delivery timed out after {}s", timeout.as_secs())),
        };

        match result {
            Ok(()) => {
                metrics::counter!("notifications_delivered_total").increment(1);
                if let Err(e) = notifications.mark_delivered(user, episode, self.clock.now()).await {
                    warn!(user_id = %user, episode_id = %episode, error = %e, "Failed to mark notification delivered");
                }
                debug!(user_id = %user, episode_id = %episode, "Notification delivered");
                Outcome::Delivered
            }
            Err(err) => {
                metrics::counter!("notifications_failed_total").increment(1);
                let message = format!("{err:#}");
                let state = notifications
                    .mark_failed(user, episode, &message, max_attempts, self.clock.now())
                    .await
                    .unwrap_or_else(|e| {
                        warn!(user_id = %user, episode_id = %episode, error = %e, "Failed to record notification failure");
                        MarkerState::Failed
                    });
                warn!(
                    user_id = %user,
                    episode_id = %episode,
                    error = %message,
                    state = state.as_str(),
                    "Notification delivery failed"
                );
                if state == MarkerState::Abandoned {
                    Outcome::Abandoned
                } else {
                    Outcome::Failed
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_merge_field_by_field() {
        let mut total = DispatchReport {
            targeted: 3,
            delivered: 2,
            failed: 1,
            abandoned: 0,
            skipped: 0,
        };
        total.merge(DispatchReport {
            targeted: 3,
            delivered: 0,
            failed: 0,
            abandoned: 0,
            skipped: 3,
        });
        assert_eq!(total.targeted, 6);
        assert_eq!(total.delivered, 2);
        assert_eq!(total.skipped, 3);
    }
}
