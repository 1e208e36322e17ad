//! `SeaORM` implementation of the `GateService` trait.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{Store, is_unique_violation};
use crate::domain::{Clock, LedgerCause, Page, RequestId, RequestStatus, UserId, VariantId};
use crate::models::catalog::{Episode, FileVariant};
use crate::models::delivery::{Authorization, Delivery, DeliveryHandle};
use crate::models::request::AnimeRequest;
use crate::services::fence::OperationFence;
use crate::services::gate_service::{GateError, GateService};
use crate::services::ledger_service_impl::LedgerWriter;
use crate::services::locks::KeyedLocks;

fn download_key(user: UserId, variant: VariantId, nonce: &str) -> String {
    format!("download:{user}:{variant}:{nonce}")
}

fn request_key(user: UserId, nonce: &str) -> String {
    format!("request:{user}:{nonce}")
}

fn is_premium_only(qualities: &[String], quality: &str) -> bool {
    qualities.iter().any(|q| q.eq_ignore_ascii_case(quality))
}

pub struct SeaOrmGateService {
    store: Arc<Store>,
    writer: Arc<LedgerWriter>,
    locks: Arc<KeyedLocks>,
    fence: OperationFence,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<Config>>,
}

impl SeaOrmGateService {
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

    /// Loads the variant and checks its episode is downloadable.
    async fn available_variant(&self, id: VariantId) -> Result<(FileVariant, Episode), GateError> {
        let repo = self.store.catalog_repo();
        let variant = repo
            .get_variant(id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("variant {id}")))?;
        let episode = repo
            .get_episode(variant.episode_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("episode {}", variant.episode_id)))?;

        if !episode.published {
            return Err(GateError::NotAvailable(episode.id.to_string()));
        }
        Ok((variant, episode))
    }

    /// Download record and popularity are display aggregates; a failure here
    /// never takes back an issued handle.
    async fn record_side_effects(&self, handle: &DeliveryHandle, episode: &Episode) {
        let now = self.clock.now();
        if let Err(e) = self
            .store
            .delivery_repo()
            .record_download(
                handle.user_id,
                handle.variant_id,
                episode.id,
                episode.series_id,
                &handle.id,
                now,
            )
            .await
        {
            warn!(handle_id = %handle.id, error = %e, "Failed to record download");
        }

        if let Err(e) = self
            .store
            .catalog_repo()
            .increment_popularity(episode.series_id)
            .await
        {
            warn!(series_id = %episode.series_id, error = %e, "Failed to bump popularity");
        }
    }
}

#[async_trait::async_trait]
impl GateService for SeaOrmGateService {
    async fn authorize(
        &self,
        user: UserId,
        variant_id: VariantId,
        nonce: &str,
    ) -> Result<Authorization, GateError> {
        let _fence = self.fence.enter().await?;
        let key = download_key(user, variant_id, nonce);
        let _guard = self.locks.lock(format!("gate:{key}")).await;
        let delivery = self.store.delivery_repo();

        if let Some(handle) = delivery.handle_for_key(&key).await? {
            debug!(user_id = %user, handle_id = %handle.id, "Download authorization replayed");
            let balance = self.writer.balance(user).await?;
            return Ok(Authorization {
                handle,
                balance: balance.balance,
                premium: balance.premium,
                replayed: true,
            });
        }

        let (variant, episode) = self.available_variant(variant_id).await?;
        let account = self.writer.balance(user).await?;
        let premium = account.premium;

        if !premium {
            let premium_only = self.config.read().await.tokens.premium_only_qualities.clone();
            if is_premium_only(&premium_only, &variant.quality) {
                return Err(GateError::PremiumRequired {
                    quality: variant.quality,
                });
            }
        }

        // Debit strictly before the handle exists.
        let balance = if premium {
            account.balance
        } else {
            self.writer
                .apply(user, -1, LedgerCause::DownloadDebit, &key)
                .await?
                .entry
                .balance_after
        };

        let handle = delivery
            .insert_handle(
                &DeliveryHandle {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user,
                    variant_id,
                    charged: !premium,
                    issued_at: self.clock.now(),
                    consumed_at: None,
                },
                &key,
            )
            .await?;

        self.record_side_effects(&handle, &episode).await;

        let path = if premium { "premium" } else { "token" };
        metrics::counter!("downloads_authorized_total", "path" => path).increment(1);
        info!(
            user_id = %user,
            variant_id = %variant_id,
            handle_id = %handle.id,
            path,
            balance,
            "Download authorized"
        );

        Ok(Authorization {
            handle,
            balance,
            premium,
            replayed: false,
        })
    }

    async fn consume_handle(&self, handle_id: &str) -> Result<Delivery, GateError> {
        let _fence = self.fence.enter().await?;
        let delivery = self.store.delivery_repo();

        let handle = delivery
            .get_handle(handle_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("handle {handle_id}")))?;
        let variant = self
            .store
            .catalog_repo()
            .get_variant(handle.variant_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("variant {}", handle.variant_id)))?;

        if !delivery.consume_handle(handle_id, self.clock.now()).await? {
            return Err(GateError::AlreadyConsumed);
        }

        debug!(handle_id, user_id = %handle.user_id, "Delivery handle consumed");
        Ok(Delivery {
            handle_id: handle.id,
            user_id: handle.user_id,
            variant_id: handle.variant_id,
            storage_ref: variant.storage_ref,
        })
    }

    async fn request_addition(
        &self,
        user: UserId,
        title: &str,
        language: Option<&str>,
        nonce: &str,
    ) -> Result<AnimeRequest, GateError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(GateError::InvalidData("request title is empty".to_string()));
        }

        let _fence = self.fence.enter().await?;
        let key = request_key(user, nonce);
        let _guard = self.locks.lock(format!("gate:{key}")).await;
        let requests = self.store.request_repo();

        if let Some(existing) = requests.find_by_key(&key).await? {
            debug!(user_id = %user, request_id = %existing.id, "Anime request replayed");
            return Ok(existing);
        }

        let premium = self.writer.is_premium(user).await?;
        let cost = if premium {
            0
        } else {
            self.config.read().await.tokens.request_token_cost
        };

        if cost > 0 {
            self.writer
                .apply(user, -cost, LedgerCause::RequestDebit, &key)
                .await?;
        }

        let request = match requests
            .insert(user, &key, title, language, premium, cost, self.clock.now())
            .await
        {
            Ok(request) => request,
            Err(e) if is_unique_violation(&e) => requests
                .find_by_key(&key)
                .await?
                .ok_or_else(|| GateError::Database(format!("{e:#}")))?,
            Err(e) => return Err(e.into()),
        };

        info!(
            user_id = %user,
            request_id = %request.id,
            title,
            premium,
            cost,
            "Anime request filed"
        );
        Ok(request)
    }

    async fn pending_requests(&self, page: u64) -> Result<Page<AnimeRequest>, GateError> {
        let page_size = self.config.read().await.catalog.page_size;
        let (items, total) = self
            .store
            .request_repo()
            .list_pending(page, page_size)
            .await?;

        Ok(Page {
            items,
            page,
            page_size,
            total,
        })
    }

    async fn resolve_request(
        &self,
        id: RequestId,
        status: RequestStatus,
        notes: Option<&str>,
    ) -> Result<AnimeRequest, GateError> {
        if status == RequestStatus::Pending {
            return Err(GateError::InvalidData(
                "a request cannot be resolved back to pending".to_string(),
            ));
        }

        let _fence = self.fence.enter().await?;
        let requests = self.store.request_repo();
        if !requests.resolve(id, status, notes, self.clock.now()).await? {
            return Err(GateError::NotFound(format!("request {id}")));
        }

        info!(request_id = %id, status = status.as_str(), "Anime request resolved");
        requests
            .get(id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("request {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(
            download_key(UserId::new(7), VariantId::new(3), "n1"),
            "download:7:3:n1"
        );
        assert_eq!(request_key(UserId::new(7), "n1"), "request:7:n1");
    }

    #[test]
    fn premium_only_match_ignores_case() {
        let qualities = vec!["2160p".to_string(), "BluRay-1080p".to_string()];
        assert!(is_premium_only(&qualities, "2160P"));
        assert!(is_premium_only(&qualities, "bluray-1080p"));
        assert!(!is_premium_only(&qualities, "720p"));
    }

    #[test]
    fn ledger_shortfall_surfaces_unchanged() {
        let err: GateError = crate::services::ledger_service::LedgerError::InsufficientBalance {
            balance: 0,
            required: 1,
        }
        .into();
        assert!(matches!(
            err,
            GateError::InsufficientBalance {
                balance: 0,
                required: 1
            }
        ));
    }
}
