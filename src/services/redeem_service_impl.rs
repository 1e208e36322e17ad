use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clients::Shortener;
use crate::config::{Config, RedeemConfig};
use crate::db::Store;
use crate::domain::{Clock, LedgerCause, LinkState, UserId};
use crate::models::redeem::{IssuedLink, RedeemLink, Redemption};
use crate::services::fence::OperationFence;
use crate::services::ledger_service_impl::LedgerWriter;
use crate::services::locks::KeyedLocks;
use crate::services::redeem_service::{RedeemError, RedeemService};

fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn render_link(config: &RedeemConfig, token: &str) -> String {
    config
        .link_template
        .replace("{bot}", &config.bot_username)
        .replace("{token}", token)
}

pub struct SeaOrmRedeemService {
    store: Arc<Store>,
    writer: Arc<LedgerWriter>,
    shortener: Arc<dyn Shortener>,
    locks: Arc<KeyedLocks>,
    fence: OperationFence,
    clock: Arc<dyn Clock>,
    config: Arc<RwLock<Config>>,
}

impl SeaOrmRedeemService {
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        writer: Arc<LedgerWriter>,
        shortener: Arc<dyn Shortener>,
        locks: Arc<KeyedLocks>,
        fence: OperationFence,
        clock: Arc<dyn Clock>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            store,
            writer,
            shortener,
            locks,
            fence,
            clock,
            config,
        }
    }

    /// Short URL for `long_url`, or `long_url` itself when the shortener
    /// fails or does not answer in time.
    async fn shorten(&self, long_url: &str, timeout_secs: u64) -> String {
        let timeout = std::time::Duration::from_secs(timeout_secs.max(1));
        match tokio::time::timeout(timeout, self.shortener.shorten(long_url)).await {
            Ok(Ok(short)) => short,
            Ok(Err(e)) => {
                warn!(error = %format!("{e:#}"), "Shortener failed; handing out the long link");
                long_url.to_string()
            }
            Err(_) => {
                warn!(timeout_secs, "Shortener timed out; handing out the long link");
                long_url.to_string()
            }
        }
    }
}

#[async_trait::async_trait]
impl RedeemService for SeaOrmRedeemService {
    async fn issue(&self, user: UserId) -> Result<IssuedLink, RedeemError> {
        let _fence = self.fence.enter().await?;
        let (redeem, shortener_timeout) = {
            let config = self.config.read().await;
            (config.redeem.clone(), config.shortener.timeout_seconds)
        };

        // Check-then-insert must not interleave for one user.
        let _guard = self.locks.lock(format!("issue:{user}")).await;
        let repo = self.store.redeem_repo();
        let now = self.clock.now();

        if let Some(live) = repo.live_pending_for(user, now).await? {
            debug!(user_id = %user, link_id = %live.id, "Pending redeem link already live");
            return Err(RedeemError::RateLimited(format!(
                "a redeem link is already pending until {}",
                live.expires_at
            )));
        }

        if redeem.daily_redeem_limit > 0 {
            let completed = repo.completed_since(user, start_of_utc_day(now)).await?;
            if completed >= u64::from(redeem.daily_redeem_limit) {
                debug!(user_id = %user, completed, "Daily redeem limit reached");
                return Err(RedeemError::RateLimited(format!(
                    "daily limit of {} redeems reached",
                    redeem.daily_redeem_limit
                )));
            }
        }

        let token = uuid::Uuid::new_v4().simple().to_string();
        let long_url = render_link(&redeem, &token);
        let short_url = self.shorten(&long_url, shortener_timeout).await;

        let link = RedeemLink {
            id: uuid::Uuid::new_v4().to_string(),
            token,
            user_id: user,
            state: LinkState::Pending,
            created_at: now,
            expires_at: now + Duration::hours(i64::from(redeem.link_expiry_hours)),
            completed_at: None,
            claimed_by: None,
        };
        repo.insert(&link).await?;

        info!(
            user_id = %user,
            link_id = %link.id,
            expires_at = %link.expires_at,
            "Redeem link issued"
        );

        Ok(IssuedLink {
            link,
            long_url,
            short_url,
        })
    }

    async fn resolve(&self, token: &str, claimant: Option<UserId>) -> Result<Redemption, RedeemError> {
        let _fence = self.fence.enter().await?;
        let repo = self.store.redeem_repo();

        let found = repo.find_by_token(token).await?.ok_or(RedeemError::NotFound)?;
        let _guard = self.locks.lock(format!("link:{}", found.id)).await;

        // Re-read under the lock; a concurrent resolve may have finished.
        let link = repo.get(&found.id).await?.ok_or(RedeemError::NotFound)?;
        let now = self.clock.now();

        match link.effective_state(now) {
            LinkState::Completed => {
                debug!(link_id = %link.id, "Redeem link already completed");
                return Err(RedeemError::AlreadyCompleted);
            }
            LinkState::Expired => {
                if link.state == LinkState::Pending && repo.mark_expired(&link.id).await? {
                    debug!(link_id = %link.id, "Redeem link marked expired");
                }
                return Err(RedeemError::Expired);
            }
            LinkState::Pending => {}
        }

        let (credited, joiner_bonus) = {
            let config = self.config.read().await;
            (config.tokens.tokens_per_redeem, config.tokens.referral_joiner_tokens)
        };
        // The link id keys both credits, so a crash between these writes
        // cannot credit twice on the next callback.
        let receipt = self
            .writer
            .apply(
                link.user_id,
                credited,
                LedgerCause::Redeem,
                &format!("redeem:{}", link.id),
            )
            .await?;

        let joiner = claimant.filter(|c| *c != link.user_id);
        if claimant.is_some() && joiner.is_none() {
            debug!(link_id = %link.id, "Redeem link claimed by its own creator; no joining bonus");
        }
        let joiner_credited = match joiner {
            Some(joiner) if joiner_bonus > 0 => {
                self.writer
                    .apply(
                        joiner,
                        joiner_bonus,
                        LedgerCause::ReferralJoin,
                        &format!("redeem-joiner:{}", link.id),
                    )
                    .await?;
                joiner_bonus
            }
            _ => 0,
        };

        if !repo.mark_completed(&link.id, claimant, now).await? {
            warn!(link_id = %link.id, "Redeem link changed state during resolve");
            return Err(RedeemError::AlreadyCompleted);
        }

        let balance = if receipt.replayed {
            self.writer.balance(link.user_id).await?.balance
        } else {
            receipt.entry.balance_after
        };

        metrics::counter!("redeem_links_resolved_total").increment(1);
        info!(
            user_id = %link.user_id,
            link_id = %link.id,
            credited,
            balance,
            claimed_by = ?claimant.map(|c| c.value()),
            joiner_credited,
            "Redeem link completed"
        );

        Ok(Redemption {
            user_id: link.user_id,
            credited,
            balance,
            claimed_by: claimant,
            joiner_credited,
        })
    }

    async fn link_status(&self, token: &str) -> Result<RedeemLink, RedeemError> {
        let mut link = self
            .store
            .redeem_repo()
            .find_by_token(token)
            .await?
            .ok_or(RedeemError::NotFound)?;
        link.state = link.effective_state(self.clock.now());
        Ok(link)
    }

    async fn compact_expired(&self) -> Result<u64, RedeemError> {
        let _fence = self.fence.enter().await?;
        let grace = self.config.read().await.redeem.compaction_grace_hours;
        let cutoff = self.clock.now() - Duration::hours(i64::from(grace));

        let removed = self.store.redeem_repo().delete_expired_before(cutoff).await?;
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Compacted expired redeem links");
        }
        Ok(removed)
    }
}
