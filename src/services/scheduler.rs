use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{Duration, interval};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::state::Engine;

fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Periodic upkeep: scheduled publishing, dispatch recovery, redeem link
/// compaction, lock pruning and notification retries.
pub struct Scheduler {
    engine: Arc<Engine>,
    config: SchedulerConfig,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(engine: Arc<Engine>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduler is disabled in config");
            return Ok(());
        }

        *self.running.write().await = true;
        info!("Starting background scheduler");

        if let Some(cron_expr) = &self.config.cron_expression {
            self.run_with_cron(cron_expr).await
        } else {
            self.run_with_interval().await
        }
    }

    async fn run_with_cron(&self, cron_expr: &str) -> Result<()> {
        let mut sched = JobScheduler::new().await?;

        let engine = Arc::clone(&self.engine);
        let running = Arc::clone(&self.running);
        let maintenance_job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let engine = Arc::clone(&engine);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                run_maintenance(&engine).await;
            })
        })?;

        let retry_minutes = self.config.retry_interval_minutes.max(1);
        let retry_cron = if retry_minutes >= 60 {
            "0 0 * * * *".to_string()
        } else {
            format!("0 */{retry_minutes} * * * *")
        };

        let engine = Arc::clone(&self.engine);
        let running = Arc::clone(&self.running);
        let retry_job = Job::new_async(&retry_cron, move |_uuid, _lock| {
            let engine = Arc::clone(&engine);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if !*running.read().await {
                    return;
                }
                run_retries(&engine).await;
            })
        })?;

        sched.add(maintenance_job).await?;
        sched.add(retry_job).await?;
        sched.start().await?;

        info!("Scheduler running with cron: {}", cron_expr);
        info!("Notification retries scheduled: {}", retry_cron);

        loop {
            if !*self.running.read().await {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        sched.shutdown().await?;
        Ok(())
    }

    async fn run_with_interval(&self) -> Result<()> {
        let maintenance_mins = self.config.maintenance_interval_minutes.max(1);
        let retry_mins = self.config.retry_interval_minutes.max(1);

        info!(
            "Scheduler running: maintenance every {}m, notification retries every {}m",
            maintenance_mins, retry_mins
        );

        let mut maintenance_interval = interval(Duration::from_secs(u64::from(maintenance_mins) * 60));
        let mut retry_interval = interval(Duration::from_secs(u64::from(retry_mins) * 60));

        loop {
            tokio::select! {
                _ = maintenance_interval.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                    run_maintenance(&self.engine).await;
                }
                _ = retry_interval.tick() => {
                    if !*self.running.read().await {
                        break;
                    }
                    run_retries(&self.engine).await;
                }
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping scheduler...");
        *self.running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Runs every job once, outside the schedule.
    pub async fn run_once(&self) {
        info!("Running scheduled jobs manually");
        run_maintenance(&self.engine).await;
        run_retries(&self.engine).await;
    }
}

async fn run_maintenance(engine: &Engine) {
    if engine.fence.is_closed() {
        debug!(job_name = "maintenance", "Store is fenced; skipping");
        return;
    }
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "maintenance", "Starting scheduled maintenance");

    match engine.catalog.publish_due().await {
        Ok(published) if !published.is_empty() => {
            info!(job_name = "maintenance", published = published.len(), "Published due episodes");
        }
        Ok(_) => {}
        Err(e) => {
            error!(event = "job_failed", job_name = "publish_due", error = %e, "Scheduled publish failed");
        }
    }

    if let Err(e) = engine.dispatcher.recover_undispatched().await {
        error!(event = "job_failed", job_name = "recover_dispatch", error = %e, "Dispatch recovery failed");
    }

    if let Err(e) = engine.redeem.compact_expired().await {
        error!(event = "job_failed", job_name = "compact_links", error = %e, "Redeem link compaction failed");
    }

    let pruned = engine.locks.prune();

    info!(
        event = "job_finished",
        job_name = "maintenance",
        locks_pruned = pruned,
        duration_ms = elapsed_ms(start),
        "Scheduled maintenance finished"
    );
}

async fn run_retries(engine: &Engine) {
    if engine.fence.is_closed() {
        debug!(job_name = "retry_notifications", "Store is fenced; skipping");
        return;
    }
    let start = std::time::Instant::now();
    info!(event = "job_started", job_name = "retry_notifications", "Starting notification retries");

    if let Err(e) = engine.dispatcher.retry_failed().await {
        error!(event = "job_failed", job_name = "retry_notifications", error = %e, "Notification retry failed");
    }

    info!(
        event = "job_finished",
        job_name = "retry_notifications",
        duration_ms = elapsed_ms(start),
        "Notification retries finished"
    );
}
