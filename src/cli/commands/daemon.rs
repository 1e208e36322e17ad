use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use crate::config::Config;
use crate::services::Scheduler;
use crate::state::Engine;

pub async fn cmd_daemon(config: Config) -> anyhow::Result<()> {
    info!(
        "AnimeRealm v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let scheduler_config = config.scheduler.clone();
    let engine = Arc::new(Engine::new(config).await?);

    let dispatcher_handle = engine.spawn_dispatcher();

    // Catch up on anything published while no dispatcher was listening.
    match engine.dispatcher.recover_undispatched().await {
        Ok(report) if report.targeted > 0 => {
            info!(delivered = report.delivered, failed = report.failed, "Recovered undispatched episodes");
        }
        Ok(_) => {}
        Err(e) => error!("Startup dispatch recovery failed: {}", e),
    }

    let scheduler = Scheduler::new(Arc::clone(&engine), scheduler_config);
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            error!("Scheduler error: {}", e);
        }
    });

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    scheduler_handle.abort();
    dispatcher_handle.abort();
    info!("Daemon stopped");

    Ok(())
}
