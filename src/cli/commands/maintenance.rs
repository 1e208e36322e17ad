use std::sync::Arc;

use crate::config::Config;
use crate::domain::{MaintenanceState, UserId};
use crate::services::Scheduler;
use crate::state::Engine;

pub async fn cmd_compact(config: Config) -> anyhow::Result<()> {
    let scheduler_config = config.scheduler.clone();
    let engine = Arc::new(Engine::new(config).await?);

    let removed = engine.redeem.compact_expired().await?;
    println!("✓ Removed {removed} expired redeem links");

    Scheduler::new(engine, scheduler_config).run_once().await;
    println!("✓ Scheduled jobs ran once");
    Ok(())
}

pub async fn cmd_wipe(config: Config, caller: i64, yes: bool) -> anyhow::Result<()> {
    if !yes {
        println!("This deletes every series, episode, balance and watchlist.");
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }

    let engine = Engine::new(config).await?;
    let report = engine.maintenance.full_wipe(UserId::new(caller)).await?;

    println!("✓ Wipe completed; the store stays fenced until `animerealm clear-wipe`");
    for (step, removed) in &report.steps {
        println!("  {step:<14} {removed}");
    }
    Ok(())
}

pub async fn cmd_wipe_status(config: Config) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    match engine.maintenance.maintenance_state().await? {
        MaintenanceState::Active => println!("Store is active"),
        MaintenanceState::WipeInProgress => {
            println!("⚠ A wipe did not finish. Writes are fenced.");
            println!("  Inspect the data, then run `animerealm clear-wipe`.");
        }
        MaintenanceState::Wiped => {
            println!("Store was wiped. Writes are fenced.");
            println!("  Run `animerealm clear-wipe` to start over with an empty store.");
        }
    }
    Ok(())
}

pub async fn cmd_clear_wipe(config: Config) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    engine.maintenance.clear_wipe_flag().await?;
    println!("✓ Wipe flag cleared; store is active");
    Ok(())
}
