//! Integration tests for the periodic maintenance pass.

mod common;

use std::sync::Arc;

use animerealm::domain::UserId;
use animerealm::models::catalog::EpisodeInput;
use animerealm::services::Scheduler;
use chrono::Duration;
use common::{seed_episode, spawn_engine, test_config};

#[tokio::test]
async fn test_run_once_publishes_due_episodes_and_notifies() {
    let h = spawn_engine().await;
    let seeded = seed_episode(&h, "Blue Period").await;
    h.engine
        .watchlist
        .watch(UserId::new(1), seeded.series)
        .await
        .unwrap();

    let season = h.engine.catalog.seasons(seeded.series).await.unwrap()[0].id;
    let upcoming = h
        .engine
        .catalog
        .create_episode(EpisodeInput {
            season_id: season,
            number: 2,
            release_at: h.clock_now() + Duration::minutes(30),
            auto_publish: true,
        })
        .await
        .unwrap();

    let scheduler = Scheduler::new(Arc::new(h.engine.clone()), test_config().scheduler);

    scheduler.run_once().await;
    assert!(!h.engine.catalog.get_episode(upcoming.id).await.unwrap().published);
    assert!(h.gateway.sent().is_empty());

    h.clock.advance(Duration::hours(1));
    scheduler.run_once().await;

    assert!(h.engine.catalog.get_episode(upcoming.id).await.unwrap().published);
    assert_eq!(h.gateway.sent(), vec![(UserId::new(1), upcoming.id)]);
}

#[tokio::test]
async fn test_disabled_scheduler_returns_immediately() {
    let h = spawn_engine().await;
    let mut config = test_config().scheduler;
    config.enabled = false;

    let scheduler = Scheduler::new(Arc::new(h.engine.clone()), config);
    scheduler.start().await.unwrap();
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn test_stop_ends_interval_loop() {
    let h = spawn_engine().await;
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(h.engine.clone()),
        test_config().scheduler,
    ));

    let runner = Arc::clone(&scheduler);
    let handle = tokio::spawn(async move { runner.start().await });

    for _ in 0..50 {
        if scheduler.is_running().await {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(scheduler.is_running().await);

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
    handle.abort();
}
