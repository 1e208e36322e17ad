//! Integration tests for the full wipe and the operation fence.

mod common;

use animerealm::domain::{MaintenanceState, UserId};
use animerealm::services::{LedgerError, MaintenanceError};
use common::{seed_episode, spawn_engine, spawn_engine_with, test_config};

#[tokio::test]
async fn test_wipe_requires_owner() {
    let h = spawn_engine().await;

    let result = h.engine.maintenance.full_wipe(UserId::new(2)).await;
    assert!(matches!(result, Err(MaintenanceError::NotOwner)));

    let mut config = test_config();
    config.general.owner_id = None;
    let unowned = spawn_engine_with(config).await;
    let result = unowned.engine.maintenance.full_wipe(UserId::new(1)).await;
    assert!(matches!(result, Err(MaintenanceError::OwnerNotConfigured)));
}

#[tokio::test]
async fn test_wipe_clears_everything_and_stays_fenced() {
    let h = spawn_engine().await;
    let seeded = seed_episode(&h, "Bocchi").await;
    h.engine.catalog.publish(seeded.episode).await.unwrap();
    let user = UserId::new(300);
    h.engine
        .ledger
        .admin_adjust(user, 4, Some("grant-300"))
        .await
        .unwrap();
    h.engine.watchlist.watch(user, seeded.series).await.unwrap();
    h.engine
        .gate
        .authorize(user, seeded.variant_1080, "n")
        .await
        .unwrap();

    let report = h.engine.maintenance.full_wipe(UserId::new(1)).await.unwrap();
    assert!(report.total() > 0);

    let stats = h.engine.stats.system_stats().await.unwrap();
    assert_eq!(stats.series, 0);
    assert_eq!(stats.episodes, 0);
    assert_eq!(stats.downloads, 0);
    assert_eq!(stats.tokens_in_circulation, 0);
    assert_eq!(stats.maintenance, MaintenanceState::Wiped);

    assert!(h.engine.catalog.search("Bocchi").await.unwrap().is_empty());
    assert!(h.engine.watchlist.watchlist(user).await.unwrap().is_empty());

    // Nothing is honored after a completed wipe.
    assert!(h.engine.fence.is_closed());
    let result = h
        .engine
        .ledger
        .admin_adjust(user, 1, Some("grant-300-after"))
        .await;
    assert!(matches!(result, Err(LedgerError::Fatal(_))));
    let result = h.engine.gate.authorize(user, seeded.variant_1080, "n2").await;
    assert!(result.is_err());
    let again = h.engine.maintenance.full_wipe(UserId::new(1)).await;
    assert!(matches!(again, Err(MaintenanceError::Fenced(_))));
}

#[tokio::test]
async fn test_completed_wipe_stays_fenced_across_restart() {
    let config = test_config();
    let h = spawn_engine_with(config.clone()).await;
    h.engine.maintenance.full_wipe(UserId::new(1)).await.unwrap();
    drop(h);

    let restarted = spawn_engine_with(config).await;
    assert!(restarted.engine.fence.is_closed());
    assert_eq!(
        restarted.engine.maintenance.maintenance_state().await.unwrap(),
        MaintenanceState::Wiped
    );
    let result = restarted
        .engine
        .ledger
        .admin_adjust(UserId::new(302), 1, Some("k"))
        .await;
    assert!(matches!(result, Err(LedgerError::Fatal(_))));

    // The operator starts over with an empty store.
    restarted.engine.maintenance.clear_wipe_flag().await.unwrap();
    let receipt = restarted
        .engine
        .ledger
        .admin_adjust(UserId::new(302), 1, Some("k"))
        .await
        .unwrap();
    assert_eq!(receipt.entry.balance_after, 1);
}

#[tokio::test]
async fn test_interrupted_wipe_keeps_store_fenced() {
    let config = test_config();
    let h = spawn_engine_with(config.clone()).await;
    h.engine
        .store
        .system_repo()
        .set_maintenance(MaintenanceState::WipeInProgress, h.clock_now())
        .await
        .unwrap();
    drop(h);

    // A restart finds the flag and refuses writes until it is cleared.
    let restarted = spawn_engine_with(config).await;
    assert!(restarted.engine.fence.is_closed());

    let result = restarted
        .engine
        .ledger
        .admin_adjust(UserId::new(301), 1, Some("k"))
        .await;
    assert!(matches!(result, Err(LedgerError::Fatal(_))));

    restarted.engine.maintenance.clear_wipe_flag().await.unwrap();
    assert_eq!(
        restarted.engine.maintenance.maintenance_state().await.unwrap(),
        MaintenanceState::Active
    );
    restarted
        .engine
        .ledger
        .admin_adjust(UserId::new(301), 1, Some("k"))
        .await
        .unwrap();
}
