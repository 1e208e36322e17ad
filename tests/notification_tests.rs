//! Integration tests for watchlists and new-episode notifications.

mod common;

use std::time::Duration as StdDuration;

use animerealm::domain::UserId;
use animerealm::services::{PublishOutcome, WatchlistError};
use chrono::Duration;
use common::{Harness, SeededEpisode, seed_episode, spawn_engine, spawn_engine_with, test_config};

async fn publish_with_watchers(h: &Harness, watchers: &[i64]) -> (SeededEpisode, PublishOutcome) {
    let seeded = seed_episode(h, "Spy x Family").await;
    for &user in watchers {
        assert!(
            h.engine
                .watchlist
                .watch(UserId::new(user), seeded.series)
                .await
                .unwrap()
        );
    }
    let outcome = h.engine.catalog.publish(seeded.episode).await.unwrap();
    (seeded, outcome)
}

#[tokio::test]
async fn test_each_watcher_notified_exactly_once() {
    let h = spawn_engine().await;
    let (seeded, outcome) = publish_with_watchers(&h, &[1, 2, 3]).await;
    let PublishOutcome::Published(event) = outcome else {
        panic!("episode was not published");
    };

    let report = h.engine.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(report.targeted, 3);
    assert_eq!(report.delivered, 3);

    // Redelivered event and a second publish attempt send nothing new.
    let replay = h.engine.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(replay.delivered, 0);
    assert_eq!(replay.skipped, 3);
    assert!(matches!(
        h.engine.catalog.publish(seeded.episode).await.unwrap(),
        PublishOutcome::AlreadyPublished
    ));

    let mut sent = h.gateway.sent();
    sent.sort();
    assert_eq!(
        sent,
        vec![
            (UserId::new(1), seeded.episode),
            (UserId::new(2), seeded.episode),
            (UserId::new(3), seeded.episode),
        ]
    );
}

#[tokio::test]
async fn test_failed_delivery_is_isolated_and_retried() {
    let h = spawn_engine().await;
    h.gateway.fail_for(UserId::new(2));
    let (seeded, outcome) = publish_with_watchers(&h, &[1, 2, 3]).await;
    let PublishOutcome::Published(event) = outcome else {
        panic!("episode was not published");
    };

    let report = h.engine.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);

    h.gateway.heal();
    let retry = h.engine.dispatcher.retry_failed().await.unwrap();
    assert_eq!(retry.targeted, 1);
    assert_eq!(retry.delivered, 1);

    assert_eq!(h.gateway.sent().len(), 3);
    let markers = h
        .engine
        .store
        .notification_repo()
        .markers_for_episode(seeded.episode)
        .await
        .unwrap();
    assert!(markers.iter().all(|m| m.state == "delivered"));
}

#[tokio::test]
async fn test_delivery_abandoned_after_max_attempts() {
    let mut config = test_config();
    config.notifications.max_attempts = 2;
    let h = spawn_engine_with(config).await;
    h.gateway.fail_for(UserId::new(5));
    let (_, outcome) = publish_with_watchers(&h, &[5]).await;
    let PublishOutcome::Published(event) = outcome else {
        panic!("episode was not published");
    };

    let first = h.engine.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(first.abandoned, 0);

    let second = h.engine.dispatcher.retry_failed().await.unwrap();
    assert_eq!(second.abandoned, 1);

    let third = h.engine.dispatcher.retry_failed().await.unwrap();
    assert_eq!(third.targeted, 0);
    assert!(h.gateway.sent().is_empty());
}

#[tokio::test]
async fn test_muted_users_are_not_targeted() {
    let h = spawn_engine().await;
    h.engine
        .watchlist
        .set_notifications(UserId::new(2), false)
        .await
        .unwrap();
    let (_, outcome) = publish_with_watchers(&h, &[1, 2]).await;
    let PublishOutcome::Published(event) = outcome else {
        panic!("episode was not published");
    };

    let report = h.engine.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(report.targeted, 1);
    assert_eq!(h.gateway.sent().len(), 1);
}

#[tokio::test]
async fn test_recover_undispatched_after_missed_event() {
    let h = spawn_engine().await;
    let (seeded, _) = publish_with_watchers(&h, &[1, 2]).await;

    let report = h.engine.dispatcher.recover_undispatched().await.unwrap();
    assert_eq!(report.delivered, 2);

    let again = h.engine.dispatcher.recover_undispatched().await.unwrap();
    assert_eq!(again.targeted, 0);
    assert!(h.gateway.sent().iter().all(|(_, e)| *e == seeded.episode));
}

#[tokio::test]
async fn test_spawned_dispatcher_follows_event_bus() {
    let h = spawn_engine().await;
    let handle = h.engine.spawn_dispatcher();

    publish_with_watchers(&h, &[1]).await;

    let mut delivered = false;
    for _ in 0..50 {
        if h.gateway.sent().len() == 1 {
            delivered = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    handle.abort();
    assert!(delivered, "dispatcher never delivered the notification");
}

#[tokio::test]
async fn test_watchlist_limit_and_premium_allowance() {
    let mut config = test_config();
    config.watchlist.max_items_free = 1;
    config.watchlist.max_items_premium = 2;
    let h = spawn_engine_with(config).await;
    let user = UserId::new(9);
    let a = seed_episode(&h, "A").await;
    let b = seed_episode(&h, "B").await;

    assert!(h.engine.watchlist.watch(user, a.series).await.unwrap());
    assert!(!h.engine.watchlist.watch(user, a.series).await.unwrap());

    let full = h.engine.watchlist.watch(user, b.series).await;
    assert!(matches!(full, Err(WatchlistError::LimitReached { limit: 1 })));

    h.engine
        .ledger
        .set_premium(user, h.clock_now() + Duration::days(7))
        .await
        .unwrap();
    assert!(h.engine.watchlist.watch(user, b.series).await.unwrap());
    assert_eq!(h.engine.watchlist.watchlist(user).await.unwrap().len(), 2);

    assert!(h.engine.watchlist.unwatch(user, a.series).await.unwrap());
    assert!(!h.engine.watchlist.unwatch(user, a.series).await.unwrap());
}

#[tokio::test]
async fn test_hanging_delivery_times_out_without_blocking_others() {
    let mut config = test_config();
    config.notifications.delivery_timeout_seconds = 1;
    let h = spawn_engine_with(config).await;
    h.gateway.hang_for(UserId::new(2));
    let (seeded, outcome) = publish_with_watchers(&h, &[1, 2, 3]).await;
    let PublishOutcome::Published(event) = outcome else {
        panic!("episode was not published");
    };

    let report = tokio::time::timeout(StdDuration::from_secs(10), h.engine.dispatcher.dispatch(&event))
        .await
        .expect("dispatch must not hang on one user")
        .unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);

    let markers = h
        .engine
        .store
        .notification_repo()
        .markers_for_episode(seeded.episode)
        .await
        .unwrap();
    let stuck = markers.iter().find(|m| m.user_id == 2).unwrap();
    assert_eq!(stuck.state, "failed");
    assert!(stuck.last_error.as_deref().unwrap().contains("timed out"));

    h.gateway.heal();
    let retry = h.engine.dispatcher.retry_failed().await.unwrap();
    assert_eq!(retry.delivered, 1);
    assert_eq!(h.gateway.sent().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_retry_passes_deliver_once() {
    let h = spawn_engine().await;
    h.gateway.fail_for(UserId::new(2));
    let (seeded, outcome) = publish_with_watchers(&h, &[1, 2]).await;
    let PublishOutcome::Published(event) = outcome else {
        panic!("episode was not published");
    };
    let report = h.engine.dispatcher.dispatch(&event).await.unwrap();
    assert_eq!(report.failed, 1);

    h.gateway.heal();
    h.gateway.slow_down(StdDuration::from_millis(200));
    let (first, second) = tokio::join!(
        h.engine.dispatcher.retry_failed(),
        h.engine.dispatcher.retry_failed()
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.delivered + second.delivered, 1);

    let to_user_2 = h
        .gateway
        .sent()
        .into_iter()
        .filter(|(user, episode)| *user == UserId::new(2) && *episode == seeded.episode)
        .count();
    assert_eq!(to_user_2, 1);
}
