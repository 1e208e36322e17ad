//! Integration tests for the download gate and anime requests.

mod common;

use animerealm::domain::{RequestStatus, UserId};
use animerealm::services::GateError;
use chrono::Duration;
use common::{seed_episode, spawn_engine, spawn_engine_with, test_config};

#[tokio::test]
async fn test_download_requires_a_token() {
    let h = spawn_engine().await;
    let seeded = seed_episode(&h, "Frieren").await;
    h.engine.catalog.publish(seeded.episode).await.unwrap();
    let user = UserId::new(200);

    let denied = h
        .engine
        .gate
        .authorize(user, seeded.variant_1080, "n1")
        .await
        .unwrap_err();
    assert!(matches!(
        denied,
        GateError::InsufficientBalance {
            balance: 0,
            required: 1
        }
    ));

    h.engine
        .ledger
        .admin_adjust(user, 5, Some("grant-200"))
        .await
        .unwrap();

    let auth = h
        .engine
        .gate
        .authorize(user, seeded.variant_1080, "n2")
        .await
        .unwrap();
    assert_eq!(auth.balance, 4);
    assert!(auth.handle.charged);
    assert!(!auth.replayed);

    let profile = h.engine.stats.profile(user).await.unwrap().unwrap();
    assert_eq!(profile.downloads, 1);
    assert_eq!(profile.balance, 4);
}

#[tokio::test]
async fn test_replayed_nonce_debits_once() {
    let h = spawn_engine().await;
    let seeded = seed_episode(&h, "Dandadan").await;
    h.engine.catalog.publish(seeded.episode).await.unwrap();
    let user = UserId::new(201);
    h.engine
        .ledger
        .admin_adjust(user, 3, Some("grant-201"))
        .await
        .unwrap();

    let first = h
        .engine
        .gate
        .authorize(user, seeded.variant_1080, "tap-1")
        .await
        .unwrap();
    let replay = h
        .engine
        .gate
        .authorize(user, seeded.variant_1080, "tap-1")
        .await
        .unwrap();

    assert!(replay.replayed);
    assert_eq!(replay.handle.id, first.handle.id);
    assert_eq!(h.engine.ledger.balance(user).await.unwrap().balance, 2);
}

#[tokio::test]
async fn test_handle_consumed_once() {
    let h = spawn_engine().await;
    let seeded = seed_episode(&h, "Mushishi").await;
    h.engine.catalog.publish(seeded.episode).await.unwrap();
    let user = UserId::new(202);
    h.engine
        .ledger
        .admin_adjust(user, 1, Some("grant-202"))
        .await
        .unwrap();

    let auth = h
        .engine
        .gate
        .authorize(user, seeded.variant_1080, "n")
        .await
        .unwrap();

    let delivery = h.engine.gate.consume_handle(&auth.handle.id).await.unwrap();
    assert_eq!(delivery.storage_ref, "file-1080p");
    assert_eq!(delivery.user_id, user);

    let second = h.engine.gate.consume_handle(&auth.handle.id).await;
    assert!(matches!(second, Err(GateError::AlreadyConsumed)));
}

#[tokio::test]
async fn test_unpublished_episode_not_available() {
    let h = spawn_engine().await;
    let seeded = seed_episode(&h, "Planetes").await;
    let user = UserId::new(203);
    h.engine
        .ledger
        .admin_adjust(user, 1, Some("grant-203"))
        .await
        .unwrap();

    let result = h
        .engine
        .gate
        .authorize(user, seeded.variant_1080, "n")
        .await;
    assert!(matches!(result, Err(GateError::NotAvailable(_))));
    assert_eq!(h.engine.ledger.balance(user).await.unwrap().balance, 1);
}

#[tokio::test]
async fn test_premium_only_quality_and_premium_bypass() {
    let mut config = test_config();
    config.tokens.premium_only_qualities = vec!["2160P".to_string()];
    let h = spawn_engine_with(config).await;
    let seeded = seed_episode(&h, "Vinland Saga").await;
    h.engine.catalog.publish(seeded.episode).await.unwrap();
    let user = UserId::new(204);
    h.engine
        .ledger
        .admin_adjust(user, 2, Some("grant-204"))
        .await
        .unwrap();

    let denied = h
        .engine
        .gate
        .authorize(user, seeded.variant_2160, "n1")
        .await;
    assert!(matches!(denied, Err(GateError::PremiumRequired { .. })));

    h.engine
        .ledger
        .set_premium(user, h.clock_now() + Duration::days(30))
        .await
        .unwrap();

    let auth = h
        .engine
        .gate
        .authorize(user, seeded.variant_2160, "n2")
        .await
        .unwrap();
    assert!(auth.premium);
    assert!(!auth.handle.charged);
    assert_eq!(auth.balance, 2);
}

#[tokio::test]
async fn test_request_charges_free_users_and_replays() {
    let mut config = test_config();
    config.tokens.request_token_cost = 2;
    let h = spawn_engine_with(config).await;
    let user = UserId::new(205);
    h.engine
        .ledger
        .admin_adjust(user, 3, Some("grant-205"))
        .await
        .unwrap();

    let request = h
        .engine
        .gate
        .request_addition(user, "  Ping Pong  ", Some("ja"), "r1")
        .await
        .unwrap();
    assert_eq!(request.title, "Ping Pong");
    assert_eq!(request.cost, 2);
    assert_eq!(request.status, RequestStatus::Pending);

    let replay = h
        .engine
        .gate
        .request_addition(user, "Ping Pong", Some("ja"), "r1")
        .await
        .unwrap();
    assert_eq!(replay.id, request.id);
    assert_eq!(h.engine.ledger.balance(user).await.unwrap().balance, 1);

    let broke = h
        .engine
        .gate
        .request_addition(user, "Kaiba", None, "r2")
        .await;
    assert!(matches!(broke, Err(GateError::InsufficientBalance { .. })));

    let pending = h.engine.gate.pending_requests(0).await.unwrap();
    assert_eq!(pending.total, 1);

    let resolved = h
        .engine
        .gate
        .resolve_request(request.id, RequestStatus::Fulfilled, Some("added"))
        .await
        .unwrap();
    assert_eq!(resolved.status, RequestStatus::Fulfilled);
    assert!(h.engine.gate.pending_requests(0).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn test_empty_request_title_rejected() {
    let h = spawn_engine().await;

    let result = h
        .engine
        .gate
        .request_addition(UserId::new(206), "   ", None, "r")
        .await;
    assert!(matches!(result, Err(GateError::InvalidData(_))));
}
