//! Integration tests for the token ledger: welcome grant, idempotent
//! application, overdraft rejection and premium expiry.

mod common;

use animerealm::domain::{LedgerCause, UserId};
use animerealm::services::LedgerError;
use chrono::Duration;
use sea_orm::ConnectionTrait;
use common::{spawn_engine, spawn_engine_with, test_config};

#[tokio::test]
async fn test_welcome_grant_applied_once() {
    let mut config = test_config();
    config.tokens.welcome_tokens = 5;
    let h = spawn_engine_with(config).await;
    let user = UserId::new(42);

    let first = h.engine.ledger.register_user(user).await.unwrap();
    let second = h.engine.ledger.register_user(user).await.unwrap();

    assert_eq!(first.balance, 5);
    assert_eq!(second.balance, 5);

    let history = h.engine.ledger.history(user, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].cause, LedgerCause::Welcome);
}

#[tokio::test]
async fn test_unknown_user_reads_as_empty_account() {
    let h = spawn_engine().await;

    let balance = h.engine.ledger.balance(UserId::new(999)).await.unwrap();
    assert_eq!(balance.balance, 0);
    assert!(!balance.premium);
}

#[tokio::test]
async fn test_replayed_key_does_not_double_apply() {
    let h = spawn_engine().await;
    let user = UserId::new(7);

    let first = h
        .engine
        .ledger
        .apply(user, 3, LedgerCause::AdminGrant, "grant-7-a")
        .await
        .unwrap();
    let replay = h
        .engine
        .ledger
        .apply(user, 3, LedgerCause::AdminGrant, "grant-7-a")
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(replay.replayed);
    assert_eq!(replay.entry.id, first.entry.id);
    assert_eq!(h.engine.ledger.balance(user).await.unwrap().balance, 3);
}

#[tokio::test]
async fn test_overdraft_rejected_without_writing() {
    let h = spawn_engine().await;
    let user = UserId::new(8);

    let err = h
        .engine
        .ledger
        .apply(user, -1, LedgerCause::DownloadDebit, "debit-8")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            balance: 0,
            required: 1
        }
    ));

    assert!(h.engine.ledger.history(user, 10).await.unwrap().is_empty());
    assert!(h.engine.ledger.reconcile(user).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_zero_delta_is_invalid() {
    let h = spawn_engine().await;

    let err = h
        .engine
        .ledger
        .admin_adjust(UserId::new(9), 0, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(0)));
}

#[tokio::test]
async fn test_unrepresentable_delta_is_invalid() {
    let h = spawn_engine().await;
    let user = UserId::new(12);

    let err = h
        .engine
        .ledger
        .admin_adjust(user, i64::MIN, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(i64::MIN)));

    let err = h
        .engine
        .ledger
        .apply(user, i64::MIN, LedgerCause::DownloadDebit, "debit-12")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(i64::MIN)));
    assert!(h.engine.ledger.history(user, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_ledger_cause_is_reported() {
    let h = spawn_engine().await;
    let user = UserId::new(13);
    h.engine
        .ledger
        .admin_adjust(user, 2, Some("grant-13"))
        .await
        .unwrap();

    h.engine
        .store
        .conn
        .execute_unprepared("UPDATE ledger_transactions SET cause = 'gift'")
        .await
        .unwrap();

    match h.engine.ledger.history(user, 10).await {
        Err(LedgerError::Database(message)) => assert!(message.contains("Corrupt cause")),
        other => panic!("expected a corruption error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_debits_never_overdraw() {
    let h = spawn_engine().await;
    let user = UserId::new(10);
    h.engine
        .ledger
        .admin_adjust(user, 10, Some("seed-10"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..25 {
        let ledger = h.engine.ledger.clone();
        tasks.push(tokio::spawn(async move {
            ledger
                .apply(user, -1, LedgerCause::DownloadDebit, &format!("debit-10-{i}"))
                .await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientBalance { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 15);

    let reconciliation = h.engine.ledger.reconcile(user).await.unwrap();
    assert_eq!(reconciliation.balance, 0);
    assert!(reconciliation.is_consistent());
}

#[tokio::test]
async fn test_premium_expires_with_clock() {
    let h = spawn_engine().await;
    let user = UserId::new(11);

    let granted = h
        .engine
        .ledger
        .set_premium(user, h.clock_now() + Duration::days(1))
        .await
        .unwrap();
    assert!(granted.premium);

    h.clock.advance(Duration::days(2));
    let later = h.engine.ledger.balance(user).await.unwrap();
    assert!(!later.premium);
    assert!(later.premium_until.is_some());

    let revoked = h.engine.ledger.revoke_premium(user).await.unwrap();
    assert!(revoked.premium_until.is_none());
}
