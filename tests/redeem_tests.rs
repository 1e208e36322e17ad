//! Integration tests for redeem links: single credit under concurrent
//! callbacks, expiry, rate limits and compaction.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration as StdDuration;

use animerealm::domain::{LedgerCause, LinkState, UserId};
use animerealm::services::RedeemError;
use chrono::Duration;
use common::{spawn_engine, spawn_engine_with, test_config};

#[tokio::test]
async fn test_issue_and_resolve_credits_once() {
    let h = spawn_engine().await;
    let user = UserId::new(100);

    let issued = h.engine.redeem.issue(user).await.unwrap();
    assert!(issued.long_url.contains(&issued.link.token));
    assert!(issued.short_url.starts_with("https://short.test/"));
    assert_eq!(issued.link.state, LinkState::Pending);

    let redemption = h.engine.redeem.resolve(&issued.link.token, None).await.unwrap();
    assert_eq!(redemption.user_id, user);
    assert_eq!(redemption.credited, 1);
    assert_eq!(redemption.balance, 1);

    let again = h.engine.redeem.resolve(&issued.link.token, None).await;
    assert!(matches!(again, Err(RedeemError::AlreadyCompleted)));
    assert_eq!(h.engine.ledger.balance(user).await.unwrap().balance, 1);
}

#[tokio::test]
async fn test_concurrent_resolve_credits_exactly_once() {
    let h = spawn_engine().await;
    let user = UserId::new(101);
    let issued = h.engine.redeem.issue(user).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let redeem = h.engine.redeem.clone();
        let token = issued.link.token.clone();
        tasks.push(tokio::spawn(async move { redeem.resolve(&token, None).await }));
    }

    let mut credited = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => credited += 1,
            Err(RedeemError::AlreadyCompleted) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(credited, 1);
    assert_eq!(h.engine.ledger.balance(user).await.unwrap().balance, 1);
    assert_eq!(h.engine.ledger.history(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_link_expires_after_an_hour() {
    let h = spawn_engine().await;
    let user = UserId::new(102);
    let issued = h.engine.redeem.issue(user).await.unwrap();

    h.clock.advance(Duration::minutes(61));

    let result = h.engine.redeem.resolve(&issued.link.token, None).await;
    assert!(matches!(result, Err(RedeemError::Expired)));

    let status = h.engine.redeem.link_status(&issued.link.token).await.unwrap();
    assert_eq!(status.effective_state(h.clock_now()), LinkState::Expired);
    assert_eq!(h.engine.ledger.balance(user).await.unwrap().balance, 0);
}

#[tokio::test]
async fn test_unknown_token_not_found() {
    let h = spawn_engine().await;

    let result = h.engine.redeem.resolve("no-such-token", None).await;
    assert!(matches!(result, Err(RedeemError::NotFound)));
}

#[tokio::test]
async fn test_live_pending_link_rate_limits_issue() {
    let h = spawn_engine().await;
    let user = UserId::new(103);

    h.engine.redeem.issue(user).await.unwrap();
    let second = h.engine.redeem.issue(user).await;
    assert!(matches!(second, Err(RedeemError::RateLimited(_))));

    h.clock.advance(Duration::minutes(61));
    assert!(h.engine.redeem.issue(user).await.is_ok());
}

#[tokio::test]
async fn test_daily_limit_counts_completed_redeems() {
    let mut config = test_config();
    config.redeem.daily_redeem_limit = 1;
    let h = spawn_engine_with(config).await;
    let user = UserId::new(104);

    let issued = h.engine.redeem.issue(user).await.unwrap();
    h.engine.redeem.resolve(&issued.link.token, None).await.unwrap();

    let blocked = h.engine.redeem.issue(user).await;
    assert!(matches!(blocked, Err(RedeemError::RateLimited(_))));

    h.clock.advance(Duration::days(1));
    assert!(h.engine.redeem.issue(user).await.is_ok());
}

#[tokio::test]
async fn test_shortener_failure_falls_back_to_long_link() {
    let h = spawn_engine().await;
    let user = UserId::new(105);

    h.shortener.broken.store(true, Ordering::SeqCst);
    let issued = h.engine.redeem.issue(user).await.unwrap();
    assert_eq!(issued.short_url, issued.long_url);
    assert!(issued.long_url.contains(&issued.link.token));

    // The fallback link is a real pending link that still earns.
    let redemption = h.engine.redeem.resolve(&issued.link.token, None).await.unwrap();
    assert_eq!(redemption.balance, 1);
}

#[tokio::test]
async fn test_hanging_shortener_is_bounded_by_timeout() {
    let mut config = test_config();
    config.shortener.timeout_seconds = 1;
    let h = spawn_engine_with(config).await;
    let user = UserId::new(107);

    h.shortener.hanging.store(true, Ordering::SeqCst);
    let issued = tokio::time::timeout(StdDuration::from_secs(10), h.engine.redeem.issue(user))
        .await
        .expect("issue must not wait on a hanging shortener")
        .unwrap();
    assert_eq!(issued.short_url, issued.long_url);
    assert_eq!(issued.link.state, LinkState::Pending);
}

#[tokio::test]
async fn test_claimant_gets_joining_bonus_once() {
    let h = spawn_engine().await;
    let creator = UserId::new(108);
    let joiner = UserId::new(109);
    let issued = h.engine.redeem.issue(creator).await.unwrap();

    let redemption = h
        .engine
        .redeem
        .resolve(&issued.link.token, Some(joiner))
        .await
        .unwrap();
    assert_eq!(redemption.balance, 1);
    assert_eq!(redemption.claimed_by, Some(joiner));
    assert_eq!(redemption.joiner_credited, 5);

    let again = h.engine.redeem.resolve(&issued.link.token, Some(joiner)).await;
    assert!(matches!(again, Err(RedeemError::AlreadyCompleted)));

    assert_eq!(h.engine.ledger.balance(joiner).await.unwrap().balance, 5);
    let history = h.engine.ledger.history(joiner, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].cause, LedgerCause::ReferralJoin);

    let status = h.engine.redeem.link_status(&issued.link.token).await.unwrap();
    assert_eq!(status.claimed_by, Some(joiner));
}

#[tokio::test]
async fn test_creator_claiming_own_link_gets_no_bonus() {
    let h = spawn_engine().await;
    let creator = UserId::new(110);
    let issued = h.engine.redeem.issue(creator).await.unwrap();

    let redemption = h
        .engine
        .redeem
        .resolve(&issued.link.token, Some(creator))
        .await
        .unwrap();
    assert_eq!(redemption.joiner_credited, 0);
    assert_eq!(h.engine.ledger.balance(creator).await.unwrap().balance, 1);
}

#[tokio::test]
async fn test_compaction_respects_grace_window() {
    let h = spawn_engine().await;
    let issued = h.engine.redeem.issue(UserId::new(106)).await.unwrap();

    h.clock.advance(Duration::hours(2));
    assert_eq!(h.engine.redeem.compact_expired().await.unwrap(), 0);

    h.clock.advance(Duration::hours(24));
    assert_eq!(h.engine.redeem.compact_expired().await.unwrap(), 1);

    let gone = h.engine.redeem.link_status(&issued.link.token).await;
    assert!(matches!(gone, Err(RedeemError::NotFound)));
}
