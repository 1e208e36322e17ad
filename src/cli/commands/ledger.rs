use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::domain::UserId;
use crate::models::ledger::Balance;
use crate::state::Engine;

fn print_balance(balance: &Balance) {
    println!("User {}", balance.user_id);
    println!("  Balance: {} tokens", balance.balance);
    match (balance.premium, balance.premium_until) {
        (true, Some(until)) => println!("  Premium: active until {until}"),
        (false, Some(until)) => println!("  Premium: expired at {until}"),
        _ => println!("  Premium: no"),
    }
}

pub async fn cmd_balance(config: Config, user_id: i64, history: u64) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let user = UserId::new(user_id);

    let balance = engine.ledger.balance(user).await?;
    print_balance(&balance);

    let entries = engine.ledger.history(user, history).await?;
    if entries.is_empty() {
        return Ok(());
    }

    println!();
    println!("Recent transactions:");
    println!("{:-<70}", "");
    for entry in entries {
        println!(
            "{:>+6}  {:<15} -> {:>6}  {}",
            entry.delta,
            entry.cause.as_str(),
            entry.balance_after,
            entry.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    let reconciliation = engine.ledger.reconcile(user).await?;
    if !reconciliation.is_consistent() {
        println!();
        println!(
            "⚠ Ledger mismatch: balance {} but transactions sum to {}",
            reconciliation.balance, reconciliation.ledger_sum
        );
    }

    Ok(())
}

pub async fn cmd_adjust(
    config: Config,
    user_id: i64,
    delta: i64,
    key: Option<String>,
) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let receipt = engine
        .ledger
        .admin_adjust(UserId::new(user_id), delta, key.as_deref())
        .await?;

    if receipt.replayed {
        println!(
            "Key {} was already applied; balance unchanged at {}",
            receipt.entry.idempotency_key, receipt.entry.balance_after
        );
    } else {
        println!(
            "✓ Applied {:+} to user {}; balance is now {}",
            delta, user_id, receipt.entry.balance_after
        );
    }
    Ok(())
}

pub async fn cmd_premium(
    config: Config,
    user_id: i64,
    until: Option<DateTime<Utc>>,
    days: i64,
) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let until = until.unwrap_or_else(|| engine.clock.now() + Duration::days(days));

    let balance = engine.ledger.set_premium(UserId::new(user_id), until).await?;
    println!("✓ Premium granted");
    print_balance(&balance);
    Ok(())
}

pub async fn cmd_unpremium(config: Config, user_id: i64) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let balance = engine.ledger.revoke_premium(UserId::new(user_id)).await?;
    println!("✓ Premium revoked");
    print_balance(&balance);
    Ok(())
}
