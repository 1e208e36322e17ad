use crate::config::Config;
use crate::state::Engine;

pub async fn cmd_leaderboard(config: Config, limit: Option<u64>) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let entries = engine.stats.leaderboard(limit).await?;

    if entries.is_empty() {
        println!("No downloads yet.");
        return Ok(());
    }

    println!("Top downloaders:");
    for (rank, entry) in entries.iter().enumerate() {
        println!("{:>3}. user {} - {} downloads", rank + 1, entry.user_id, entry.downloads);
    }
    Ok(())
}

pub async fn cmd_stats(config: Config) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let stats = engine.stats.system_stats().await?;

    println!("AnimeRealm statistics");
    println!("{:-<40}", "");
    println!("Users:              {} ({} premium)", stats.users, stats.premium_users);
    println!("Series:             {}", stats.series);
    println!(
        "Episodes:           {} ({} published)",
        stats.episodes, stats.published_episodes
    );
    println!("File variants:      {}", stats.variants);
    println!("Downloads:          {}", stats.downloads);
    println!("Tokens in wallets:  {}", stats.tokens_in_circulation);
    println!("Pending requests:   {}", stats.pending_requests);
    println!("Maintenance state:  {}", stats.maintenance);
    Ok(())
}

pub async fn cmd_requests(config: Config, page: u64) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let requests = engine.gate.pending_requests(page).await?;

    if requests.items.is_empty() {
        println!("No pending requests.");
        return Ok(());
    }

    println!(
        "Pending requests (page {} of {}, {} total):",
        requests.page + 1,
        requests.total_pages(),
        requests.total
    );
    println!("{:-<70}", "");
    for request in &requests.items {
        let tier = if request.premium { "★" } else { " " };
        let language = request.language.as_deref().unwrap_or("any");
        println!(
            "{tier} #{} {} [{}] from user {} at {}",
            request.id,
            request.title,
            language,
            request.user_id,
            request.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
