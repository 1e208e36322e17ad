use crate::config::Config;
use crate::domain::EpisodeId;
use crate::services::PublishOutcome;
use crate::state::Engine;

pub async fn cmd_publish(config: Config, episode_id: i32) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;

    match engine.catalog.publish(EpisodeId::new(episode_id)).await? {
        PublishOutcome::Published(event) => {
            println!(
                "✓ Published {} S{:02}E{:02}",
                event.series_title, event.season_number, event.episode_number
            );
            // No daemon listener in this process; notify inline.
            let report = engine.dispatcher.dispatch(&event).await?;
            println!(
                "  Notified {} of {} watchers ({} failed, will retry)",
                report.delivered, report.targeted, report.failed
            );
        }
        PublishOutcome::AlreadyPublished => println!("Episode {episode_id} is already published"),
    }
    Ok(())
}

pub async fn cmd_unpublish(config: Config, episode_id: i32) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    if engine.catalog.unpublish(EpisodeId::new(episode_id)).await? {
        println!("✓ Episode {episode_id} unpublished");
    } else {
        println!("Episode {episode_id} was not published");
    }
    Ok(())
}

pub async fn cmd_latest(config: Config, limit: Option<u64>) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let latest = engine.catalog.list_latest(limit).await?;

    if latest.is_empty() {
        println!("No published episodes.");
        return Ok(());
    }

    println!("Latest episodes:");
    println!("{:-<70}", "");
    for item in latest {
        let published = item
            .episode
            .published_at
            .map_or_else(String::new, |t| t.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "• {} S{:02}E{:02}  [{}]  {}",
            item.series_title, item.season_number, item.episode.number, item.episode.id, published
        );
    }
    Ok(())
}

pub async fn cmd_popular(config: Config, limit: Option<u64>) -> anyhow::Result<()> {
    let engine = Engine::new(config).await?;
    let popular = engine.catalog.list_popular(limit).await?;

    if popular.is_empty() {
        println!("Catalog is empty.");
        return Ok(());
    }

    println!("Most popular series:");
    println!("{:-<70}", "");
    for (rank, series) in popular.iter().enumerate() {
        println!(
            "{:>3}. {} ({}) - {} downloads",
            rank + 1,
            series.title,
            series.release_year,
            series.popularity
        );
    }
    Ok(())
}
