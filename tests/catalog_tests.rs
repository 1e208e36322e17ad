//! Integration tests for the content catalog.

mod common;

use animerealm::domain::SeriesStatus;
use animerealm::domain::events::CatalogEvent;
use animerealm::models::catalog::{CatalogFilter, EpisodeInput, SeriesInput, VariantInput};
use animerealm::services::{CatalogError, PublishOutcome};
use chrono::Duration;
use common::{seed_episode, spawn_engine};

fn series_input(title: &str, year: i32) -> SeriesInput {
    SeriesInput {
        title: title.to_string(),
        synopsis: String::new(),
        genres: vec!["drama".to_string()],
        release_year: year,
        status: SeriesStatus::Completed,
        poster_ref: None,
    }
}

#[tokio::test]
async fn test_series_validation() {
    let h = spawn_engine().await;

    let blank = h.engine.catalog.create_series(series_input("  ", 2020)).await;
    assert!(matches!(blank, Err(CatalogError::InvalidData(_))));

    let ancient = h.engine.catalog.create_series(series_input("Old", 1800)).await;
    assert!(matches!(ancient, Err(CatalogError::InvalidData(_))));
}

#[tokio::test]
async fn test_duplicate_season_and_variant_conflict() {
    let h = spawn_engine().await;
    let seeded = seed_episode(&h, "Monster").await;

    let season = h.engine.catalog.create_season(seeded.series, 1).await;
    assert!(matches!(season, Err(CatalogError::Conflict(_))));

    let variant = h
        .engine
        .catalog
        .create_variant(VariantInput {
            episode_id: seeded.episode,
            quality: "1080p".to_string(),
            audio_language: "ja".to_string(),
            subtitle_language: "en".to_string(),
            storage_ref: "another-file".to_string(),
            file_size_bytes: None,
        })
        .await;
    assert!(matches!(variant, Err(CatalogError::Conflict(_))));
}

#[tokio::test]
async fn test_publish_emits_event_once() {
    let h = spawn_engine().await;
    let seeded = seed_episode(&h, "Haikyu").await;
    let mut events = h.engine.event_bus.subscribe();

    let first = h.engine.catalog.publish(seeded.episode).await.unwrap();
    let second = h.engine.catalog.publish(seeded.episode).await.unwrap();

    assert!(matches!(first, PublishOutcome::Published(_)));
    assert!(matches!(second, PublishOutcome::AlreadyPublished));

    match events.try_recv().unwrap() {
        CatalogEvent::EpisodePublished(event) => {
            assert_eq!(event.episode_id, seeded.episode);
            assert_eq!(event.series_title, "Haikyu");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_future_episode_not_published_until_due() {
    let h = spawn_engine().await;
    let series = h
        .engine
        .catalog
        .create_series(series_input("Oshi no Ko", 2023))
        .await
        .unwrap();
    let season = h.engine.catalog.create_season(series.id, 2).await.unwrap();
    let episode = h
        .engine
        .catalog
        .create_episode(EpisodeInput {
            season_id: season.id,
            number: 1,
            release_at: h.clock_now() + Duration::hours(3),
            auto_publish: true,
        })
        .await
        .unwrap();

    let early = h.engine.catalog.publish(episode.id).await;
    assert!(matches!(early, Err(CatalogError::NotYetReleased { .. })));
    assert!(h.engine.catalog.publish_due().await.unwrap().is_empty());

    h.clock.advance(Duration::hours(4));
    assert_eq!(h.engine.catalog.publish_due().await.unwrap(), vec![episode.id]);
    assert!(h.engine.catalog.get_episode(episode.id).await.unwrap().published);
}

#[tokio::test]
async fn test_latest_lists_only_published() {
    let h = spawn_engine().await;
    let shown = seed_episode(&h, "Shown").await;
    seed_episode(&h, "Hidden").await;
    h.engine.catalog.publish(shown.episode).await.unwrap();

    let latest = h.engine.catalog.list_latest(None).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].series_title, "Shown");

    h.engine.catalog.unpublish(shown.episode).await.unwrap();
    assert!(h.engine.catalog.list_latest(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_popularity_orders_popular_list() {
    let h = spawn_engine().await;
    let a = seed_episode(&h, "Alpha").await;
    let b = seed_episode(&h, "Beta").await;

    h.engine.catalog.increment_popularity(b.series).await.unwrap();
    h.engine.catalog.increment_popularity(b.series).await.unwrap();
    h.engine.catalog.increment_popularity(a.series).await.unwrap();

    let popular = h.engine.catalog.list_popular(Some(2)).await.unwrap();
    let titles: Vec<_> = popular.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["Beta", "Alpha"]);
}

#[tokio::test]
async fn test_filter_and_search() {
    let h = spawn_engine().await;
    h.engine
        .catalog
        .create_series(series_input("Cowboy Bebop", 1998))
        .await
        .unwrap();
    h.engine
        .catalog
        .create_series(series_input("Samurai Champloo", 2004))
        .await
        .unwrap();

    let page = h
        .engine
        .catalog
        .list(
            CatalogFilter {
                year: Some(1998),
                ..CatalogFilter::default()
            },
            0,
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Cowboy Bebop");

    let hits = h.engine.catalog.search("cowboy bebop").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Cowboy Bebop");

    assert_eq!(h.engine.catalog.rebuild_search_index().await.unwrap(), 2);
}
