//! Shared harness: a fresh SQLite file per test, a manual clock and
//! in-process collaborators.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use animerealm::clients::gateway::PresentationGateway;
use animerealm::clients::search_index::TitleIndex;
use animerealm::clients::shortener::Shortener;
use animerealm::config::Config;
use animerealm::db::Store;
use animerealm::domain::events::NotificationPayload;
use animerealm::domain::{EpisodeId, ManualClock, SeriesStatus, UserId, VariantId};
use animerealm::models::catalog::{EpisodeInput, SeriesInput, VariantInput};
use animerealm::state::{Collaborators, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Records every delivery; users in `failing` get an error instead and users
/// in `hanging` never get an answer. `latency` delays every call.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(UserId, EpisodeId)>>,
    pub failing: Mutex<HashSet<UserId>>,
    pub hanging: Mutex<HashSet<UserId>>,
    pub latency: Mutex<Option<std::time::Duration>>,
}

impl RecordingGateway {
    pub fn fail_for(&self, user: UserId) {
        self.failing.lock().unwrap().insert(user);
    }

    pub fn hang_for(&self, user: UserId) {
        self.hanging.lock().unwrap().insert(user);
    }

    pub fn slow_down(&self, latency: std::time::Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.hanging.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<(UserId, EpisodeId)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PresentationGateway for RecordingGateway {
    async fn deliver(&self, user: UserId, payload: &NotificationPayload) -> anyhow::Result<()> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let hangs = self.hanging.lock().unwrap().contains(&user);
        if hangs {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(&user) {
            anyhow::bail!("chat unreachable for {user}");
        }
        let NotificationPayload::NewEpisode { episode_id, .. } = payload;
        self.sent.lock().unwrap().push((user, *episode_id));
        Ok(())
    }
}

#[derive(Default)]
pub struct StubShortener {
    pub calls: AtomicUsize,
    pub broken: AtomicBool,
    pub hanging: AtomicBool,
}

#[async_trait::async_trait]
impl Shortener for StubShortener {
    async fn shorten(&self, long_url: &str) -> anyhow::Result<String> {
        if self.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.broken.load(Ordering::SeqCst) {
            anyhow::bail!("shortener returned 503");
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://short.test/{n}?to={}", long_url.len()))
    }
}

pub struct Harness {
    pub engine: Engine,
    pub clock: ManualClock,
    pub gateway: Arc<RecordingGateway>,
    pub shortener: Arc<StubShortener>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    let db_path =
        std::env::temp_dir().join(format!("animerealm-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.general.owner_id = Some(1);
    config.tokens.welcome_tokens = 0;
    config
}

pub async fn spawn_engine() -> Harness {
    spawn_engine_with(test_config()).await
}

pub async fn spawn_engine_with(config: Config) -> Harness {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await
    .expect("failed to open store");

    let clock = ManualClock::new(start_time());
    let gateway = Arc::new(RecordingGateway::default());
    let shortener = Arc::new(StubShortener::default());

    let collaborators = Collaborators {
        clock: Arc::new(clock.clone()),
        gateway: gateway.clone(),
        shortener: shortener.clone(),
        search: Arc::new(TitleIndex::new()),
    };

    let engine = Engine::with_collaborators(config, store, collaborators)
        .await
        .expect("failed to build engine");

    Harness {
        engine,
        clock,
        gateway,
        shortener,
    }
}

pub struct SeededEpisode {
    pub series: animerealm::domain::SeriesId,
    pub episode: EpisodeId,
    pub variant_1080: VariantId,
    pub variant_2160: VariantId,
}

/// One series with one released (but unpublished) episode and two variants.
pub async fn seed_episode(h: &Harness, title: &str) -> SeededEpisode {
    let catalog = &h.engine.catalog;
    let series = catalog
        .create_series(SeriesInput {
            title: title.to_string(),
            synopsis: "Test synopsis".to_string(),
            genres: vec!["action".to_string()],
            release_year: 2024,
            status: SeriesStatus::Ongoing,
            poster_ref: None,
        })
        .await
        .expect("create series");
    let season = catalog.create_season(series.id, 1).await.expect("create season");
    let episode = catalog
        .create_episode(EpisodeInput {
            season_id: season.id,
            number: 1,
            release_at: h.clock_now() - Duration::hours(1),
            auto_publish: false,
        })
        .await
        .expect("create episode");

    let mut variants = Vec::new();
    for quality in ["1080p", "2160p"] {
        let variant = catalog
            .create_variant(VariantInput {
                episode_id: episode.id,
                quality: quality.to_string(),
                audio_language: "ja".to_string(),
                subtitle_language: "en".to_string(),
                storage_ref: format!("file-{quality}"),
                file_size_bytes: Some(1_000_000),
            })
            .await
            .expect("create variant");
        variants.push(variant.id);
    }

    SeededEpisode {
        series: series.id,
        episode: episode.id,
        variant_1080: variants[0],
        variant_2160: variants[1],
    }
}

impl Harness {
    pub fn clock_now(&self) -> DateTime<Utc> {
        use animerealm::domain::Clock;
        self.clock.now()
    }
}
