//! Events flowing between components and payloads handed to the
//! presentation gateway.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EpisodeId, SeriesId, UserId};

/// Emitted by the catalog. `EpisodePublished` is produced at most once per
/// episode publish transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum CatalogEvent {
    EpisodePublished(EpisodePublished),
    EpisodeUnpublished { episode_id: EpisodeId },
    Wiped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EpisodePublished {
    pub series_id: SeriesId,
    pub series_title: String,
    pub season_number: i32,
    pub episode_id: EpisodeId,
    pub episode_number: i32,
    pub published_at: DateTime<Utc>,
}

/// What the core asks the gateway to show a user. Plain records, never UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum NotificationPayload {
    NewEpisode {
        series_id: SeriesId,
        series_title: String,
        season_number: i32,
        episode_id: EpisodeId,
        episode_number: i32,
    },
}

impl From<&EpisodePublished> for NotificationPayload {
    fn from(event: &EpisodePublished) -> Self {
        Self::NewEpisode {
            series_id: event.series_id,
            series_title: event.series_title.clone(),
            season_number: event.season_number,
            episode_id: event.episode_id,
            episode_number: event.episode_number,
        }
    }
}

/// One notification the dispatcher intends to send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationIntent {
    pub user_id: UserId,
    pub episode_id: EpisodeId,
    pub payload: NotificationPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = NotificationPayload::NewEpisode {
            series_id: SeriesId::new(1),
            series_title: "Frieren".to_string(),
            season_number: 1,
            episode_id: EpisodeId::new(7),
            episode_number: 3,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "NewEpisode");
        assert_eq!(json["payload"]["episode_number"], 3);
        assert_eq!(json["payload"]["series_title"], "Frieren");
    }
}
