use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::config::NotificationConfig;
use crate::domain::UserId;
use crate::domain::events::NotificationPayload;

/// Outbound side of the chat transport. The core only ever hands it plain
/// records; rendering is the gateway's business.
#[async_trait::async_trait]
pub trait PresentationGateway: Send + Sync {
    async fn deliver(&self, user: UserId, payload: &NotificationPayload) -> Result<()>;
}

/// Writes every notification to the log. Default when no webhook is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogGateway;

#[async_trait::async_trait]
impl PresentationGateway for LogGateway {
    async fn deliver(&self, user: UserId, payload: &NotificationPayload) -> Result<()> {
        let NotificationPayload::NewEpisode {
            series_title,
            season_number,
            episode_number,
            ..
        } = payload;
        info!(
            user_id = %user,
            series = %series_title,
            season = season_number,
            episode = episode_number,
            "New episode notification"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    user_id: UserId,
    #[serde(flatten)]
    payload: &'a NotificationPayload,
}

/// POSTs each notification as JSON to the bot process.
#[derive(Clone)]
pub struct WebhookGateway {
    client: Client,
    url: url::Url,
}

impl WebhookGateway {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = url::Url::parse(url).with_context(|| format!("Invalid webhook URL: {url}"))?;
        let client = Client::builder()
            .user_agent("AnimeRealm/0.1")
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait::async_trait]
impl PresentationGateway for WebhookGateway {
    async fn deliver(&self, user: UserId, payload: &NotificationPayload) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&WebhookBody {
                user_id: user,
                payload,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Gateway webhook returned {status} for user {user}");
        }
        Ok(())
    }
}

pub fn from_config(config: &NotificationConfig) -> Result<std::sync::Arc<dyn PresentationGateway>> {
    match &config.webhook_url {
        Some(url) => Ok(std::sync::Arc::new(WebhookGateway::new(
            url,
            Duration::from_secs(config.delivery_timeout_seconds.max(1)),
        )?)),
        None => Ok(std::sync::Arc::new(LogGateway)),
    }
}
