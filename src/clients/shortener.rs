use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::ShortenerConfig;

/// Turns the long redeem URL into the link shown to the user.
#[async_trait::async_trait]
pub trait Shortener: Send + Sync {
    async fn shorten(&self, long_url: &str) -> Result<String>;
}

/// Used when no shortener is configured; hands the long URL back unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughShortener;

#[async_trait::async_trait]
impl Shortener for PassthroughShortener {
    async fn shorten(&self, long_url: &str) -> Result<String> {
        Ok(long_url.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ShortenResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(rename = "shortenedUrl", default)]
    shortened_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the common `GET {api}?api={key}&url={long}` shortener API.
#[derive(Clone)]
pub struct HttpShortener {
    client: Client,
    api_url: Url,
    api_key: String,
}

impl HttpShortener {
    pub fn new(config: &ShortenerConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("Invalid shortener URL: {}", config.api_url))?;

        let client = Client::builder()
            .user_agent("AnimeRealm/0.1")
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .context("Failed to build shortener HTTP client")?;

        Ok(Self {
            client,
            api_url,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Shortener for HttpShortener {
    async fn shorten(&self, long_url: &str) -> Result<String> {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("api", &self.api_key)
            .append_pair("url", long_url);

        debug!(url = %self.api_url, "Shortening redeem link");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Shortener returned {status}: {body}");
        }

        let parsed: ShortenResponse = response
            .json()
            .await
            .context("Failed to parse shortener response")?;

        match parsed.shortened_url {
            Some(short) if !short.is_empty() => Ok(short),
            _ => anyhow::bail!(
                "Shortener gave no URL (status: {}, message: {})",
                parsed.status.unwrap_or_default(),
                parsed.message.unwrap_or_default()
            ),
        }
    }
}

/// Builds the shortener the configuration asks for.
pub fn from_config(config: &ShortenerConfig) -> Result<std::sync::Arc<dyn Shortener>> {
    if config.enabled {
        Ok(std::sync::Arc::new(HttpShortener::new(config)?))
    } else {
        Ok(std::sync::Arc::new(PassthroughShortener))
    }
}
