use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Prefix of every environment override, e.g. `ANIMEREALM_TOKENS_PER_REDEEM`.
pub const ENV_PREFIX: &str = "ANIMEREALM_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub tokens: TokenConfig,

    pub redeem: RedeemConfig,

    pub shortener: ShortenerConfig,

    pub catalog: CatalogConfig,

    pub watchlist: WatchlistConfig,

    pub notifications: NotificationConfig,

    pub scheduler: SchedulerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// "pretty" or "json"
    pub log_format: String,

    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,

    pub event_bus_buffer_size: usize,

    /// The only user allowed to run a full wipe.
    pub owner_id: Option<i64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/animerealm.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            event_bus_buffer_size: 256,
            owner_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub tokens_per_redeem: i64,

    /// Credited once when an account is registered.
    pub welcome_tokens: i64,

    /// Credited to the user who opened someone else's redeem link.
    pub referral_joiner_tokens: i64,

    /// Charged to non-premium users filing an anime request.
    pub request_token_cost: i64,

    /// Quality labels only premium users may download, e.g. `["2160p"]`.
    pub premium_only_qualities: Vec<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            tokens_per_redeem: 1,
            welcome_tokens: 5,
            referral_joiner_tokens: 5,
            request_token_cost: 5,
            premium_only_qualities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedeemConfig {
    pub link_expiry_hours: u32,

    /// `{bot}` and `{token}` are substituted.
    pub link_template: String,

    pub bot_username: String,

    /// Completed redeems per user per UTC day. 0 disables the limit.
    pub daily_redeem_limit: u32,

    /// How long an expired link is kept before compaction deletes it.
    pub compaction_grace_hours: u32,
}

impl Default for RedeemConfig {
    fn default() -> Self {
        Self {
            link_expiry_hours: 1,
            link_template: "https://t.me/{bot}?start={token}".to_string(),
            bot_username: "AnimeRealmBot".to_string(),
            daily_redeem_limit: 100,
            compaction_grace_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortenerConfig {
    pub enabled: bool,

    pub api_url: String,

    pub api_key: String,

    pub timeout_seconds: u64,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: String::new(),
            api_key: String::new(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub page_size: u64,

    pub latest_count: u64,

    pub popular_count: u64,

    pub leaderboard_count: u64,

    /// Minimum score (0-100) a search hit needs.
    pub search_similarity_threshold: u8,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: 15,
            latest_count: 15,
            popular_count: 10,
            leaderboard_count: 10,
            search_similarity_threshold: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistConfig {
    pub max_items_free: u64,

    pub max_items_premium: u64,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            max_items_free: 10,
            max_items_premium: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Upper bound on simultaneous gateway deliveries per episode.
    pub max_concurrency: usize,

    pub delivery_timeout_seconds: u64,

    /// Attempts per (user, episode) before the marker is abandoned.
    pub max_attempts: u32,

    /// When set, notifications are POSTed here. Otherwise they are only logged.
    pub webhook_url: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            delivery_timeout_seconds: 10,
            max_attempts: 5,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Compaction, auto-publish and dispatch recovery.
    pub maintenance_interval_minutes: u32,

    /// Retry of failed notifications.
    pub retry_interval_minutes: u32,

    /// Six-field cron expression for the maintenance job. Takes precedence
    /// over `maintenance_interval_minutes` when set.
    pub cron_expression: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            maintenance_interval_minutes: 60,
            retry_interval_minutes: 5,
            cron_expression: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub metrics_port: Option<u16>,
}

impl Config {
    /// Loads the first config file found, then applies `.env` and
    /// `ANIMEREALM_*` environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;

        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from: {}", path.display());
        }
        config.apply_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("animerealm").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".animerealm").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    /// Applies `ANIMEREALM_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("DATABASE_PATH") {
            self.general.database_path = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.general.log_level = v;
        }
        if let Some(v) = var("LOG_FORMAT") {
            self.general.log_format = v;
        }
        if let Some(v) = var("OWNER_ID") {
            self.general.owner_id = Some(parse_var("OWNER_ID", &v)?);
        }
        if let Some(v) = var("TOKENS_PER_REDEEM") {
            self.tokens.tokens_per_redeem = parse_var("TOKENS_PER_REDEEM", &v)?;
        }
        if let Some(v) = var("WELCOME_TOKENS") {
            self.tokens.welcome_tokens = parse_var("WELCOME_TOKENS", &v)?;
        }
        if let Some(v) = var("REFERRAL_JOINER_TOKENS") {
            self.tokens.referral_joiner_tokens = parse_var("REFERRAL_JOINER_TOKENS", &v)?;
        }
        if let Some(v) = var("REQUEST_TOKEN_COST") {
            self.tokens.request_token_cost = parse_var("REQUEST_TOKEN_COST", &v)?;
        }
        if let Some(v) = var("LINK_EXPIRY_HOURS") {
            self.redeem.link_expiry_hours = parse_var("LINK_EXPIRY_HOURS", &v)?;
        }
        if let Some(v) = var("BOT_USERNAME") {
            self.redeem.bot_username = v;
        }
        if let Some(v) = var("DAILY_REDEEM_LIMIT") {
            self.redeem.daily_redeem_limit = parse_var("DAILY_REDEEM_LIMIT", &v)?;
        }
        if let Some(v) = var("SHORTENER_API_URL") {
            self.shortener.api_url = v;
            self.shortener.enabled = !self.shortener.api_url.is_empty();
        }
        if let Some(v) = var("SHORTENER_API_KEY") {
            self.shortener.api_key = v;
        }
        if let Some(v) = var("PAGE_SIZE") {
            self.catalog.page_size = parse_var("PAGE_SIZE", &v)?;
        }
        if let Some(v) = var("SEARCH_SIMILARITY_THRESHOLD") {
            self.catalog.search_similarity_threshold =
                parse_var("SEARCH_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = var("WEBHOOK_URL") {
            self.notifications.webhook_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = var("METRICS_PORT") {
            self.observability.metrics_port = Some(parse_var("METRICS_PORT", &v)?);
            self.observability.metrics_enabled = true;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.tokens.tokens_per_redeem <= 0 {
            anyhow::bail!("tokens.tokens_per_redeem must be > 0");
        }

        if self.tokens.welcome_tokens < 0
            || self.tokens.referral_joiner_tokens < 0
            || self.tokens.request_token_cost < 0
        {
            anyhow::bail!("Token amounts cannot be negative");
        }

        if self.redeem.link_expiry_hours == 0 {
            anyhow::bail!("redeem.link_expiry_hours must be > 0");
        }

        if !self.redeem.link_template.contains("{token}") {
            anyhow::bail!("redeem.link_template must contain {{token}}");
        }

        if self.shortener.enabled {
            if self.shortener.api_url.is_empty() {
                anyhow::bail!("Shortener API URL cannot be empty when enabled");
            }
            url::Url::parse(&self.shortener.api_url)
                .with_context(|| format!("Invalid shortener URL: {}", self.shortener.api_url))?;
        }

        if let Some(webhook) = &self.notifications.webhook_url {
            url::Url::parse(webhook)
                .with_context(|| format!("Invalid notification webhook URL: {webhook}"))?;
        }

        if self.catalog.page_size == 0 {
            anyhow::bail!("catalog.page_size must be > 0");
        }

        if self.catalog.search_similarity_threshold > 100 {
            anyhow::bail!("catalog.search_similarity_threshold must be between 0 and 100");
        }

        if self.notifications.max_concurrency == 0 || self.notifications.max_attempts == 0 {
            anyhow::bail!("Notification concurrency and attempts must be > 0");
        }

        if self.scheduler.enabled
            && (self.scheduler.maintenance_interval_minutes == 0
                || self.scheduler.retry_interval_minutes == 0)
        {
            anyhow::bail!("Scheduler intervals must be > 0");
        }

        if self.general.log_format != "pretty" && self.general.log_format != "json" {
            anyhow::bail!(
                "general.log_format must be \"pretty\" or \"json\", got {:?}",
                self.general.log_format
            );
        }

        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {ENV_PREFIX}{name}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tokens.tokens_per_redeem, 1);
        assert_eq!(config.tokens.request_token_cost, 5);
        assert_eq!(config.redeem.link_expiry_hours, 1);
        assert_eq!(config.catalog.page_size, 15);
        assert_eq!(config.catalog.search_similarity_threshold, 70);
        assert!(config.general.owner_id.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[tokens]"));
        assert!(toml_str.contains("[redeem]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"
            owner_id = 42

            [tokens]
            tokens_per_redeem = 3
            premium_only_qualities = ["2160p"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.owner_id, Some(42));
        assert_eq!(config.tokens.tokens_per_redeem, 3);
        assert_eq!(config.tokens.premium_only_qualities, vec!["2160p"]);

        assert_eq!(config.redeem.bot_username, "AnimeRealmBot");
    }

    #[test]
    fn env_overrides_replace_values() {
        let vars: HashMap<&str, &str> = [
            ("ANIMEREALM_TOKENS_PER_REDEEM", "2"),
            ("ANIMEREALM_LINK_EXPIRY_HOURS", "6"),
            ("ANIMEREALM_OWNER_ID", "777"),
            ("ANIMEREALM_METRICS_PORT", "9100"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| vars.get(k).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.tokens.tokens_per_redeem, 2);
        assert_eq!(config.redeem.link_expiry_hours, 6);
        assert_eq!(config.general.owner_id, Some(777));
        assert_eq!(config.observability.metrics_port, Some(9100));
        assert!(config.observability.metrics_enabled);
    }

    #[test]
    fn bad_env_override_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == "ANIMEREALM_PAGE_SIZE").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ANIMEREALM_PAGE_SIZE"));
    }

    #[test]
    fn validate_rejects_nonsense() {
        let mut config = Config::default();
        config.tokens.tokens_per_redeem = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.shortener.enabled = true;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.redeem.link_template = "https://example.com".to_string();
        assert!(config.validate().is_err());
    }
}
