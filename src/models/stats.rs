use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{MaintenanceState, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub balance: i64,
    pub premium_until: Option<DateTime<Utc>>,
    pub premium: bool,
    pub downloads: u64,
    pub watchlist_size: u64,
    pub notifications_enabled: bool,
    pub member_since: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub downloads: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub users: u64,
    pub premium_users: u64,
    pub series: u64,
    pub episodes: u64,
    pub published_episodes: u64,
    pub variants: u64,
    pub downloads: u64,
    pub tokens_in_circulation: i64,
    pub pending_requests: u64,
    pub maintenance: MaintenanceState,
}
