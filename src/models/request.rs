use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{RequestId, RequestStatus, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnimeRequest {
    pub id: RequestId,
    pub user_id: UserId,
    pub request_key: String,
    pub title: String,
    pub language: Option<String>,
    pub premium: bool,
    /// Tokens charged when the request was filed. Zero for premium users.
    pub cost: i64,
    pub status: RequestStatus,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
