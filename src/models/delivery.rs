use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{EpisodeId, SeriesId, UserId, VariantId};

/// Proof that a download passed the gate. Consumable once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryHandle {
    pub id: String,
    pub user_id: UserId,
    pub variant_id: VariantId,
    pub charged: bool,
    pub issued_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// What the file-storage side receives when a handle is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub handle_id: String,
    pub user_id: UserId,
    pub variant_id: VariantId,
    pub storage_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub id: i64,
    pub user_id: UserId,
    pub variant_id: VariantId,
    pub episode_id: EpisodeId,
    pub series_id: SeriesId,
    pub handle_id: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a successful `authorize`. `replayed` is set when the nonce had
/// been used before and the original handle is returned without a new debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authorization {
    pub handle: DeliveryHandle,
    pub balance: i64,
    pub premium: bool,
    pub replayed: bool,
}
