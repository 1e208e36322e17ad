use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use crate::domain::{MaintenanceState, parse_or};
use crate::entities::{prelude::*, system_state};

const MAINTENANCE_KEY: &str = "maintenance";

/// Key/value rows describing the store itself.
pub struct SystemRepository {
    conn: DatabaseConnection,
}

impl SystemRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let model = SystemState::find_by_id(key.to_string())
            .one(&self.conn)
            .await?;
        Ok(model.map(|m| m.value))
    }

    pub async fn set(&self, key: &str, value: &str, now: DateTime<Utc>) -> Result<()> {
        SystemState::insert(system_state::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(system_state::Column::Key)
                .update_columns([system_state::Column::Value, system_state::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await?;
        Ok(())
    }

    /// Missing state reads as `Active`.
    pub async fn maintenance(&self) -> Result<MaintenanceState> {
        Ok(self
            .get(MAINTENANCE_KEY)
            .await?
            .map_or(MaintenanceState::Active, |v| {
                parse_or(&v, MaintenanceState::WipeInProgress)
            }))
    }

    pub async fn set_maintenance(&self, state: MaintenanceState, now: DateTime<Utc>) -> Result<()> {
        self.set(MAINTENANCE_KEY, state.as_str(), now).await
    }
}
