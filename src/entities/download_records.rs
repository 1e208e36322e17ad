use sea_orm::entity::prelude::*;

/// Append-only download history used for profiles and the leaderboard.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "download_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub variant_id: i32,
    pub episode_id: i32,
    pub series_id: i32,
    #[sea_orm(unique)]
    pub handle_id: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
