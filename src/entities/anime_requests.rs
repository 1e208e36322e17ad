use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "anime_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i64,
    /// Idempotency key of the submission; also the ledger key of its charge.
    #[sea_orm(unique)]
    pub request_key: String,
    pub title: String,
    pub language: Option<String>,
    pub premium: bool,
    pub cost: i64,
    pub status: String,
    pub admin_notes: Option<String>,
    pub created_at: DateTimeUtc,
    pub resolved_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
