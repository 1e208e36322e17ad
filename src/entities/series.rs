use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "series")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub synopsis: String,
    /// JSON array of genre names.
    pub genres: String,
    pub release_year: i32,
    pub status: String,
    pub poster_ref: Option<String>,
    /// Incremented on every successful download. Display aggregate only.
    pub popularity: i64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::seasons::Entity")]
    Seasons,
    #[sea_orm(has_many = "super::watchlist_entries::Entity")]
    WatchlistEntries,
}

impl Related<super::seasons::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Seasons.def()
    }
}

impl Related<super::watchlist_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WatchlistEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
