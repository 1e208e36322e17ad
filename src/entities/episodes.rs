use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "episodes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub season_id: i32,
    /// Denormalized from the season so publish and gate lookups skip a join.
    pub series_id: i32,
    /// Unique within the season.
    pub number: i32,
    pub release_at: DateTimeUtc,
    pub published: bool,
    pub published_at: Option<DateTimeUtc>,
    /// Let the scheduler publish this episode once `release_at` has passed.
    pub auto_publish: bool,
    /// Set once the watchlist dispatcher has processed the publish event.
    pub notifications_dispatched: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::seasons::Entity",
        from = "Column::SeasonId",
        to = "super::seasons::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Seasons,
    #[sea_orm(has_many = "super::file_variants::Entity")]
    FileVariants,
}

impl Related<super::seasons::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Seasons.def()
    }
}

impl Related<super::file_variants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileVariants.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
