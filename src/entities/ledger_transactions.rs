use sea_orm::entity::prelude::*;

/// Append-only. Rows are never updated; only a full wipe removes them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub delta: i64,
    pub cause: String,
    #[sea_orm(unique)]
    pub idempotency_key: String,
    pub balance_after: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::token_accounts::Entity",
        from = "Column::UserId",
        to = "super::token_accounts::Column::UserId",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    TokenAccounts,
}

impl Related<super::token_accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TokenAccounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
