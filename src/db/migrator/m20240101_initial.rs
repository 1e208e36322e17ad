use crate::entities::prelude::*;
use crate::entities::{
    download_records, episodes, file_variants, ledger_transactions, notification_markers,
    redeem_links, seasons, watchlist_entries,
};
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{EntityTrait, Schema};

#[derive(DeriveMigrationName)]
pub struct Migration;

async fn create_entity_table<E>(manager: &SchemaManager<'_>, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    manager
        .create_table(
            schema
                .create_table_from_entity(entity)
                .if_not_exists()
                .to_owned(),
        )
        .await
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        create_entity_table(manager, &schema, Series).await?;
        create_entity_table(manager, &schema, Seasons).await?;
        create_entity_table(manager, &schema, Episodes).await?;
        create_entity_table(manager, &schema, FileVariants).await?;
        create_entity_table(manager, &schema, TokenAccounts).await?;
        create_entity_table(manager, &schema, LedgerTransactions).await?;
        create_entity_table(manager, &schema, RedeemLinks).await?;
        create_entity_table(manager, &schema, WatchlistEntries).await?;
        create_entity_table(manager, &schema, NotificationMarkers).await?;
        create_entity_table(manager, &schema, DeliveryHandles).await?;
        create_entity_table(manager, &schema, DownloadRecords).await?;
        create_entity_table(manager, &schema, AnimeRequests).await?;
        create_entity_table(manager, &schema, SystemState).await?;

        // Uniqueness keys of the catalog tree
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_seasons_series_number")
                    .table(Seasons)
                    .col(seasons::Column::SeriesId)
                    .col(seasons::Column::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_episodes_season_number")
                    .table(Episodes)
                    .col(episodes::Column::SeasonId)
                    .col(episodes::Column::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_file_variants_key")
                    .table(FileVariants)
                    .col(file_variants::Column::EpisodeId)
                    .col(file_variants::Column::Quality)
                    .col(file_variants::Column::AudioLanguage)
                    .col(file_variants::Column::SubtitleLanguage)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_watchlist_user_series")
                    .table(WatchlistEntries)
                    .col(watchlist_entries::Column::UserId)
                    .col(watchlist_entries::Column::SeriesId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_notification_markers_pair")
                    .table(NotificationMarkers)
                    .col(notification_markers::Column::UserId)
                    .col(notification_markers::Column::EpisodeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Lookup indexes
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_ledger_transactions_user")
                    .table(LedgerTransactions)
                    .col(ledger_transactions::Column::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_redeem_links_user_state")
                    .table(RedeemLinks)
                    .col(redeem_links::Column::UserId)
                    .col(redeem_links::Column::State)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_episodes_published_at")
                    .table(Episodes)
                    .col(episodes::Column::PublishedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_download_records_user")
                    .table(DownloadRecords)
                    .col(download_records::Column::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SystemState).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AnimeRequests).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DownloadRecords).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DeliveryHandles).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(NotificationMarkers).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WatchlistEntries).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RedeemLinks).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LedgerTransactions).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TokenAccounts).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FileVariants).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Episodes).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Seasons).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Series).to_owned())
            .await?;

        Ok(())
    }
}
