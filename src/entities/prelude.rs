pub use super::anime_requests::Entity as AnimeRequests;
pub use super::delivery_handles::Entity as DeliveryHandles;
pub use super::download_records::Entity as DownloadRecords;
pub use super::episodes::Entity as Episodes;
pub use super::file_variants::Entity as FileVariants;
pub use super::ledger_transactions::Entity as LedgerTransactions;
pub use super::notification_markers::Entity as NotificationMarkers;
pub use super::redeem_links::Entity as RedeemLinks;
pub use super::seasons::Entity as Seasons;
pub use super::series::Entity as Series;
pub use super::system_state::Entity as SystemState;
pub use super::token_accounts::Entity as TokenAccounts;
pub use super::watchlist_entries::Entity as WatchlistEntries;
