pub mod prelude;

pub mod anime_requests;
pub mod delivery_handles;
pub mod download_records;
pub mod episodes;
pub mod file_variants;
pub mod ledger_transactions;
pub mod notification_markers;
pub mod redeem_links;
pub mod seasons;
pub mod series;
pub mod system_state;
pub mod token_accounts;
pub mod watchlist_entries;
