pub mod catalog;
pub mod delivery;
pub mod ledger;
pub mod notification;
pub mod redeem;
pub mod request;
pub mod system;
pub mod watchlist;
