//! Plain records handed out by the services. Entities stay inside `db`.

pub mod catalog;
pub mod delivery;
pub mod ledger;
pub mod redeem;
pub mod request;
pub mod stats;
