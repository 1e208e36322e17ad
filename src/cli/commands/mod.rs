mod catalog;
mod daemon;
mod ledger;
mod maintenance;
mod stats;

pub use catalog::{cmd_latest, cmd_popular, cmd_publish, cmd_unpublish};
pub use daemon::cmd_daemon;
pub use ledger::{cmd_adjust, cmd_balance, cmd_premium, cmd_unpremium};
pub use maintenance::{cmd_clear_wipe, cmd_compact, cmd_wipe, cmd_wipe_status};
pub use stats::{cmd_leaderboard, cmd_requests, cmd_stats};
