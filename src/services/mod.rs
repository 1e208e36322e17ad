pub mod fence;
pub use fence::{Fenced, OperationFence};

pub mod locks;
pub use locks::KeyedLocks;

pub mod catalog_service;
pub mod catalog_service_impl;
pub use catalog_service::{CatalogError, CatalogService, PublishOutcome};
pub use catalog_service_impl::SeaOrmCatalogService;

pub mod ledger_service;
pub mod ledger_service_impl;
pub use ledger_service::{LedgerError, LedgerService};
pub use ledger_service_impl::{LedgerWriter, SeaOrmLedgerService, is_premium_at};

pub mod redeem_service;
pub mod redeem_service_impl;
pub use redeem_service::{RedeemError, RedeemService};
pub use redeem_service_impl::SeaOrmRedeemService;

pub mod gate_service;
pub mod gate_service_impl;
pub use gate_service::{GateError, GateService};
pub use gate_service_impl::SeaOrmGateService;

pub mod watchlist_service;
pub mod watchlist_service_impl;
pub use watchlist_service::{WatchlistError, WatchlistService};
pub use watchlist_service_impl::SeaOrmWatchlistService;

pub mod notification_dispatcher;
pub use notification_dispatcher::{DispatchReport, NotificationDispatcher};

pub mod stats_service;
pub use stats_service::StatsService;

pub mod maintenance_service;
pub use maintenance_service::{MaintenanceError, MaintenanceService, WipeReport};

pub mod scheduler;
pub use scheduler::Scheduler;
