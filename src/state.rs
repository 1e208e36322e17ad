use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clients::{PresentationGateway, SearchIndex, Shortener, TitleIndex, gateway, shortener};
use crate::config::Config;
use crate::db::Store;
use crate::domain::events::CatalogEvent;
use crate::domain::{Clock, MaintenanceState, SystemClock};
use crate::services::{
    CatalogService, GateService, KeyedLocks, LedgerService, LedgerWriter, MaintenanceService,
    NotificationDispatcher, OperationFence, RedeemService, SeaOrmCatalogService,
    SeaOrmGateService, SeaOrmLedgerService, SeaOrmRedeemService, SeaOrmWatchlistService,
    StatsService, WatchlistService,
};

/// Collaborators the engine talks to. Tests swap in fakes.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub gateway: Arc<dyn PresentationGateway>,
    pub shortener: Arc<dyn Shortener>,
    pub search: Arc<dyn SearchIndex>,
}

impl Collaborators {
    /// Production collaborators built from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            clock: Arc::new(SystemClock),
            gateway: gateway::from_config(&config.notifications)?,
            shortener: shortener::from_config(&config.shortener)?,
            search: Arc::new(TitleIndex::new()),
        })
    }
}

#[derive(Clone)]
pub struct Engine {
    pub config: Arc<RwLock<Config>>,

    pub store: Arc<Store>,

    pub clock: Arc<dyn Clock>,

    pub fence: OperationFence,

    pub locks: Arc<KeyedLocks>,

    pub event_bus: broadcast::Sender<CatalogEvent>,

    pub catalog: Arc<dyn CatalogService>,

    pub ledger: Arc<dyn LedgerService>,

    pub redeem: Arc<dyn RedeemService>,

    pub gate: Arc<dyn GateService>,

    pub watchlist: Arc<dyn WatchlistService>,

    pub dispatcher: Arc<NotificationDispatcher>,

    pub stats: Arc<StatsService>,

    pub maintenance: Arc<MaintenanceService>,
}

impl Engine {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;
        let collaborators = Collaborators::from_config(&config)?;
        Self::with_collaborators(config, store, collaborators).await
    }

    pub async fn with_collaborators(
        config: Config,
        store: Store,
        collaborators: Collaborators,
    ) -> anyhow::Result<Self> {
        let Collaborators {
            clock,
            gateway,
            shortener,
            search,
        } = collaborators;

        let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size.max(1));
        let store = Arc::new(store);
        let config = Arc::new(RwLock::new(config));

        let maintenance_state = store.system_repo().maintenance().await?;
        match maintenance_state {
            MaintenanceState::Active => {}
            MaintenanceState::WipeInProgress => {
                warn!("Store is marked wipe-in-progress; writes stay fenced until the flag is cleared");
            }
            MaintenanceState::Wiped => {
                warn!("Store was wiped; writes stay fenced until the flag is cleared");
            }
        }
        let fence = OperationFence::new(maintenance_state);
        let locks = Arc::new(KeyedLocks::new());
        let writer = Arc::new(LedgerWriter::new(store.clone(), locks.clone(), clock.clone()));

        let catalog = Arc::new(SeaOrmCatalogService::new(
            store.clone(),
            search.clone(),
            fence.clone(),
            clock.clone(),
            config.clone(),
            event_bus.clone(),
        ));
        let ledger = Arc::new(SeaOrmLedgerService::new(
            store.clone(),
            writer.clone(),
            fence.clone(),
            clock.clone(),
            config.clone(),
        ));
        let redeem = Arc::new(SeaOrmRedeemService::new(
            store.clone(),
            writer.clone(),
            shortener,
            locks.clone(),
            fence.clone(),
            clock.clone(),
            config.clone(),
        ));
        let gate = Arc::new(SeaOrmGateService::new(
            store.clone(),
            writer.clone(),
            locks.clone(),
            fence.clone(),
            clock.clone(),
            config.clone(),
        ));
        let watchlist = Arc::new(SeaOrmWatchlistService::new(
            store.clone(),
            writer,
            locks.clone(),
            fence.clone(),
            clock.clone(),
            config.clone(),
        ));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            gateway,
            fence.clone(),
            clock.clone(),
            config.clone(),
        ));
        let stats = Arc::new(StatsService::new(store.clone(), clock.clone(), config.clone()));
        let maintenance = Arc::new(MaintenanceService::new(
            store.clone(),
            search,
            fence.clone(),
            clock.clone(),
            config.clone(),
            event_bus.clone(),
        ));

        catalog.rebuild_search_index().await?;

        Ok(Self {
            config,
            store,
            clock,
            fence,
            locks,
            event_bus,
            catalog,
            ledger,
            redeem,
            gate,
            watchlist,
            dispatcher,
            stats,
            maintenance,
        })
    }

    /// Subscribes the dispatcher to catalog events on a background task.
    #[must_use]
    pub fn spawn_dispatcher(&self) -> JoinHandle<()> {
        let events = self.event_bus.subscribe();
        let dispatcher = self.dispatcher.clone();
        info!("Spawning notification dispatcher");
        tokio::spawn(dispatcher.run(events))
    }
}
