use anyhow::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, SqlErr, Statement,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::catalog::CatalogRepository;
pub use repositories::delivery::DeliveryRepository;
pub use repositories::ledger::{AccountSnapshot, ApplyOutcome, LedgerRepository};
pub use repositories::notification::NotificationRepository;
pub use repositories::redeem::RedeemRepository;
pub use repositories::request::RequestRepository;
pub use repositories::system::SystemRepository;
pub use repositories::watchlist::{WatchlistRepository, WatchlistRow};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    /// Connects and applies all pending migrations.
    ///
    /// In-memory databases live inside a single connection, so their pool is
    /// pinned to one connection regardless of the requested size.
    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = is_in_memory(db_url);
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
            (max_connections, min_connections.min(max_connections))
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(30))
            .sqlx_logging(false);
        if !in_memory {
            opt.idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn catalog_repo(&self) -> CatalogRepository {
        CatalogRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn ledger_repo(&self) -> LedgerRepository {
        LedgerRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn redeem_repo(&self) -> RedeemRepository {
        RedeemRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn delivery_repo(&self) -> DeliveryRepository {
        DeliveryRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn watchlist_repo(&self) -> WatchlistRepository {
        WatchlistRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn notification_repo(&self) -> NotificationRepository {
        NotificationRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn request_repo(&self) -> RequestRepository {
        RequestRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn system_repo(&self) -> SystemRepository {
        SystemRepository::new(self.conn.clone())
    }
}

fn is_in_memory(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

/// True when the error chain contains a unique-constraint violation.
#[must_use]
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<DbErr>().and_then(DbErr::sql_err),
            Some(SqlErr::UniqueConstraintViolation(_))
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:engine?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite:data/animerealm.db"));
    }

    #[tokio::test]
    async fn in_memory_store_migrates_and_pings() {
        let store = Store::with_pool_options("sqlite::memory:", 5, 1).await.unwrap();
        store.ping().await.unwrap();
    }

    #[test]
    fn plain_errors_are_not_unique_violations() {
        let err = anyhow::anyhow!("boom");
        assert!(!is_unique_violation(&err));
    }
}
