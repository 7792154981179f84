//! # Engine Startup
//!
//! Wires configuration, storage, notification fanout and the services into
//! one running [`Engine`].
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. EngineConfig::validate                                              │
//! │  2. Database::new         create file, WAL, run migrations              │
//! │  3. BroadcastNotifier     capacity from [notifications]                 │
//! │  4. CatalogService::load  products, combos, stock ledger                │
//! │  5. OrderLifecycleManager business day + low-stock threshold            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::info;

use cantina_db::{Database, DbConfig};

use crate::catalog::CatalogService;
use crate::config::EngineConfig;
use crate::error::{EngineResult, StoreError};
use crate::manager::OrderLifecycleManager;
use crate::notify::BroadcastNotifier;
use crate::store::SqliteStore;

/// A running engine over SQLite.
#[derive(Debug, Clone)]
pub struct Engine {
    pub config: EngineConfig,
    pub catalog: Arc<CatalogService>,
    pub orders: Arc<OrderLifecycleManager>,
    pub notifier: BroadcastNotifier,
    store: Arc<SqliteStore>,
}

impl Engine {
    /// Opens the database named by `config` and loads the catalog.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let path = &config.database.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }

        let db_config = DbConfig::new(path.clone()).max_connections(config.database.max_connections);
        let db = Database::new(db_config).await?;
        info!(path = %path.display(), "Database ready");

        Self::with_database(config, db).await
    }

    /// Builds the engine over an already connected database.
    pub async fn with_database(config: EngineConfig, db: Database) -> EngineResult<Self> {
        let store = Arc::new(SqliteStore::new(db));
        let notifier = BroadcastNotifier::new(config.notifications.capacity);

        let catalog = Arc::new(CatalogService::load(store.clone(), Arc::new(notifier.clone())).await?);
        let orders = Arc::new(
            OrderLifecycleManager::new(Arc::clone(&catalog), store.clone(), Arc::new(notifier.clone()))
                .with_config(&config),
        );

        info!(
            products = catalog.products().len(),
            utc_offset_minutes = config.business.utc_offset_minutes,
            "Engine started"
        );

        Ok(Engine {
            config,
            catalog,
            orders,
            notifier,
            store,
        })
    }

    pub fn database(&self) -> &Database {
        self.store.database()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantina_core::{
        Audience, CreateOrderRequest, Money, NewProduct, OrderLineRequest, OrderStatus, ProductCategory, ProductKind,
    };

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.business.utc_offset_minutes = 2000;
        assert!(Engine::open(config).await.is_err());
    }

    #[tokio::test]
    async fn test_engine_over_file_database_survives_restart() {
        let dir = std::env::temp_dir().join(format!("cantina-{}", uuid::Uuid::new_v4()));
        let mut config = EngineConfig::default();
        config.database.path = dir.join("cantina.db");

        let engine = Engine::open(config.clone()).await.unwrap();
        let mut kitchen = engine.notifier.subscribe(Audience::Kitchen);

        let taco = engine
            .catalog
            .add_product(NewProduct::new(
                "Taco",
                ProductCategory::BaseDish,
                Some(Money::from_cents(2500)),
                ProductKind::Base { stock: 12 },
            ))
            .await
            .unwrap();
        let order = engine
            .orders
            .create_order(CreateOrderRequest::new(3, vec![OrderLineRequest::new(taco.id, 5)]))
            .await
            .unwrap();
        engine.orders.send_to_kitchen(order.order.id).await.unwrap();

        let ticket = kitchen.recv().await.unwrap();
        assert_eq!(ticket.event_type, "stock_changed");
        let ticket = kitchen.recv().await.unwrap();
        assert_eq!(ticket.event_type, "new_kitchen_ticket");
        drop(engine);

        let reopened = Engine::open(config).await.unwrap();
        assert_eq!(reopened.catalog.ledger().level(taco.id), Some(7));
        let details = reopened.orders.get_order(order.order.id).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::SentToKitchen);
        assert_eq!(details.lines.len(), 1);

        reopened.database().close().await;
        let _ = std::fs::remove_dir_all(dir);
    }
}
