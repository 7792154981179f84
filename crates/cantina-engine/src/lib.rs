//! # Cantina Engine
//!
//! Order and inventory consistency engine for the restaurant POS.
//!
//! ## Module Organization
//! ```text
//! cantina_engine/
//! ├── lib.rs          ◄─── You are here (exports)
//! ├── bootstrap.rs    ◄─── Engine startup over SQLite
//! ├── catalog.rs      ◄─── CatalogService: products, combos, restock
//! ├── config.rs       ◄─── EngineConfig (TOML + CANTINA_* env)
//! ├── error.rs        ◄─── EngineError, StoreError, ConfigError
//! ├── ledger.rs       ◄─── StockLedger: authoritative stock counters
//! ├── manager.rs      ◄─── OrderLifecycleManager: create → pay/cancel
//! ├── notify.rs       ◄─── Notifier port + broadcast fanout
//! ├── store/          ◄─── OrderStore/CatalogStore, memory + SQLite
//! └── telemetry.rs    ◄─── tracing subscriber setup
//! ```
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  waiter / kitchen / cashier                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  OrderLifecycleManager ──▶ CatalogService (prepare, resolve combos)     │
//! │       │                                                                 │
//! │       ├──▶ StockLedger     reserve / release, per-product locks         │
//! │       ├──▶ OrderStore      order + reservation, status CAS              │
//! │       └──▶ Notifier        kitchen / waiters / admin, after commit      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod notify;
pub mod store;
pub mod telemetry;

pub use bootstrap::Engine;
pub use catalog::CatalogService;
pub use config::{BusinessSettings, EngineConfig};
pub use error::{ConfigError, EngineError, EngineResult, NotifyError, StoreError, StoreResult};
pub use ledger::StockLedger;
pub use manager::OrderLifecycleManager;
pub use notify::{dispatch, BroadcastNotifier, Notification, Notifier, Subscription};
pub use store::{CatalogStore, MemoryStore, OrderStore, SqliteStore};
pub use telemetry::init_tracing;
