//! # cantina-db: Database Layer for Cantina POS
//!
//! SQLite persistence for the catalog, orders, stock reservations and daily
//! closes, using sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cantina POS Data Flow                            │
//! │                                                                         │
//! │  OrderLifecycleManager (cantina-engine)                                │
//! │       │  via the OrderStore port                                       │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    cantina-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄───│ ProductRepository  │  │ (embedded) │  │   │
//! │  │   │  SqlitePool   │    │ OrderRepository    │  │ 001_init   │  │   │
//! │  │   │               │    │ DailyCloseRepo     │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL, foreign keys on)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cantina_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("cantina.db")).await?;
//! let catalog = db.products().list_all().await?;
//! let active = db.orders().list(&OrderFilter::active()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::daily_close::DailyCloseRepository;
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
