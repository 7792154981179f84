//! # Persistence Ports
//!
//! The engine talks to persistence through two traits. Each method is one
//! atomic unit: either everything it describes is durable or nothing is.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderLifecycleManager ──▶ OrderStore                                   │
//! │  CatalogService        ──▶ CatalogStore                                 │
//! │                               │                                         │
//! │              ┌────────────────┴────────────────┐                        │
//! │              ▼                                 ▼                        │
//! │        MemoryStore                       SqliteStore                    │
//! │   (tests, embedding)             (cantina_db::Database)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock deltas applied here mirror the ones the [`StockLedger`] already
//! applied in memory, so a persisted counter never goes below zero either.
//!
//! [`StockLedger`]: crate::ledger::StockLedger

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cantina_core::{
    ComboComponent, DailyClose, Money, NewOrder, NewProduct, Order, OrderDetails, OrderFilter, OrderId, OrderStatus,
    Product, ProductId, StockRequirement,
};

use crate::error::StoreResult;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Orders, their lines, their frozen reservations and daily closes.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a pending order with its lines and reservation and takes the
    /// reserved units off the persisted counters.
    async fn insert_order(&self, order: &NewOrder, reservation: &StockRequirement) -> StoreResult<OrderDetails>;

    async fn order(&self, id: OrderId) -> StoreResult<Option<Order>>;

    async fn order_details(&self, id: OrderId) -> StoreResult<Option<OrderDetails>>;

    /// Moves an order from `expected` to `next`. `None` if it was not in
    /// `expected` any more.
    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<Option<Order>>;

    /// Moves a `ready` order to `paid` with its cash amounts. `None` if the
    /// order was not `ready`.
    async fn record_payment(&self, id: OrderId, cash_received: Money, change_given: Money)
        -> StoreResult<Option<Order>>;

    /// Moves an order from `expected` to `cancelled`, reads its frozen
    /// reservation and gives those units back to the persisted counters.
    async fn cancel(&self, id: OrderId, expected: OrderStatus) -> StoreResult<Option<(Order, StockRequirement)>>;

    /// Orders matching `filter`, oldest first.
    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    /// Σ totals of orders paid within `[start, end)`.
    async fn paid_total_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Money>;

    /// Inserts or replaces the close of one business date.
    async fn save_daily_close(&self, close: &DailyClose) -> StoreResult<()>;
}

/// Products, combo compositions and persisted stock counters.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every product (active or not) and every combo component.
    async fn load_catalog(&self) -> StoreResult<(Vec<Product>, Vec<ComboComponent>)>;

    async fn insert_product(&self, product: &NewProduct) -> StoreResult<Product>;

    /// Inserts a combo and its components together. The returned components
    /// carry the new combo id.
    async fn insert_combo(
        &self,
        combo: &NewProduct,
        components: &[ComboComponent],
    ) -> StoreResult<(Product, Vec<ComboComponent>)>;

    async fn deactivate_product(&self, id: ProductId) -> StoreResult<()>;

    /// Adds `delta` to a base product's counter and returns the new level.
    async fn adjust_stock(&self, id: ProductId, delta: i64) -> StoreResult<i64>;
}
