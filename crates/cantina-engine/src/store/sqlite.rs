//! SQLite implementation of both persistence ports over
//! [`cantina_db::Database`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cantina_core::{
    ComboComponent, DailyClose, Money, NewOrder, NewProduct, Order, OrderDetails, OrderFilter, OrderId, OrderStatus,
    Product, ProductId, StockRequirement,
};
use cantina_db::Database;

use super::{CatalogStore, OrderStore};
use crate::error::StoreResult;

/// Durable store backed by the SQLite repositories.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn insert_order(&self, order: &NewOrder, reservation: &StockRequirement) -> StoreResult<OrderDetails> {
        Ok(self.db.orders().insert_with_reservation(order, reservation).await?)
    }

    async fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.db.orders().get_by_id(id).await?)
    }

    async fn order_details(&self, id: OrderId) -> StoreResult<Option<OrderDetails>> {
        Ok(self.db.orders().get_details(id).await?)
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<Option<Order>> {
        Ok(self.db.orders().compare_and_set_status(id, expected, next).await?)
    }

    async fn record_payment(
        &self,
        id: OrderId,
        cash_received: Money,
        change_given: Money,
    ) -> StoreResult<Option<Order>> {
        Ok(self.db.orders().record_payment(id, cash_received, change_given).await?)
    }

    async fn cancel(&self, id: OrderId, expected: OrderStatus) -> StoreResult<Option<(Order, StockRequirement)>> {
        Ok(self.db.orders().cancel(id, expected).await?)
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        Ok(self.db.orders().list(filter).await?)
    }

    async fn paid_total_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Money> {
        Ok(self.db.orders().paid_total_between(start, end).await?)
    }

    async fn save_daily_close(&self, close: &DailyClose) -> StoreResult<()> {
        Ok(self.db.daily_closes().upsert(close).await?)
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn load_catalog(&self) -> StoreResult<(Vec<Product>, Vec<ComboComponent>)> {
        let products = self.db.products().list_all().await?;
        let components = self.db.products().list_components().await?;
        Ok((products, components))
    }

    async fn insert_product(&self, product: &NewProduct) -> StoreResult<Product> {
        Ok(self.db.products().insert(product).await?)
    }

    async fn insert_combo(
        &self,
        combo: &NewProduct,
        components: &[ComboComponent],
    ) -> StoreResult<(Product, Vec<ComboComponent>)> {
        Ok(self.db.products().insert_combo(combo, components).await?)
    }

    async fn deactivate_product(&self, id: ProductId) -> StoreResult<()> {
        Ok(self.db.products().deactivate(id).await?)
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> StoreResult<i64> {
        Ok(self.db.products().adjust_stock(id, delta).await?)
    }
}
