//! In-memory implementation of both persistence ports.
//!
//! All state sits behind one mutex, so every trait method is trivially one
//! atomic unit. Used by tests and by embedders that do not need durability.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

use cantina_core::{
    ComboComponent, DailyClose, Money, NewOrder, NewProduct, Order, OrderDetails, OrderFilter, OrderId, OrderLine,
    OrderStatus, Product, ProductId, ProductKind, StockRequirement,
};

use super::{CatalogStore, OrderStore};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, Product>,
    components: Vec<ComboComponent>,
    orders: BTreeMap<OrderId, OrderDetails>,
    reservations: HashMap<OrderId, StockRequirement>,
    closes: BTreeMap<NaiveDate, DailyClose>,
    last_product_id: i64,
    last_order_id: i64,
    last_line_id: i64,
}

impl MemoryState {
    /// Applies every delta or none of them.
    fn apply_stock_deltas(&mut self, deltas: &[(ProductId, i64)]) -> StoreResult<()> {
        for &(product_id, delta) in deltas {
            match self.products.get(&product_id).and_then(Product::stock) {
                Some(stock) if stock + delta >= 0 => {}
                _ => return Err(StoreError::StockConflict { product_id, delta }),
            }
        }

        for &(product_id, delta) in deltas {
            if let Some(Product {
                kind: ProductKind::Base { stock },
                ..
            }) = self.products.get_mut(&product_id)
            {
                *stock += delta;
            }
        }

        Ok(())
    }

    fn next_product_id(&mut self) -> ProductId {
        self.last_product_id += 1;
        ProductId(self.last_product_id)
    }
}

/// Non-durable store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted counter of a base product.
    pub fn stock(&self, id: ProductId) -> Option<i64> {
        self.state.lock().products.get(&id).and_then(Product::stock)
    }

    pub fn daily_close(&self, date: NaiveDate) -> Option<DailyClose> {
        self.state.lock().closes.get(&date).cloned()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &NewOrder, reservation: &StockRequirement) -> StoreResult<OrderDetails> {
        let mut state = self.state.lock();

        if let Some(line) = order.lines.iter().find(|l| !state.products.contains_key(&l.product_id)) {
            return Err(StoreError::not_found("Product", line.product_id));
        }
        let deltas: Vec<_> = reservation.iter().map(|(id, units)| (id, -units)).collect();
        state.apply_stock_deltas(&deltas)?;

        let now = Utc::now();
        state.last_order_id += 1;
        let order_id = OrderId(state.last_order_id);

        let mut lines = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            state.last_line_id += 1;
            lines.push(OrderLine {
                id: state.last_line_id,
                order_id,
                product_id: line.product_id,
                name_snapshot: line.name_snapshot.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                extras: line.extras.clone(),
                notes: line.notes.clone(),
            });
        }

        let details = OrderDetails {
            order: Order {
                id: order_id,
                status: OrderStatus::Pending,
                total: order.total,
                waiter_id: order.waiter_id,
                customer_name: order.customer_name.clone(),
                customer_phone: order.customer_phone.clone(),
                cash_received: None,
                change_given: None,
                created_at: now,
                updated_at: now,
            },
            lines,
        };

        state.orders.insert(order_id, details.clone());
        state.reservations.insert(order_id, reservation.clone());
        Ok(details)
    }

    async fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().orders.get(&id).map(|d| d.order.clone()))
    }

    async fn order_details(&self, id: OrderId) -> StoreResult<Option<OrderDetails>> {
        Ok(self.state.lock().orders.get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> StoreResult<Option<Order>> {
        let mut state = self.state.lock();
        match state.orders.get_mut(&id) {
            Some(details) if details.order.status == expected => {
                details.order.status = next;
                details.order.updated_at = Utc::now();
                Ok(Some(details.order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_payment(
        &self,
        id: OrderId,
        cash_received: Money,
        change_given: Money,
    ) -> StoreResult<Option<Order>> {
        let mut state = self.state.lock();
        match state.orders.get_mut(&id) {
            Some(details) if details.order.status == OrderStatus::Ready => {
                let order = &mut details.order;
                order.status = OrderStatus::Paid;
                order.cash_received = Some(cash_received);
                order.change_given = Some(change_given);
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cancel(&self, id: OrderId, expected: OrderStatus) -> StoreResult<Option<(Order, StockRequirement)>> {
        let mut state = self.state.lock();

        let current = state.orders.get(&id).map(|d| d.order.status);
        if current != Some(expected) {
            return Ok(None);
        }

        let reservation = state.reservations.get(&id).cloned().unwrap_or_default();
        let deltas: Vec<_> = reservation.iter().collect();
        state.apply_stock_deltas(&deltas)?;

        let Some(details) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        details.order.status = OrderStatus::Cancelled;
        details.order.updated_at = Utc::now();
        Ok(Some((details.order.clone(), reservation)))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .state
            .lock()
            .orders
            .values()
            .filter(|d| filter.matches(&d.order))
            .map(|d| d.order.clone())
            .collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        Ok(orders)
    }

    async fn paid_total_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Money> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .map(|d| &d.order)
            .filter(|o| o.status == OrderStatus::Paid && o.updated_at >= start && o.updated_at < end)
            .map(|o| o.total)
            .sum())
    }

    async fn save_daily_close(&self, close: &DailyClose) -> StoreResult<()> {
        self.state.lock().closes.insert(close.business_date, close.clone());
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn load_catalog(&self) -> StoreResult<(Vec<Product>, Vec<ComboComponent>)> {
        let state = self.state.lock();
        Ok((state.products.values().cloned().collect(), state.components.clone()))
    }

    async fn insert_product(&self, product: &NewProduct) -> StoreResult<Product> {
        let mut state = self.state.lock();
        if let ProductKind::Variant { parent_id, .. } = product.kind {
            if !state.products.contains_key(&parent_id) {
                return Err(StoreError::not_found("Product", parent_id));
            }
        }

        let id = state.next_product_id();
        let stored = product.clone().into_product(id);
        state.products.insert(id, stored.clone());
        Ok(stored)
    }

    async fn insert_combo(
        &self,
        combo: &NewProduct,
        components: &[ComboComponent],
    ) -> StoreResult<(Product, Vec<ComboComponent>)> {
        let mut state = self.state.lock();
        if let Some(missing) = components.iter().find(|c| !state.products.contains_key(&c.component_id)) {
            return Err(StoreError::not_found("Product", missing.component_id));
        }

        let id = state.next_product_id();
        let stored = combo.clone().into_product(id);
        let components: Vec<ComboComponent> = components
            .iter()
            .map(|c| ComboComponent { combo_id: id, ..*c })
            .collect();

        state.products.insert(id, stored.clone());
        state.components.extend(components.iter().copied());
        Ok((stored, components))
    }

    async fn deactivate_product(&self, id: ProductId) -> StoreResult<()> {
        let mut state = self.state.lock();
        let product = state
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;
        product.is_active = false;
        Ok(())
    }

    async fn adjust_stock(&self, id: ProductId, delta: i64) -> StoreResult<i64> {
        let mut state = self.state.lock();
        state.apply_stock_deltas(&[(id, delta)])?;
        state
            .products
            .get(&id)
            .and_then(Product::stock)
            .ok_or_else(|| StoreError::not_found("Product", id))
    }
}
