//! # Order Lifecycle Manager
//!
//! Drives orders through their lifecycle and keeps stock and order state
//! consistent while doing it.
//!
//! ## State Machine
//! ```text
//!   create ──▶ pending ──send──▶ sent_to_kitchen ──start──▶ in_preparation
//!                 │                    │                         │
//!               cancel               cancel                    ready
//!                 │                    │                         ▼
//!                 └──────▶ cancelled ◀─┘                       ready ──pay──▶ paid
//! ```
//!
//! ## Create Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. catalog.prepare_order   validate, price, resolve     (no mutation)  │
//! │  2. ledger.reserve          all-or-nothing               (in memory)    │
//! │  3. store.insert_order      order + lines + reservation  (one unit)     │
//! │        failure → ledger.release(requirement), return the error          │
//! │  4. publish OrderCreated and StockChanged per product                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transitions
//! Every transition checks the state machine against the order it read,
//! then asks the store to compare-and-set from that status. When two
//! callers race on one order exactly one CAS matches; the other re-reads
//! the order and gets `InvalidTransition`.
//!
//! Notifications go out only after the store has committed.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use cantina_core::lifecycle::{next_status, settle_payment};
use cantina_core::validation::validate_cash_amount;
use cantina_core::{
    CoreError, CreateOrderRequest, DailyClose, DomainEvent, Money, Order, OrderAction, OrderDetails, OrderFilter,
    OrderId, OrderStatus, Product, StockLevel,
};

use crate::catalog::CatalogService;
use crate::config::{BusinessSettings, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::ledger::StockLedger;
use crate::notify::{dispatch, Notifier};
use crate::store::OrderStore;

pub struct OrderLifecycleManager {
    catalog: Arc<CatalogService>,
    ledger: Arc<StockLedger>,
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    business: BusinessSettings,
    low_stock_threshold: i64,
}

impl std::fmt::Debug for OrderLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLifecycleManager")
            .field("catalog", &self.catalog)
            .field("business", &self.business)
            .field("low_stock_threshold", &self.low_stock_threshold)
            .finish_non_exhaustive()
    }
}

impl OrderLifecycleManager {
    pub fn new(catalog: Arc<CatalogService>, store: Arc<dyn OrderStore>, notifier: Arc<dyn Notifier>) -> Self {
        OrderLifecycleManager {
            ledger: catalog.ledger(),
            catalog,
            store,
            notifier,
            business: BusinessSettings::default(),
            low_stock_threshold: cantina_core::DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    /// Applies the business day and low-stock settings of `config`.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.business = config.business.clone();
        self.low_stock_threshold = config.inventory.low_stock_threshold;
        self
    }

    pub fn catalog(&self) -> &Arc<CatalogService> {
        &self.catalog
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Places a new order in `pending`, reserving every unit it needs.
    ///
    /// Fails with `InsufficientStock` (nothing reserved) when any base
    /// product cannot cover the order.
    pub async fn create_order(&self, request: CreateOrderRequest) -> EngineResult<OrderDetails> {
        let prepared = self.catalog.prepare_order(&request)?;
        let levels = self.ledger.reserve(&prepared.requirement)?;

        let details = match self.store.insert_order(&prepared.order, &prepared.requirement).await {
            Ok(details) => details,
            Err(err) => {
                warn!(waiter_id = request.waiter_id, error = %err, "Persisting order failed, releasing reservation");
                if let Err(release_err) = self.ledger.release(&prepared.requirement) {
                    error!(error = %release_err, "Could not release reservation of unsaved order");
                }
                return Err(err.into());
            }
        };

        info!(
            order_id = %details.order.id,
            waiter_id = details.order.waiter_id,
            total = %details.order.total,
            lines = details.lines.len(),
            "Order created"
        );

        self.emit(&DomainEvent::order_created(&details));
        self.emit_stock_levels(levels);
        Ok(details)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// `pending → sent_to_kitchen`, publishing the kitchen ticket.
    pub async fn send_to_kitchen(&self, id: OrderId) -> EngineResult<OrderDetails> {
        // Lines never change after creation, so reading them first is safe.
        let details = self.load_details(id).await?;
        let order = self.apply(&details.order, OrderAction::SendToKitchen).await?;
        let details = OrderDetails {
            order,
            lines: details.lines,
        };

        self.emit(&DomainEvent::kitchen_ticket(&details));
        Ok(details)
    }

    /// `sent_to_kitchen → in_preparation`.
    pub async fn start_preparation(&self, id: OrderId) -> EngineResult<Order> {
        self.transition(id, OrderAction::StartPreparation).await
    }

    /// `in_preparation → ready`.
    pub async fn mark_ready(&self, id: OrderId) -> EngineResult<Order> {
        self.transition(id, OrderAction::MarkReady).await
    }

    /// `ready → paid` once `cash_received` covers the total.
    ///
    /// Short cash fails with `InsufficientPayment` and the order stays
    /// `ready`.
    pub async fn process_payment(&self, id: OrderId, cash_received: Money) -> EngineResult<Order> {
        let order = self.load_order(id).await?;
        next_status(id, order.status, OrderAction::ProcessPayment)?;
        validate_cash_amount(cash_received).map_err(CoreError::from)?;
        let change = settle_payment(&order, cash_received)?;

        let Some(paid) = self.store.record_payment(id, cash_received, change).await? else {
            return Err(self.lost_race(id, OrderAction::ProcessPayment).await);
        };

        info!(order_id = %id, total = %paid.total, cash = %cash_received, change = %change, "Order paid");
        self.emit(&DomainEvent::order_paid(&paid));
        Ok(paid)
    }

    /// `pending | sent_to_kitchen → cancelled`, giving back the frozen
    /// reservation.
    pub async fn cancel(&self, id: OrderId) -> EngineResult<Order> {
        let order = self.load_order(id).await?;
        next_status(id, order.status, OrderAction::Cancel)?;

        let Some((cancelled, reservation)) = self.store.cancel(id, order.status).await? else {
            return Err(self.lost_race(id, OrderAction::Cancel).await);
        };

        let levels = match self.ledger.release(&reservation) {
            Ok(levels) => levels,
            Err(err) => {
                error!(order_id = %id, error = %err, "Cancelled order but could not release its reservation");
                Vec::new()
            }
        };

        info!(order_id = %id, from = %order.status, released = reservation.len(), "Order cancelled");
        self.emit(&DomainEvent::OrderCancelled { order_id: id });
        self.emit_stock_levels(levels);
        Ok(cancelled)
    }

    async fn transition(&self, id: OrderId, action: OrderAction) -> EngineResult<Order> {
        let order = self.load_order(id).await?;
        let updated = self.apply(&order, action).await?;

        self.emit(&DomainEvent::status_changed(&updated));
        Ok(updated)
    }

    /// Checks `action` against `order` and compare-and-sets the new status.
    async fn apply(&self, order: &Order, action: OrderAction) -> EngineResult<Order> {
        let next = next_status(order.id, order.status, action)?;

        match self.store.compare_and_set_status(order.id, order.status, next).await? {
            Some(updated) => {
                info!(order_id = %order.id, from = %order.status, to = %next, "Order status changed");
                Ok(updated)
            }
            None => Err(self.lost_race(order.id, action).await),
        }
    }

    /// The error for a caller whose compare-and-set matched nothing.
    async fn lost_race(&self, id: OrderId, action: OrderAction) -> EngineError {
        match self.store.order(id).await {
            Ok(Some(current)) => {
                warn!(order_id = %id, current = %current.status, %action, "Lost a concurrent transition");
                CoreError::InvalidTransition {
                    order_id: id,
                    current: current.status,
                    attempted: action,
                }
                .into()
            }
            Ok(None) => CoreError::not_found("Order", id).into(),
            Err(err) => err.into(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_order(&self, id: OrderId) -> EngineResult<OrderDetails> {
        self.load_details(id).await
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> EngineResult<Vec<Order>> {
        Ok(self.store.list_orders(filter).await?)
    }

    /// Orders still being worked on, optionally only one waiter's.
    pub async fn active_orders(&self, waiter_id: Option<i64>) -> EngineResult<Vec<Order>> {
        let mut filter = OrderFilter::active();
        filter.waiter_id = waiter_id;
        self.list_orders(&filter).await
    }

    /// Orders the kitchen has to work on, oldest first, with their lines.
    pub async fn kitchen_queue(&self) -> EngineResult<Vec<OrderDetails>> {
        let orders = self
            .store
            .list_orders(&OrderFilter::with_statuses(&OrderStatus::KITCHEN))
            .await?;

        let mut queue = Vec::with_capacity(orders.len());
        for order in orders {
            let lines = match self.store.order_details(order.id).await? {
                Some(details) => details.lines,
                None => continue,
            };
            queue.push(OrderDetails { order, lines });
        }
        Ok(queue)
    }

    /// Orders paid on a business date, in creation order.
    pub async fn paid_orders_on(&self, date: NaiveDate) -> EngineResult<Vec<Order>> {
        let (start, end) = self.business.day_bounds(date);
        let filter = OrderFilter::with_statuses(&[OrderStatus::Paid]).updated_between(start, end);
        Ok(self.store.list_orders(&filter).await?)
    }

    /// Σ totals of orders paid on a business date.
    pub async fn sales_total(&self, date: NaiveDate) -> EngineResult<Money> {
        let (start, end) = self.business.day_bounds(date);
        Ok(self.store.paid_total_between(start, end).await?)
    }

    /// Reconciles the cash in the register against the day's sales.
    ///
    /// Closing a date again replaces the earlier close.
    pub async fn daily_close(&self, date: NaiveDate, cash_in_register: Money) -> EngineResult<DailyClose> {
        validate_cash_amount(cash_in_register).map_err(CoreError::from)?;

        let total_sales = self.sales_total(date).await?;
        let close = DailyClose::new(date, total_sales, cash_in_register, Utc::now());
        self.store.save_daily_close(&close).await?;

        info!(
            date = %date,
            total_sales = %close.total_sales,
            cash = %close.cash_in_register,
            difference = %close.difference,
            "Daily close saved"
        );
        Ok(close)
    }

    /// Current business date.
    pub fn today(&self) -> NaiveDate {
        self.business.business_date(Utc::now())
    }

    /// Active base products at or below the configured threshold.
    pub fn low_stock(&self) -> Vec<Product> {
        self.catalog.low_stock(self.low_stock_threshold)
    }

    async fn load_order(&self, id: OrderId) -> EngineResult<Order> {
        self.store
            .order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", id).into())
    }

    async fn load_details(&self, id: OrderId) -> EngineResult<OrderDetails> {
        self.store
            .order_details(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", id).into())
    }

    fn emit(&self, event: &DomainEvent) {
        dispatch(self.notifier.as_ref(), event);
    }

    fn emit_stock_levels(&self, levels: Vec<StockLevel>) {
        for level in levels {
            self.emit(&DomainEvent::stock_changed(level));
        }
    }
}
