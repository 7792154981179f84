//! # Order Repository
//!
//! Database operations for orders, their lines and their stock reservations.
//!
//! ## Atomic Units
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert_with_reservation (one transaction)                              │
//! │     ├── UPDATE products SET stock = stock - units   (per base product)  │
//! │     ├── INSERT orders            status = 'pending'                     │
//! │     ├── INSERT order_lines       frozen names, prices, extras JSON      │
//! │     └── INSERT order_reservations                                       │
//! │                                                                         │
//! │  compare_and_set_status                                                 │
//! │     └── UPDATE orders SET status = next WHERE id = ? AND status = prev  │
//! │                                                                         │
//! │  cancel (one transaction)                                               │
//! │     ├── UPDATE orders SET status = 'cancelled' WHERE status = prev      │
//! │     ├── SELECT order_reservations                                       │
//! │     └── UPDATE products SET stock = stock + units   (per base product)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A compare-and-set that matches no row means another writer moved the
//! order first. The caller gets `None` and decides what to report.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::product::apply_stock_delta;
use cantina_core::{
    Money, NewOrder, Order, OrderDetails, OrderExtra, OrderFilter, OrderId, OrderLine, OrderStatus,
    ProductId, StockRequirement,
};

const SELECT_ORDER: &str = r#"
    SELECT id, status, total_cents, waiter_id, customer_name, customer_phone,
           cash_received_cents, change_given_cents, created_at, updated_at
    FROM orders
"#;

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    status: OrderStatus,
    total_cents: i64,
    waiter_id: i64,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    cash_received_cents: Option<i64>,
    change_given_cents: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: OrderId(row.id),
            status: row.status,
            total: Money::from_cents(row.total_cents),
            waiter_id: row.waiter_id,
            customer_name: row.customer_name,
            customer_phone: row.customer_phone,
            cash_received: row.cash_received_cents.map(Money::from_cents),
            change_given: row.change_given_cents.map(Money::from_cents),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    name_snapshot: String,
    quantity: i64,
    unit_price_cents: i64,
    extras_json: String,
    notes: Option<String>,
}

impl TryFrom<LineRow> for OrderLine {
    type Error = serde_json::Error;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        let extras: Vec<OrderExtra> = serde_json::from_str(&row.extras_json)?;
        Ok(OrderLine {
            id: row.id,
            order_id: OrderId(row.order_id),
            product_id: ProductId(row.product_id),
            name_snapshot: row.name_snapshot,
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price_cents),
            extras,
            notes: row.notes,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReservationRow {
    product_id: i64,
    units: i64,
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Persists a new pending order, its lines and its reservation, and takes
    /// the reserved units off the stock counters, all in one transaction.
    pub async fn insert_with_reservation(
        &self,
        order: &NewOrder,
        requirement: &StockRequirement,
    ) -> DbResult<OrderDetails> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for (product_id, units) in requirement.iter() {
            apply_stock_delta(&mut tx, product_id, -units).await?;
        }

        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                status, total_cents, waiter_id, customer_name, customer_phone,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(OrderStatus::Pending)
        .bind(order.total.cents())
        .bind(order.waiter_id)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let order_id = OrderId(result.last_insert_rowid());

        let mut lines = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let extras_json = serde_json::to_string(&line.extras)?;
            let result = sqlx::query(
                r#"
                INSERT INTO order_lines (
                    order_id, product_id, name_snapshot, quantity,
                    unit_price_cents, extras_json, notes
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(order_id.0)
            .bind(line.product_id.0)
            .bind(&line.name_snapshot)
            .bind(line.quantity)
            .bind(line.unit_price.cents())
            .bind(&extras_json)
            .bind(&line.notes)
            .execute(&mut *tx)
            .await?;

            lines.push(OrderLine {
                id: result.last_insert_rowid(),
                order_id,
                product_id: line.product_id,
                name_snapshot: line.name_snapshot.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                extras: line.extras.clone(),
                notes: line.notes.clone(),
            });
        }

        for (product_id, units) in requirement.iter() {
            sqlx::query("INSERT INTO order_reservations (order_id, product_id, units) VALUES (?1, ?2, ?3)")
                .bind(order_id.0)
                .bind(product_id.0)
                .bind(units)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        debug!(
            order_id = %order_id,
            lines = lines.len(),
            reserved_products = requirement.len(),
            "Inserted order"
        );

        Ok(OrderDetails {
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
        })
    }

    pub async fn get_by_id(&self, id: OrderId) -> DbResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = ?1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Order::from))
    }

    /// Order with its lines in insertion order.
    pub async fn get_details(&self, id: OrderId) -> DbResult<Option<OrderDetails>> {
        let Some(order) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let lines = self.lines(id).await?;
        Ok(Some(OrderDetails { order, lines }))
    }

    pub async fn lines(&self, order_id: OrderId) -> DbResult<Vec<OrderLine>> {
        let rows: Vec<LineRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, name_snapshot, quantity,
                   unit_price_cents, extras_json, notes
            FROM order_lines
            WHERE order_id = ?1
            ORDER BY id
            "#,
        )
        .bind(order_id.0)
        .fetch_all(&self.pool)
        .await?;

        let lines = rows
            .into_iter()
            .map(OrderLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    /// The frozen reservation captured when the order was created.
    pub async fn reservation(&self, order_id: OrderId) -> DbResult<StockRequirement> {
        let rows: Vec<ReservationRow> =
            sqlx::query_as("SELECT product_id, units FROM order_reservations WHERE order_id = ?1")
                .bind(order_id.0)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|r| (ProductId(r.product_id), r.units))
            .collect())
    }

    /// Moves an order from `expected` to `next`.
    ///
    /// Returns `None` if the order is no longer in `expected`.
    pub async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> DbResult<Option<Order>> {
        debug!(order_id = %id, from = %expected, to = %next, "Updating order status");

        let result = sqlx::query("UPDATE orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2")
            .bind(id.0)
            .bind(expected)
            .bind(next)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    /// Marks a ready order paid with its cash amounts.
    ///
    /// Returns `None` if the order is not `ready`.
    pub async fn record_payment(
        &self,
        id: OrderId,
        cash_received: Money,
        change_given: Money,
    ) -> DbResult<Option<Order>> {
        debug!(order_id = %id, cash = %cash_received, change = %change_given, "Recording payment");

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?2,
                cash_received_cents = ?3,
                change_given_cents = ?4,
                updated_at = ?5
            WHERE id = ?1 AND status = ?6
            "#,
        )
        .bind(id.0)
        .bind(OrderStatus::Paid)
        .bind(cash_received.cents())
        .bind(change_given.cents())
        .bind(Utc::now())
        .bind(OrderStatus::Ready)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    /// Cancels an order still in `expected` and gives its reserved units
    /// back to the stock counters, in one transaction.
    ///
    /// Returns the cancelled order and the reservation that was given back,
    /// or `None` if the order is no longer in `expected`.
    pub async fn cancel(
        &self,
        id: OrderId,
        expected: OrderStatus,
    ) -> DbResult<Option<(Order, StockRequirement)>> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2")
            .bind(id.0)
            .bind(expected)
            .bind(OrderStatus::Cancelled)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let rows: Vec<ReservationRow> =
            sqlx::query_as("SELECT product_id, units FROM order_reservations WHERE order_id = ?1")
                .bind(id.0)
                .fetch_all(&mut *tx)
                .await?;
        let reservation: StockRequirement = rows
            .into_iter()
            .map(|r| (ProductId(r.product_id), r.units))
            .collect();

        for (product_id, units) in reservation.iter() {
            apply_stock_delta(&mut tx, product_id, units).await?;
        }

        let row: OrderRow = sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = ?1"))
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(order_id = %id, released_products = reservation.len(), "Cancelled order");

        Ok(Some((Order::from(row), reservation)))
    }

    /// Orders matching `filter`, oldest first.
    pub async fn list(&self, filter: &OrderFilter) -> DbResult<Vec<Order>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("{SELECT_ORDER} WHERE 1 = 1"));

        if !filter.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut statuses = qb.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(*status);
            }
            statuses.push_unseparated(")");
        }
        if let Some(waiter_id) = filter.waiter_id {
            qb.push(" AND waiter_id = ").push_bind(waiter_id);
        }
        if let Some(since) = filter.created_since {
            qb.push(" AND created_at >= ").push_bind(since);
        }
        if let Some((start, end)) = filter.updated_between {
            qb.push(" AND updated_at >= ").push_bind(start);
            qb.push(" AND updated_at < ").push_bind(end);
        }
        qb.push(" ORDER BY created_at, id");

        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        debug!(count = rows.len(), "Listed orders");
        Ok(rows.into_iter().map(Order::from).collect())
    }

    /// Sum of totals of orders paid within `[start, end)`.
    ///
    /// Paid is terminal, so `updated_at` of a paid order is its payment time.
    pub async fn paid_total_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(total_cents), 0)
            FROM orders
            WHERE status = ?1 AND updated_at >= ?2 AND updated_at < ?3
            "#,
        )
        .bind(OrderStatus::Paid)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use cantina_core::{NewOrderLine, NewProduct, ProductCategory, ProductKind};
    use chrono::Duration;

    struct Fixture {
        db: Database,
        fries: ProductId,
        cheese: ProductId,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let fries = db
            .products()
            .insert(&NewProduct::new(
                "Fries",
                ProductCategory::BaseDish,
                Some(Money::from_cents(1500)),
                ProductKind::Base { stock: 10 },
            ))
            .await
            .unwrap()
            .id;
        let cheese = db
            .products()
            .insert(&NewProduct::new(
                "Cheese",
                ProductCategory::Extra,
                Some(Money::from_cents(500)),
                ProductKind::Base { stock: 10 },
            ))
            .await
            .unwrap()
            .id;
        Fixture { db, fries, cheese }
    }

    fn new_order(fx: &Fixture, quantity: i64) -> (NewOrder, StockRequirement) {
        let line = NewOrderLine {
            product_id: fx.fries,
            name_snapshot: "Fries".to_string(),
            quantity,
            unit_price: Money::from_cents(2000),
            extras: vec![OrderExtra {
                product_id: fx.cheese,
                name: "Cheese".to_string(),
                unit_price: Money::from_cents(500),
                quantity: 1,
            }],
            notes: Some("crispy".to_string()),
        };
        let order = NewOrder {
            waiter_id: 4,
            customer_name: Some("Luis".to_string()),
            customer_phone: None,
            total: Money::from_cents(2000 * quantity),
            lines: vec![line],
        };
        let requirement = [(fx.fries, quantity), (fx.cheese, quantity)].into_iter().collect();
        (order, requirement)
    }

    async fn stock(fx: &Fixture, id: ProductId) -> i64 {
        fx.db.products().get_by_id(id).await.unwrap().unwrap().stock().unwrap()
    }

    #[tokio::test]
    async fn test_insert_persists_snapshot_and_takes_stock() {
        let fx = fixture().await;
        let (order, requirement) = new_order(&fx, 3);

        let details = fx.db.orders().insert_with_reservation(&order, &requirement).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::Pending);
        assert_eq!(stock(&fx, fx.fries).await, 7);
        assert_eq!(stock(&fx, fx.cheese).await, 7);

        let loaded = fx.db.orders().get_details(details.order.id).await.unwrap().unwrap();
        assert_eq!(loaded.lines, details.lines);
        assert_eq!(loaded.lines[0].extras[0].name, "Cheese");
        assert_eq!(loaded.order.customer_name.as_deref(), Some("Luis"));
        assert_eq!(fx.db.orders().reservation(details.order.id).await.unwrap(), requirement);
    }

    #[tokio::test]
    async fn test_insert_rolls_back_when_stock_is_short() {
        let fx = fixture().await;
        let (order, requirement) = new_order(&fx, 11);

        let err = fx.db.orders().insert_with_reservation(&order, &requirement).await.unwrap_err();
        assert!(matches!(err, DbError::StockConflict { .. }));
        assert_eq!(stock(&fx, fx.fries).await, 10);
        assert!(fx.db.orders().list(&OrderFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_set_has_one_winner() {
        let fx = fixture().await;
        let (order, requirement) = new_order(&fx, 1);
        let id = fx.db.orders().insert_with_reservation(&order, &requirement).await.unwrap().order.id;

        let repo = fx.db.orders();
        let first = repo
            .compare_and_set_status(id, OrderStatus::Pending, OrderStatus::SentToKitchen)
            .await
            .unwrap();
        let second = repo
            .compare_and_set_status(id, OrderStatus::Pending, OrderStatus::SentToKitchen)
            .await
            .unwrap();

        assert_eq!(first.map(|o| o.status), Some(OrderStatus::SentToKitchen));
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_cancel_gives_back_frozen_reservation() {
        let fx = fixture().await;
        let (order, requirement) = new_order(&fx, 3);
        let id = fx.db.orders().insert_with_reservation(&order, &requirement).await.unwrap().order.id;

        let (cancelled, released) = fx
            .db
            .orders()
            .cancel(id, OrderStatus::Pending)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(released, requirement);
        assert_eq!(stock(&fx, fx.fries).await, 10);
        assert_eq!(stock(&fx, fx.cheese).await, 10);

        // A second cancel does not give the units back twice.
        assert!(fx.db.orders().cancel(id, OrderStatus::Pending).await.unwrap().is_none());
        assert_eq!(stock(&fx, fx.fries).await, 10);
    }

    #[tokio::test]
    async fn test_payment_and_paid_total() {
        let fx = fixture().await;
        let (order, requirement) = new_order(&fx, 2);
        let repo = fx.db.orders();
        let id = repo.insert_with_reservation(&order, &requirement).await.unwrap().order.id;

        assert!(repo
            .record_payment(id, Money::from_cents(5000), Money::from_cents(1000))
            .await
            .unwrap()
            .is_none());

        for (from, to) in [
            (OrderStatus::Pending, OrderStatus::SentToKitchen),
            (OrderStatus::SentToKitchen, OrderStatus::InPreparation),
            (OrderStatus::InPreparation, OrderStatus::Ready),
        ] {
            repo.compare_and_set_status(id, from, to).await.unwrap().unwrap();
        }

        let paid = repo
            .record_payment(id, Money::from_cents(5000), Money::from_cents(1000))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.change_given, Some(Money::from_cents(1000)));

        let now = Utc::now();
        let total = repo
            .paid_total_between(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(total, Money::from_cents(4000));

        let yesterday = repo
            .paid_total_between(now - Duration::hours(48), now - Duration::hours(24))
            .await
            .unwrap();
        assert!(yesterday.is_zero());
    }

    #[tokio::test]
    async fn test_list_filters() {
        let fx = fixture().await;
        let repo = fx.db.orders();
        let (order, requirement) = new_order(&fx, 1);
        let first = repo.insert_with_reservation(&order, &requirement).await.unwrap().order.id;

        let (mut other, requirement) = new_order(&fx, 1);
        other.waiter_id = 9;
        let second = repo.insert_with_reservation(&other, &requirement).await.unwrap().order.id;
        repo.compare_and_set_status(second, OrderStatus::Pending, OrderStatus::SentToKitchen)
            .await
            .unwrap();

        let all: Vec<_> = repo.list(&OrderFilter::active()).await.unwrap().into_iter().map(|o| o.id).collect();
        assert_eq!(all, vec![first, second]);

        let mine = repo.list(&OrderFilter::active().for_waiter(9)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, second);

        let kitchen = repo.list(&OrderFilter::with_statuses(&OrderStatus::KITCHEN)).await.unwrap();
        assert_eq!(kitchen.len(), 1);

        let future = repo
            .list(&OrderFilter::default().since(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();
        assert!(future.is_empty());

        let now = Utc::now();
        let recent = repo
            .list(&OrderFilter::default().updated_between(now - Duration::hours(1), now + Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);

        let yesterday = repo
            .list(&OrderFilter::default().updated_between(now - Duration::hours(48), now - Duration::hours(24)))
            .await
            .unwrap();
        assert!(yesterday.is_empty());
    }
}
