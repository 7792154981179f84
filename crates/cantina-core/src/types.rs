//! # Domain Types
//!
//! Core domain types used throughout Cantina POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Order      │   │    OrderLine    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │   │  id (i64)       │   │  product_id     │       │
//! │  │  category       │   │  status         │   │  name_snapshot  │       │
//! │  │  kind ──────┐   │   │  total          │   │  unit_price     │       │
//! │  │  price      │   │   │  waiter_id      │   │  extras[]       │       │
//! │  └─────────────┼───┘   └─────────────────┘   └─────────────────┘       │
//! │                ▼                                                        │
//! │  ┌──────────────────────────────────────┐    ┌─────────────────┐       │
//! │  │ ProductKind                          │    │   OrderStatus   │       │
//! │  │  Base    { stock }                   │    │  pending → ...  │       │
//! │  │  Variant { parent_id, consumption }  │    │  paid/cancelled │       │
//! │  │  Combo   (components in Catalog)     │    └─────────────────┘       │
//! │  └──────────────────────────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Order lines freeze the display name and unit price (extras included) at
//! order time. Later catalog edits never change an existing order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Identifiers
// =============================================================================

/// Catalog product identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Product Category
// =============================================================================

/// Menu category of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    /// Main dish. A base dish may have no price and be sold only through variants.
    BaseDish,
    Drink,
    /// Add-on attached to an order line.
    Extra,
    Combo,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 4] = [
        ProductCategory::BaseDish,
        ProductCategory::Drink,
        ProductCategory::Extra,
        ProductCategory::Combo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::BaseDish => "base_dish",
            ProductCategory::Drink => "drink",
            ProductCategory::Extra => "extra",
            ProductCategory::Combo => "combo",
        }
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "category".to_string(),
                allowed: ProductCategory::ALL
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect(),
            })
    }
}

// =============================================================================
// Product
// =============================================================================

/// Structural kind of a product.
///
/// Only base products hold stock. Combos carry no stock at all, their
/// availability is always derived from their components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductKind {
    Base { stock: i64 },
    Variant {
        parent_id: ProductId,
        stock_consumption: i64,
    },
    Combo,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,

    /// Display name shown to waiters and on kitchen tickets.
    pub name: String,

    pub category: ProductCategory,

    /// Price per unit. `None` only for base dishes sold through variants.
    pub price: Option<Money>,

    #[serde(flatten)]
    pub kind: ProductKind,

    /// Soft delete flag.
    pub is_active: bool,
}

impl Product {
    /// Creates an active product.
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        category: ProductCategory,
        price: Option<Money>,
        kind: ProductKind,
    ) -> Self {
        Product {
            id,
            name: name.into(),
            category,
            price,
            kind,
            is_active: true,
        }
    }

    #[inline]
    pub fn is_base(&self) -> bool {
        matches!(self.kind, ProductKind::Base { .. })
    }

    #[inline]
    pub fn is_variant(&self) -> bool {
        matches!(self.kind, ProductKind::Variant { .. })
    }

    #[inline]
    pub fn is_combo(&self) -> bool {
        matches!(self.kind, ProductKind::Combo)
    }

    /// Stock counter of a base product.
    pub fn stock(&self) -> Option<i64> {
        match self.kind {
            ProductKind::Base { stock } => Some(stock),
            _ => None,
        }
    }

    pub fn parent_id(&self) -> Option<ProductId> {
        match self.kind {
            ProductKind::Variant { parent_id, .. } => Some(parent_id),
            _ => None,
        }
    }

    /// Checks that category, kind and price agree with each other.
    ///
    /// ```text
    /// Combo category   ⇔  Combo kind
    /// Extra category   ⇒  Base kind
    /// price == None    ⇒  BaseDish category, Base kind
    /// price, if any    >  0
    /// consumption      ≥  1
    /// stock            ≥  0
    /// ```
    pub fn validate_shape(&self) -> Result<(), ValidationError> {
        let is_combo_category = self.category == ProductCategory::Combo;
        if is_combo_category != self.is_combo() {
            return Err(ValidationError::NotAllowed {
                field: "category".to_string(),
                allowed: vec![if self.is_combo() {
                    ProductCategory::Combo.to_string()
                } else {
                    "base_dish, drink, extra".to_string()
                }],
            });
        }

        if self.category == ProductCategory::Extra && !self.is_base() {
            return Err(ValidationError::NotAllowed {
                field: "kind".to_string(),
                allowed: vec!["base".to_string()],
            });
        }

        match self.price {
            Some(price) if !price.is_positive() => {
                return Err(ValidationError::MustBePositive {
                    field: "price".to_string(),
                });
            }
            None if self.category != ProductCategory::BaseDish || !self.is_base() => {
                return Err(ValidationError::Required {
                    field: "price".to_string(),
                });
            }
            _ => {}
        }

        match self.kind {
            ProductKind::Base { stock } if stock < 0 => Err(ValidationError::OutOfRange {
                field: "stock".to_string(),
                min: 0,
                max: i64::MAX,
            }),
            ProductKind::Variant {
                stock_consumption, ..
            } if !(1..=crate::MAX_STOCK_CONSUMPTION).contains(&stock_consumption) => {
                Err(ValidationError::OutOfRange {
                    field: "stock_consumption".to_string(),
                    min: 1,
                    max: crate::MAX_STOCK_CONSUMPTION,
                })
            }
            _ => Ok(()),
        }
    }
}

/// A product before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub category: ProductCategory,
    pub price: Option<Money>,
    #[serde(flatten)]
    pub kind: ProductKind,
}

impl NewProduct {
    pub fn new(
        name: impl Into<String>,
        category: ProductCategory,
        price: Option<Money>,
        kind: ProductKind,
    ) -> Self {
        NewProduct {
            name: name.into(),
            category,
            price,
            kind,
        }
    }

    pub fn into_product(self, id: ProductId) -> Product {
        Product::new(id, self.name.trim(), self.category, self.price, self.kind)
    }
}

/// One entry of a combo's composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboComponent {
    pub combo_id: ProductId,
    pub component_id: ProductId,
    pub quantity: i64,
}

/// Current counter of one base product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock: i64,
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle status of an order.
///
/// ```text
/// pending ──► sent_to_kitchen ──► in_preparation ──► ready ──► paid
///    │               │
///    └───────┬───────┘
///            ▼
///        cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    SentToKitchen,
    InPreparation,
    Ready,
    Paid,
    Cancelled,
}

impl OrderStatus {
    /// Statuses of orders still being worked on.
    pub const ACTIVE: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::SentToKitchen,
        OrderStatus::InPreparation,
        OrderStatus::Ready,
    ];

    /// Statuses shown on the kitchen screen.
    pub const KITCHEN: [OrderStatus; 2] = [OrderStatus::SentToKitchen, OrderStatus::InPreparation];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::SentToKitchen => "sent_to_kitchen",
            OrderStatus::InPreparation => "in_preparation",
            OrderStatus::Ready => "ready",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order
// =============================================================================

/// An order placed by a waiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    /// Σ unit_price × quantity over the lines, fixed at creation.
    pub total: Money,
    pub waiter_id: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    /// Set only on payment.
    pub cash_received: Option<Money>,
    /// Set only on payment.
    pub change_given: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An extra attached to an order line, frozen at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExtra {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Money,
    /// Units of this extra per unit of the line.
    pub quantity: i64,
}

/// A line item in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Display name at time of order (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    /// Product price plus extras cost at time of order (frozen).
    pub unit_price: Money,
    pub extras: Vec<OrderExtra>,
    pub notes: Option<String>,
}

impl OrderLine {
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// An order together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

// =============================================================================
// Order Requests
// =============================================================================

/// An extra requested on a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

/// A line requested by a waiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub extras: Vec<ExtraRequest>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderLineRequest {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        OrderLineRequest {
            product_id,
            quantity,
            extras: Vec::new(),
            notes: None,
        }
    }

    pub fn with_extra(mut self, product_id: ProductId, quantity: i64) -> Self {
        self.extras.push(ExtraRequest {
            product_id,
            quantity,
        });
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Everything needed to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub waiter_id: i64,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub lines: Vec<OrderLineRequest>,
}

impl CreateOrderRequest {
    pub fn new(waiter_id: i64, lines: Vec<OrderLineRequest>) -> Self {
        CreateOrderRequest {
            waiter_id,
            customer_name: None,
            customer_phone: None,
            lines,
        }
    }
}

fn default_quantity() -> i64 {
    1
}

/// A priced, validated order ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub waiter_id: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub total: Money,
    pub lines: Vec<NewOrderLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub extras: Vec<OrderExtra>,
    pub notes: Option<String>,
}

// =============================================================================
// Listing
// =============================================================================

/// Filter for order listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Empty means every status.
    pub statuses: Vec<OrderStatus>,
    pub waiter_id: Option<i64>,
    pub created_since: Option<DateTime<Utc>>,
    /// Last change within `[start, end)`. For paid orders that is the
    /// payment time.
    pub updated_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl OrderFilter {
    /// Orders still being worked on.
    pub fn active() -> Self {
        OrderFilter {
            statuses: OrderStatus::ACTIVE.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_statuses(statuses: &[OrderStatus]) -> Self {
        OrderFilter {
            statuses: statuses.to_vec(),
            ..Default::default()
        }
    }

    pub fn for_waiter(mut self, waiter_id: i64) -> Self {
        self.waiter_id = Some(waiter_id);
        self
    }

    pub fn since(mut self, created_since: DateTime<Utc>) -> Self {
        self.created_since = Some(created_since);
        self
    }

    pub fn updated_between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.updated_between = Some((start, end));
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&order.status))
            && self.waiter_id.map_or(true, |w| w == order.waiter_id)
            && self.created_since.map_or(true, |t| order.created_at >= t)
            && self
                .updated_between
                .map_or(true, |(start, end)| order.updated_at >= start && order.updated_at < end)
    }
}

// =============================================================================
// Daily Close
// =============================================================================

/// End-of-day cash reconciliation, one per business date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyClose {
    pub business_date: NaiveDate,
    /// Σ totals of orders paid on the business date.
    pub total_sales: Money,
    pub cash_in_register: Money,
    /// cash_in_register − total_sales
    pub difference: Money,
    pub created_at: DateTime<Utc>,
}

impl DailyClose {
    pub fn new(
        business_date: NaiveDate,
        total_sales: Money,
        cash_in_register: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        DailyClose {
            business_date,
            total_sales,
            cash_in_register,
            difference: cash_in_register - total_sales,
            created_at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base(id: i64, category: ProductCategory, price: Option<i64>) -> Product {
        Product::new(
            ProductId(id),
            "Item",
            category,
            price.map(Money::from_cents),
            ProductKind::Base { stock: 10 },
        )
    }

    #[test]
    fn test_category_round_trip_through_str() {
        for category in ProductCategory::ALL {
            assert_eq!(category.as_str().parse::<ProductCategory>(), Ok(category));
        }
        assert!("dessert".parse::<ProductCategory>().is_err());
    }

    #[test]
    fn test_base_dish_without_price_is_valid() {
        assert!(base(1, ProductCategory::BaseDish, None).validate_shape().is_ok());
    }

    #[test]
    fn test_drink_without_price_is_rejected() {
        assert!(matches!(
            base(1, ProductCategory::Drink, None).validate_shape(),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_zero_price_is_rejected() {
        assert!(matches!(
            base(1, ProductCategory::Drink, Some(0)).validate_shape(),
            Err(ValidationError::MustBePositive { .. })
        ));
    }

    #[test]
    fn test_combo_kind_must_match_category() {
        let mut combo = base(1, ProductCategory::Combo, Some(5000));
        assert!(combo.validate_shape().is_err());

        combo.kind = ProductKind::Combo;
        assert!(combo.validate_shape().is_ok());

        combo.category = ProductCategory::Drink;
        assert!(combo.validate_shape().is_err());
    }

    #[test]
    fn test_extra_variant_is_rejected() {
        let mut extra = base(2, ProductCategory::Extra, Some(500));
        extra.kind = ProductKind::Variant {
            parent_id: ProductId(1),
            stock_consumption: 1,
        };
        assert!(extra.validate_shape().is_err());
    }

    #[test]
    fn test_variant_consumption_must_be_positive() {
        let mut variant = base(2, ProductCategory::BaseDish, Some(4500));
        variant.kind = ProductKind::Variant {
            parent_id: ProductId(1),
            stock_consumption: 0,
        };
        assert!(matches!(
            variant.validate_shape(),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Ready.is_terminal());
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_daily_close_difference() {
        let close = DailyClose::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Money::from_cents(50000),
            Money::from_cents(49000),
            Utc::now(),
        );
        assert_eq!(close.difference.cents(), -1000);
    }

    #[test]
    fn test_line_request_defaults_from_json() {
        let line: OrderLineRequest =
            serde_json::from_str(r#"{"product_id": 3, "quantity": 2, "extras": [{"product_id": 9}]}"#)
                .unwrap();
        assert_eq!(line.extras[0].quantity, 1);
        assert!(line.notes.is_none());
    }

    #[test]
    fn test_filter_updated_range_is_half_open() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 2, 6, 0, 0).unwrap();
        let filter = OrderFilter::with_statuses(&[OrderStatus::Paid]).updated_between(start, end);

        let paid_at = |at: DateTime<Utc>| Order {
            id: OrderId(1),
            status: OrderStatus::Paid,
            total: Money::from_cents(1000),
            waiter_id: 1,
            customer_name: None,
            customer_phone: None,
            cash_received: Some(Money::from_cents(1000)),
            change_given: Some(Money::zero()),
            created_at: start - chrono::Duration::hours(1),
            updated_at: at,
        };

        assert!(filter.matches(&paid_at(start)));
        assert!(filter.matches(&paid_at(end - chrono::Duration::seconds(1))));
        assert!(!filter.matches(&paid_at(end)));
        assert!(!filter.matches(&paid_at(start - chrono::Duration::seconds(1))));
    }
}
