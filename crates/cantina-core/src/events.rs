//! # Domain Events
//!
//! Values describing what happened to an order or to stock, plus the
//! role-scoped audiences each one is addressed to.
//!
//! ```text
//! ┌──────────────────────┬─────────┬─────────┬───────┐
//! │ Event                │ Kitchen │ Waiters │ Admin │
//! ├──────────────────────┼─────────┼─────────┼───────┤
//! │ order_created        │         │    ✓    │   ✓   │
//! │ new_kitchen_ticket   │    ✓    │         │       │
//! │ order_status_changed │    ✓    │    ✓    │       │
//! │ order_paid           │         │    ✓    │   ✓   │
//! │ order_cancelled      │    ✓    │    ✓    │   ✓   │
//! │ stock_changed        │    ✓    │    ✓    │   ✓   │
//! └──────────────────────┴─────────┴─────────┴───────┘
//! ```
//!
//! Events are built here and delivered by the engine only after the change
//! they describe has been committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;
use crate::types::{Order, OrderDetails, OrderId, OrderStatus, ProductId, StockLevel};

/// A role-scoped group of listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Kitchen,
    Waiters,
    Admin,
}

impl Audience {
    pub const ALL: [Audience; 3] = [Audience::Kitchen, Audience::Waiters, Audience::Admin];
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Audience::Kitchen => "kitchen",
            Audience::Waiters => "waiters",
            Audience::Admin => "admin",
        })
    }
}

/// One item on a kitchen ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketItem {
    /// "Parent (Variant)" for variants.
    pub name: String,
    pub quantity: i64,
    /// Extra names, suffixed with " xN" when more than one ("Cheese x2").
    pub extras: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderCreated {
        order_id: OrderId,
        waiter_id: i64,
        total: Money,
        line_count: usize,
    },
    NewKitchenTicket {
        order_id: OrderId,
        waiter_id: i64,
        customer_name: Option<String>,
        items: Vec<TicketItem>,
        created_at: DateTime<Utc>,
    },
    OrderStatusChanged {
        order_id: OrderId,
        status: OrderStatus,
    },
    OrderPaid {
        order_id: OrderId,
        total: Money,
        cash_received: Money,
        change_given: Money,
    },
    OrderCancelled {
        order_id: OrderId,
    },
    StockChanged {
        product_id: ProductId,
        new_stock: i64,
    },
}

impl DomainEvent {
    pub fn order_created(details: &OrderDetails) -> Self {
        DomainEvent::OrderCreated {
            order_id: details.order.id,
            waiter_id: details.order.waiter_id,
            total: details.order.total,
            line_count: details.lines.len(),
        }
    }

    /// Ticket for the kitchen screen, built from the frozen line snapshots.
    pub fn kitchen_ticket(details: &OrderDetails) -> Self {
        let items = details
            .lines
            .iter()
            .map(|line| TicketItem {
                name: line.name_snapshot.clone(),
                quantity: line.quantity,
                extras: line
                    .extras
                    .iter()
                    .map(|e| {
                        if e.quantity > 1 {
                            format!("{} x{}", e.name, e.quantity)
                        } else {
                            e.name.clone()
                        }
                    })
                    .collect(),
                notes: line.notes.clone(),
            })
            .collect();

        DomainEvent::NewKitchenTicket {
            order_id: details.order.id,
            waiter_id: details.order.waiter_id,
            customer_name: details.order.customer_name.clone(),
            items,
            created_at: details.order.created_at,
        }
    }

    pub fn status_changed(order: &Order) -> Self {
        DomainEvent::OrderStatusChanged {
            order_id: order.id,
            status: order.status,
        }
    }

    /// Payment event. Missing cash fields read as an exact payment.
    pub fn order_paid(order: &Order) -> Self {
        DomainEvent::OrderPaid {
            order_id: order.id,
            total: order.total,
            cash_received: order.cash_received.unwrap_or(order.total),
            change_given: order.change_given.unwrap_or_default(),
        }
    }

    pub fn stock_changed(level: StockLevel) -> Self {
        DomainEvent::StockChanged {
            product_id: level.product_id,
            new_stock: level.stock,
        }
    }

    /// Wire name of the event, matching the serialized `type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated { .. } => "order_created",
            DomainEvent::NewKitchenTicket { .. } => "new_kitchen_ticket",
            DomainEvent::OrderStatusChanged { .. } => "order_status_changed",
            DomainEvent::OrderPaid { .. } => "order_paid",
            DomainEvent::OrderCancelled { .. } => "order_cancelled",
            DomainEvent::StockChanged { .. } => "stock_changed",
        }
    }

    pub fn audiences(&self) -> &'static [Audience] {
        match self {
            DomainEvent::OrderCreated { .. } | DomainEvent::OrderPaid { .. } => {
                &[Audience::Waiters, Audience::Admin]
            }
            DomainEvent::NewKitchenTicket { .. } => &[Audience::Kitchen],
            DomainEvent::OrderStatusChanged { .. } => &[Audience::Kitchen, Audience::Waiters],
            DomainEvent::OrderCancelled { .. } | DomainEvent::StockChanged { .. } => &Audience::ALL,
        }
    }

    /// JSON payload handed to notification transports.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderExtra, OrderLine};

    fn details() -> OrderDetails {
        let now = Utc::now();
        OrderDetails {
            order: Order {
                id: OrderId(3),
                status: OrderStatus::SentToKitchen,
                total: Money::from_cents(10000),
                waiter_id: 2,
                customer_name: Some("Ana".to_string()),
                customer_phone: None,
                cash_received: None,
                change_given: None,
                created_at: now,
                updated_at: now,
            },
            lines: vec![OrderLine {
                id: 1,
                order_id: OrderId(3),
                product_id: ProductId(2),
                name_snapshot: "Chicken (Half)".to_string(),
                quantity: 2,
                unit_price: Money::from_cents(5000),
                extras: vec![OrderExtra {
                    product_id: ProductId(5),
                    name: "Cheese".to_string(),
                    unit_price: Money::from_cents(500),
                    quantity: 2,
                }],
                notes: Some("well done".to_string()),
            }],
        }
    }

    #[test]
    fn test_kitchen_ticket_uses_snapshots() {
        let DomainEvent::NewKitchenTicket { items, customer_name, .. } = DomainEvent::kitchen_ticket(&details())
        else {
            panic!("expected a kitchen ticket");
        };
        assert_eq!(customer_name.as_deref(), Some("Ana"));
        assert_eq!(items[0].name, "Chicken (Half)");
        assert_eq!(items[0].extras, vec!["Cheese x2".to_string()]);
        assert_eq!(items[0].notes.as_deref(), Some("well done"));
    }

    #[test]
    fn test_audiences() {
        let ticket = DomainEvent::kitchen_ticket(&details());
        assert_eq!(ticket.audiences(), &[Audience::Kitchen]);

        let stock = DomainEvent::stock_changed(StockLevel {
            product_id: ProductId(1),
            stock: 4,
        });
        assert_eq!(stock.audiences().len(), 3);

        let status = DomainEvent::status_changed(&details().order);
        assert!(!status.audiences().contains(&Audience::Admin));
    }

    #[test]
    fn test_payload_carries_type_tag() {
        let event = DomainEvent::stock_changed(StockLevel {
            product_id: ProductId(1),
            stock: 4,
        });
        let payload = event.payload();
        assert_eq!(payload["type"], event.event_type());
        assert_eq!(payload["product_id"], 1);
        assert_eq!(payload["new_stock"], 4);
    }
}
