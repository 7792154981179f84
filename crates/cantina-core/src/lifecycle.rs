//! # Order Lifecycle
//!
//! The order state machine as pure functions.
//!
//! ```text
//! ┌──────────┬──────────────────┬─────────────────┐
//! │ From     │ Action           │ To              │
//! ├──────────┼──────────────────┼─────────────────┤
//! │ pending  │ send_to_kitchen  │ sent_to_kitchen │
//! │ sent_to_ │ start_preparation│ in_preparation  │
//! │ kitchen  │                  │                 │
//! │ in_prep. │ mark_ready       │ ready           │
//! │ ready    │ process_payment  │ paid            │
//! │ pending, │ cancel           │ cancelled       │
//! │ sent_to_ │                  │                 │
//! │ kitchen  │                  │                 │
//! └──────────┴──────────────────┴─────────────────┘
//! ```
//!
//! `paid` and `cancelled` accept no action. Every other pairing is an
//! `InvalidTransition`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Order, OrderId, OrderStatus};

/// An action requested on an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    SendToKitchen,
    StartPreparation,
    MarkReady,
    ProcessPayment,
    Cancel,
}

impl OrderAction {
    /// Statuses from which this action is allowed.
    pub fn allowed_from(&self) -> &'static [OrderStatus] {
        match self {
            OrderAction::SendToKitchen => &[OrderStatus::Pending],
            OrderAction::StartPreparation => &[OrderStatus::SentToKitchen],
            OrderAction::MarkReady => &[OrderStatus::InPreparation],
            OrderAction::ProcessPayment => &[OrderStatus::Ready],
            OrderAction::Cancel => &[OrderStatus::Pending, OrderStatus::SentToKitchen],
        }
    }

    /// Status the order ends up in.
    pub fn target(&self) -> OrderStatus {
        match self {
            OrderAction::SendToKitchen => OrderStatus::SentToKitchen,
            OrderAction::StartPreparation => OrderStatus::InPreparation,
            OrderAction::MarkReady => OrderStatus::Ready,
            OrderAction::ProcessPayment => OrderStatus::Paid,
            OrderAction::Cancel => OrderStatus::Cancelled,
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderAction::SendToKitchen => "send to kitchen",
            OrderAction::StartPreparation => "start preparation",
            OrderAction::MarkReady => "mark ready",
            OrderAction::ProcessPayment => "process payment",
            OrderAction::Cancel => "cancel",
        })
    }
}

/// Computes the next status, or `InvalidTransition` if `action` is not
/// allowed from `current`.
pub fn next_status(order_id: OrderId, current: OrderStatus, action: OrderAction) -> CoreResult<OrderStatus> {
    if action.allowed_from().contains(&current) {
        Ok(action.target())
    } else {
        Err(CoreError::InvalidTransition {
            order_id,
            current,
            attempted: action,
        })
    }
}

/// Checks a cash payment against an order and returns the change due.
///
/// The status check comes first so a paid or cancelled order reports
/// `InvalidTransition` regardless of the amount.
pub fn settle_payment(order: &Order, cash_received: Money) -> CoreResult<Money> {
    next_status(order.id, order.status, OrderAction::ProcessPayment)?;

    if cash_received < order.total {
        return Err(CoreError::InsufficientPayment {
            order_id: order.id,
            total: order.total,
            received: cash_received,
        });
    }

    Ok(cash_received - order.total)
}

// =============================================================================
// Unit Tests
// =============================================================================
