//! # Error Types
//!
//! Domain error taxonomy for cantina-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  cantina-core errors (this file)                                       │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Malformed requests                             │
//! │                                                                         │
//! │  cantina-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  cantina-engine errors                                                 │
//! │  └── EngineError      - CoreError | persistence failure                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant is detected before any mutation happens and is a
//! recoverable, reportable outcome. Nothing here is fatal to the process.

use thiserror::Error;

use crate::lifecycle::OrderAction;
use crate::money::Money;
use crate::types::{OrderId, OrderStatus, ProductId};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Empty or malformed request.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced product, order or combo component does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A variant points at a parent that is missing or holds no stock.
    #[error("Variant {variant_id} references missing parent {parent_id}")]
    DanglingReference {
        variant_id: ProductId,
        parent_id: ProductId,
    },

    /// Resolving a combo revisited a combo already on the resolution path.
    #[error("Combo {combo_id} has a cyclic composition")]
    CyclicComposition { combo_id: ProductId },

    /// A reservation check failed.
    ///
    /// ## User Workflow
    /// ```text
    /// Waiter places order (needs 6 chicken)
    ///      │
    ///      ▼
    /// Ledger check: available=4
    ///      │
    ///      ▼
    /// InsufficientStock { shortfalls: [{ product: 1, requested: 6, available: 4 }] }
    ///      │
    ///      ▼
    /// Waiter is told immediately, nothing was reserved
    /// ```
    #[error("Insufficient stock: {}", describe_shortfalls(.shortfalls))]
    InsufficientStock { shortfalls: Vec<Shortfall> },

    /// The order is not in a state that allows the requested action.
    #[error("Order {order_id} is {current}, cannot {attempted}")]
    InvalidTransition {
        order_id: OrderId,
        current: OrderStatus,
        attempted: OrderAction,
    },

    /// Cash received does not cover the order total.
    #[error("Order {order_id} totals {total}, received only {received}")]
    InsufficientPayment {
        order_id: OrderId,
        total: Money,
        received: Money,
    },
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Returns the first shortfall of an `InsufficientStock` error.
    pub fn first_shortfall(&self) -> Option<&Shortfall> {
        match self {
            CoreError::InsufficientStock { shortfalls } => shortfalls.first(),
            _ => None,
        }
    }
}

/// One product that could not cover a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub product_id: ProductId,
    pub requested: i64,
    pub available: i64,
}

fn describe_shortfalls(shortfalls: &[Shortfall]) -> String {
    shortfalls
        .iter()
        .map(|s| {
            format!(
                "product {} requested {}, available {}",
                s.product_id, s.requested, s.available
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when a request does not meet requirements and are raised
/// before any stock or persistence call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value is not in the allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Product is soft-deleted.
    #[error("Product {id} is no longer available")]
    Inactive { id: ProductId },

    /// Product has no price of its own (a base dish sold only through variants).
    #[error("{name} cannot be sold directly")]
    NotSellable { name: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
