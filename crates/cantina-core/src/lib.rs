//! # cantina-core: Pure Business Logic for Cantina POS
//!
//! This crate is the **heart** of the order & inventory consistency engine.
//! It contains the domain model and every rule that can be expressed without
//! I/O: catalog resolution, order pricing, the order state machine and the
//! domain events those transitions produce.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Cantina POS Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Waiter / Kitchen / Admin clients (external)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   cantina-engine: StockLedger, OrderLifecycleManager, Notifier  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ cantina-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  catalog  │  │ lifecycle │  │  events   │  │   │
//! │  │   │  Product  │  │  Resolver │  │  Status   │  │ Audience  │  │   │
//! │  │   │   Order   │  │  Pricing  │  │  Actions  │  │ Payloads  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO LOCKS • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Order, OrderLine, requests)
//! - [`money`] - Money type with integer arithmetic
//! - [`catalog`] - Catalog arena and stock requirement resolution
//! - [`lifecycle`] - Order state machine
//! - [`events`] - Domain events and their audiences
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use cantina_core::catalog::Catalog;
//! use cantina_core::types::{Product, ProductCategory, ProductId, ProductKind};
//! use cantina_core::Money;
//!
//! let mut catalog = Catalog::new();
//! catalog.insert_product(Product::new(
//!     ProductId(1),
//!     "Chicken",
//!     ProductCategory::BaseDish,
//!     None,
//!     ProductKind::Base { stock: 40 },
//! ));
//! catalog.insert_product(Product::new(
//!     ProductId(2),
//!     "Half chicken",
//!     ProductCategory::BaseDish,
//!     Some(Money::from_cents(4500)),
//!     ProductKind::Variant { parent_id: ProductId(1), stock_consumption: 2 },
//! ));
//!
//! // Three half chickens consume six units of the base product.
//! let requirement = catalog.resolve(ProductId(2), 3).unwrap();
//! assert_eq!(requirement.units(ProductId(1)), 6);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::{Catalog, PreparedOrder, StockRequirement};
pub use error::{CoreError, CoreResult, Shortfall, ValidationError};
pub use events::{Audience, DomainEvent};
pub use lifecycle::OrderAction;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single order.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single line or extra.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 100 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum units of parent stock a single variant may consume.
pub const MAX_STOCK_CONSUMPTION: i64 = 1000;

/// Base products at or below this stock level are reported as running low.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;
