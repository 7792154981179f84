//! # Repository Module
//!
//! Database repository implementations for Cantina POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engine                                                                 │
//! │       │                                                                 │
//! │       │  db.orders().insert_with_reservation(&order, &requirement)     │
//! │       ▼                                                                 │
//! │  OrderRepository                                                       │
//! │  ├── insert_with_reservation  (order + lines + reservation + stock)    │
//! │  ├── compare_and_set_status                                            │
//! │  ├── record_payment                                                    │
//! │  └── cancel                   (status + reservation give-back)         │
//! │       │                                                                 │
//! │       │  SQL in one transaction                                        │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog, combo composition, stock counters
//! - [`order::OrderRepository`] - Orders, lines, reservations
//! - [`daily_close::DailyCloseRepository`] - End-of-day cash reconciliation

pub mod daily_close;
pub mod order;
pub mod product;
