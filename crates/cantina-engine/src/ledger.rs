//! # Stock Ledger
//!
//! Authoritative in-memory stock counters for every base product.
//!
//! ## Reservation Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve({1: 6, 3: 2})                                                  │
//! │                                                                         │
//! │   1. Look up the counter cells (read lock on the index)                 │
//! │   2. Lock cells in ascending product id order  ── no lock-order cycles  │
//! │        lock(#1) → lock(#3)                                              │
//! │   3. Check every entry: stock ≥ units                                   │
//! │        any failure → unlock, return every shortfall, nothing changed    │
//! │   4. Decrement every entry                                              │
//! │   5. Unlock, return the new levels                                      │
//! │                                                                         │
//! │  No I/O and no notification dispatch happens while cells are locked.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Requirements are [`StockRequirement`]s, which iterate in ascending id
//! order, so every caller acquires locks in the same global order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use cantina_core::{CoreError, CoreResult, ProductId, Shortfall, StockLevel, StockRequirement};

type Cell = Arc<Mutex<i64>>;

/// Per-product stock counters.
#[derive(Debug, Default)]
pub struct StockLedger {
    cells: RwLock<HashMap<ProductId, Cell>>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from persisted levels.
    pub fn from_levels(levels: impl IntoIterator<Item = StockLevel>) -> Self {
        let ledger = StockLedger::new();
        for level in levels {
            ledger.register(level.product_id, level.stock);
        }
        ledger
    }

    /// Starts tracking a base product. Replaces any existing counter.
    pub fn register(&self, product_id: ProductId, stock: i64) {
        self.cells
            .write()
            .insert(product_id, Arc::new(Mutex::new(stock)));
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.cells.read().contains_key(&product_id)
    }

    /// Current level of one product.
    pub fn level(&self, product_id: ProductId) -> Option<i64> {
        let cell = self.cells.read().get(&product_id).cloned()?;
        let stock = *cell.lock();
        Some(stock)
    }

    /// Current level of every tracked product, ordered by id.
    pub fn levels(&self) -> Vec<StockLevel> {
        let mut cells: Vec<(ProductId, Cell)> = self
            .cells
            .read()
            .iter()
            .map(|(id, cell)| (*id, Arc::clone(cell)))
            .collect();
        cells.sort_by_key(|(id, _)| *id);

        cells
            .into_iter()
            .map(|(product_id, cell)| StockLevel {
                product_id,
                stock: *cell.lock(),
            })
            .collect()
    }

    /// Products at or below `threshold`, lowest first.
    pub fn low_stock(&self, threshold: i64) -> Vec<StockLevel> {
        let mut low: Vec<_> = self
            .levels()
            .into_iter()
            .filter(|level| level.stock <= threshold)
            .collect();
        low.sort_by_key(|level| (level.stock, level.product_id));
        low
    }

    // =========================================================================
    // Reserve / Release
    // =========================================================================

    /// Takes every unit of `requirement` or nothing.
    ///
    /// On failure the error lists every product that could not cover its
    /// units, in ascending id order.
    pub fn reserve(&self, requirement: &StockRequirement) -> CoreResult<Vec<StockLevel>> {
        let cells = self.cells_for(requirement)?;
        let mut guards: Vec<_> = cells.iter().map(|(id, cell)| (*id, cell.lock())).collect();

        let shortfalls: Vec<Shortfall> = guards
            .iter()
            .filter_map(|(product_id, stock)| {
                let requested = requirement.units(*product_id);
                (**stock < requested).then(|| Shortfall {
                    product_id: *product_id,
                    requested,
                    available: **stock,
                })
            })
            .collect();

        if !shortfalls.is_empty() {
            drop(guards);
            warn!(?shortfalls, "Reservation rejected");
            return Err(CoreError::InsufficientStock { shortfalls });
        }

        let levels = guards
            .iter_mut()
            .map(|(product_id, stock)| {
                **stock -= requirement.units(*product_id);
                StockLevel {
                    product_id: *product_id,
                    stock: **stock,
                }
            })
            .collect();
        drop(guards);

        debug!(products = requirement.len(), "Reserved stock");
        Ok(levels)
    }

    /// Gives back the units of a reservation captured earlier.
    pub fn release(&self, reservation: &StockRequirement) -> CoreResult<Vec<StockLevel>> {
        let cells = self.cells_for(reservation)?;
        let mut guards: Vec<_> = cells.iter().map(|(id, cell)| (*id, cell.lock())).collect();

        let levels = guards
            .iter_mut()
            .map(|(product_id, stock)| {
                **stock += reservation.units(*product_id);
                StockLevel {
                    product_id: *product_id,
                    stock: **stock,
                }
            })
            .collect();
        drop(guards);

        debug!(products = reservation.len(), "Released stock");
        Ok(levels)
    }

    // =========================================================================
    // Administrative Adjustments
    // =========================================================================

    /// Adds `delta` to one counter, refusing to go below zero.
    pub fn adjust(&self, product_id: ProductId, delta: i64) -> CoreResult<StockLevel> {
        let cell = self.cell(product_id)?;
        let mut stock = cell.lock();

        if *stock + delta < 0 {
            return Err(CoreError::InsufficientStock {
                shortfalls: vec![Shortfall {
                    product_id,
                    requested: -delta,
                    available: *stock,
                }],
            });
        }

        *stock += delta;
        Ok(StockLevel {
            product_id,
            stock: *stock,
        })
    }

    /// Sets a counter to an absolute level and returns the previous one.
    pub fn set_level(&self, product_id: ProductId, new_stock: i64) -> CoreResult<(i64, StockLevel)> {
        let cell = self.cell(product_id)?;
        let mut stock = cell.lock();
        let previous = std::mem::replace(&mut *stock, new_stock);

        Ok((
            previous,
            StockLevel {
                product_id,
                stock: new_stock,
            },
        ))
    }

    fn cell(&self, product_id: ProductId) -> CoreResult<Cell> {
        self.cells
            .read()
            .get(&product_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Stock counter", product_id))
    }

    /// Counter cells for a requirement, in ascending id order.
    fn cells_for(&self, requirement: &StockRequirement) -> CoreResult<Vec<(ProductId, Cell)>> {
        let index = self.cells.read();
        requirement
            .product_ids()
            .map(|id| {
                index
                    .get(&id)
                    .cloned()
                    .map(|cell| (id, cell))
                    .ok_or_else(|| CoreError::not_found("Stock counter", id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const CHICKEN: ProductId = ProductId(1);
    const FRIES: ProductId = ProductId(3);

    fn req(entries: &[(ProductId, i64)]) -> StockRequirement {
        entries.iter().copied().collect()
    }

    fn ledger() -> StockLedger {
        StockLedger::from_levels([
            StockLevel {
                product_id: CHICKEN,
                stock: 10,
            },
            StockLevel {
                product_id: FRIES,
                stock: 4,
            },
        ])
    }

    #[test]
    fn test_reserve_then_release_restores() {
        let ledger = ledger();
        let levels = ledger.reserve(&req(&[(CHICKEN, 3)])).unwrap();
        assert_eq!(
            levels,
            vec![StockLevel {
                product_id: CHICKEN,
                stock: 7
            }]
        );

        ledger.release(&req(&[(CHICKEN, 3)])).unwrap();
        assert_eq!(ledger.level(CHICKEN), Some(10));
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let ledger = ledger();
        let err = ledger.reserve(&req(&[(CHICKEN, 2), (FRIES, 6)])).unwrap_err();

        assert_eq!(
            err.first_shortfall(),
            Some(&Shortfall {
                product_id: FRIES,
                requested: 6,
                available: 4
            })
        );
        assert_eq!(ledger.level(CHICKEN), Some(10));
        assert_eq!(ledger.level(FRIES), Some(4));
    }

    #[test]
    fn test_reserve_reports_every_shortfall() {
        let ledger = ledger();
        let err = ledger.reserve(&req(&[(CHICKEN, 11), (FRIES, 5)])).unwrap_err();

        match err {
            CoreError::InsufficientStock { shortfalls } => {
                let ids: Vec<_> = shortfalls.iter().map(|s| s.product_id).collect();
                assert_eq!(ids, vec![CHICKEN, FRIES]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_product_is_not_found() {
        let ledger = ledger();
        let err = ledger.reserve(&req(&[(ProductId(99), 1)])).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn test_adjust_never_goes_negative() {
        let ledger = ledger();
        assert!(ledger.adjust(FRIES, -5).is_err());
        assert_eq!(ledger.adjust(FRIES, -4).unwrap().stock, 0);
        assert_eq!(ledger.adjust(FRIES, 12).unwrap().stock, 12);
    }

    #[test]
    fn test_set_level_returns_previous() {
        let ledger = ledger();
        let (previous, level) = ledger.set_level(CHICKEN, 25).unwrap();
        assert_eq!(previous, 10);
        assert_eq!(level.stock, 25);
    }

    #[test]
    fn test_low_stock_lowest_first() {
        let ledger = ledger();
        ledger.register(ProductId(5), 2);

        let low: Vec<_> = ledger.low_stock(5).into_iter().map(|l| l.product_id).collect();
        assert_eq!(low, vec![ProductId(5), FRIES]);
    }

    #[test]
    fn test_concurrent_reservations_never_oversell() {
        let ledger = Arc::new(StockLedger::from_levels([StockLevel {
            product_id: CHICKEN,
            stock: 10,
        }]));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || ledger.reserve(&req(&[(CHICKEN, 3)])).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 3);
        assert_eq!(ledger.level(CHICKEN), Some(1));
    }

    #[test]
    fn test_overlapping_sets_in_opposite_order_do_not_deadlock() {
        let ledger = Arc::new(StockLedger::from_levels([
            StockLevel {
                product_id: CHICKEN,
                stock: 10_000,
            },
            StockLevel {
                product_id: FRIES,
                stock: 10_000,
            },
        ]));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for _ in 0..500 {
                        // The map orders ids regardless of insertion order.
                        let requirement = if i % 2 == 0 {
                            req(&[(CHICKEN, 1), (FRIES, 1)])
                        } else {
                            req(&[(FRIES, 1), (CHICKEN, 1)])
                        };
                        ledger.reserve(&requirement).unwrap();
                        ledger.release(&requirement).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.level(CHICKEN), Some(10_000));
        assert_eq!(ledger.level(FRIES), Some(10_000));
    }
}
