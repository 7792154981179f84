//! # Catalog Service
//!
//! Catalog management entry point: adds products, variants and combos,
//! deactivates products and sets stock levels. Keeps the in-memory
//! [`Catalog`] used for resolution, the [`StockLedger`] and persistence in
//! step.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_product / add_variant / add_combo                                  │
//! │     1. validate against the current catalog (read lock, no I/O)         │
//! │     2. persist through CatalogStore                                     │
//! │     3. insert into the catalog (write lock), register base stock        │
//! │                                                                         │
//! │  restock(id, level)                                                     │
//! │     1. ledger.set_level → previous                                      │
//! │     2. store.adjust_stock(level − previous)                             │
//! │        failure → ledger gives the delta back                            │
//! │     3. publish StockChanged                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use cantina_core::validation::{validate_price, validate_stock_level};
use cantina_core::{
    Catalog, ComboComponent, CoreError, CoreResult, CreateOrderRequest, DomainEvent, NewProduct, PreparedOrder,
    Product, ProductCategory, ProductId, ProductKind, StockLevel, ValidationError,
};

use crate::error::EngineResult;
use crate::ledger::StockLedger;
use crate::notify::{dispatch, Notifier};
use crate::store::CatalogStore;

/// Placeholder id for products that have not been stored yet.
const UNASSIGNED: ProductId = ProductId(0);

pub struct CatalogService {
    catalog: RwLock<Catalog>,
    ledger: Arc<StockLedger>,
    store: Arc<dyn CatalogStore>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("products", &self.catalog.read().len())
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl CatalogService {
    /// Loads every product from `store` and registers base product stock
    /// with a fresh ledger.
    pub async fn load(store: Arc<dyn CatalogStore>, notifier: Arc<dyn Notifier>) -> EngineResult<Self> {
        let (products, components) = store.load_catalog().await?;

        let ledger = Arc::new(StockLedger::from_levels(products.iter().filter_map(|p| {
            p.stock().map(|stock| StockLevel {
                product_id: p.id,
                stock,
            })
        })));
        let catalog = Catalog::from_parts(products, components);
        info!(products = catalog.len(), "Catalog loaded");

        Ok(CatalogService {
            catalog: RwLock::new(catalog),
            ledger,
            store,
            notifier,
        })
    }

    pub fn ledger(&self) -> Arc<StockLedger> {
        Arc::clone(&self.ledger)
    }

    /// Validates, prices and resolves an order request against the current
    /// catalog.
    pub fn prepare_order(&self, request: &CreateOrderRequest) -> CoreResult<PreparedOrder> {
        self.catalog.read().prepare_order(request)
    }

    /// A product with its live stock level.
    pub fn product(&self, id: ProductId) -> Option<Product> {
        let product = self.catalog.read().get(id).cloned()?;
        Some(self.with_live_stock(product))
    }

    /// Every product with live stock levels, ordered by id.
    pub fn products(&self) -> Vec<Product> {
        let products: Vec<Product> = self.catalog.read().products().into_iter().cloned().collect();
        products.into_iter().map(|p| self.with_live_stock(p)).collect()
    }

    pub fn components(&self, combo_id: ProductId) -> Vec<ComboComponent> {
        self.catalog.read().components(combo_id).to_vec()
    }

    /// Active base products at or below `threshold`, lowest first.
    pub fn low_stock(&self, threshold: i64) -> Vec<Product> {
        let low = self.ledger.low_stock(threshold);
        let catalog = self.catalog.read();

        low.into_iter()
            .filter_map(|level| {
                let product = catalog.get(level.product_id)?;
                product.is_active.then(|| {
                    let mut product = product.clone();
                    product.kind = ProductKind::Base { stock: level.stock };
                    product
                })
            })
            .collect()
    }

    // =========================================================================
    // Catalog Management
    // =========================================================================

    /// Adds a base dish, drink or extra.
    pub async fn add_product(&self, product: NewProduct) -> EngineResult<Product> {
        if !matches!(product.kind, ProductKind::Base { .. }) {
            return Err(not_allowed("kind", &["base"]));
        }
        if let ProductKind::Base { stock } = product.kind {
            validate_stock_level(stock).map_err(CoreError::from)?;
        }

        self.catalog
            .read()
            .validate_new_product(&product.clone().into_product(UNASSIGNED))?;

        let stored = self.store.insert_product(&product).await?;
        if let Some(stock) = stored.stock() {
            self.ledger.register(stored.id, stock);
        }
        self.catalog.write().insert_product(stored.clone());

        info!(id = %stored.id, name = %stored.name, category = %stored.category, "Product added");
        Ok(stored)
    }

    /// Adds a variant of an active base product.
    pub async fn add_variant(&self, variant: NewProduct) -> EngineResult<Product> {
        if !matches!(variant.kind, ProductKind::Variant { .. }) {
            return Err(not_allowed("kind", &["variant"]));
        }
        let price = variant.price.ok_or_else(|| {
            CoreError::from(ValidationError::Required {
                field: "price".to_string(),
            })
        })?;
        validate_price(price).map_err(CoreError::from)?;

        self.catalog
            .read()
            .validate_new_product(&variant.clone().into_product(UNASSIGNED))?;

        let stored = self.store.insert_product(&variant).await?;
        self.catalog.write().insert_product(stored.clone());

        info!(id = %stored.id, name = %stored.name, parent = ?stored.parent_id(), "Variant added");
        Ok(stored)
    }

    /// Adds a combo made of `components` (product id, quantity).
    pub async fn add_combo(&self, combo: NewProduct, components: &[(ProductId, i64)]) -> EngineResult<Product> {
        if !matches!(combo.kind, ProductKind::Combo) || combo.category != ProductCategory::Combo {
            return Err(not_allowed("category", &["combo"]));
        }

        let components: Vec<ComboComponent> = components
            .iter()
            .map(|&(component_id, quantity)| ComboComponent {
                combo_id: UNASSIGNED,
                component_id,
                quantity,
            })
            .collect();

        {
            let catalog = self.catalog.read();
            catalog.validate_new_product(&combo.clone().into_product(UNASSIGNED))?;
            catalog.validate_combo(UNASSIGNED, &components)?;
        }

        let (stored, components) = self.store.insert_combo(&combo, &components).await?;
        {
            let mut catalog = self.catalog.write();
            catalog.insert_product(stored.clone());
            catalog.set_components(stored.id, components);
        }

        info!(id = %stored.id, name = %stored.name, "Combo added");
        Ok(stored)
    }

    /// Soft-deletes a product. Variants and combos referencing it are left
    /// as they are.
    pub async fn deactivate_product(&self, id: ProductId) -> EngineResult<()> {
        self.catalog.read().product(id)?;
        self.store.deactivate_product(id).await?;
        self.catalog.write().deactivate(id)?;

        info!(id = %id, "Product deactivated");
        Ok(())
    }

    /// Sets a base product's stock to an absolute level.
    pub async fn restock(&self, id: ProductId, new_stock: i64) -> EngineResult<StockLevel> {
        validate_stock_level(new_stock).map_err(CoreError::from)?;
        if !self.catalog.read().product(id)?.is_base() {
            return Err(not_allowed("product", &["base"]));
        }

        let (previous, level) = self.ledger.set_level(id, new_stock)?;
        let delta = new_stock - previous;

        if delta != 0 {
            if let Err(err) = self.store.adjust_stock(id, delta).await {
                warn!(id = %id, delta, error = %err, "Persisting restock failed, reverting ledger");
                if let Err(revert) = self.ledger.adjust(id, -delta) {
                    error!(id = %id, delta, error = %revert, "Could not revert ledger after failed restock");
                }
                return Err(err.into());
            }
        }

        info!(id = %id, previous, stock = new_stock, "Stock set");
        dispatch(self.notifier.as_ref(), &DomainEvent::stock_changed(level));
        Ok(level)
    }

    fn with_live_stock(&self, mut product: Product) -> Product {
        if product.is_base() {
            if let Some(stock) = self.ledger.level(product.id) {
                product.kind = ProductKind::Base { stock };
            }
        }
        product
    }
}

fn not_allowed(field: &str, allowed: &[&str]) -> crate::error::EngineError {
    CoreError::from(ValidationError::NotAllowed {
        field: field.to_string(),
        allowed: allowed.iter().map(|a| a.to_string()).collect(),
    })
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::BroadcastNotifier;
    use crate::store::MemoryStore;
    use cantina_core::{Audience, Money, OrderLineRequest};

    fn base(name: &str, category: ProductCategory, price: Option<i64>, stock: i64) -> NewProduct {
        NewProduct::new(name, category, price.map(Money::from_cents), ProductKind::Base { stock })
    }

    fn variant(name: &str, parent_id: ProductId, price: i64, consumption: i64) -> NewProduct {
        NewProduct::new(
            name,
            ProductCategory::BaseDish,
            Some(Money::from_cents(price)),
            ProductKind::Variant {
                parent_id,
                stock_consumption: consumption,
            },
        )
    }

    fn combo(name: &str, price: i64) -> NewProduct {
        NewProduct::new(name, ProductCategory::Combo, Some(Money::from_cents(price)), ProductKind::Combo)
    }

    async fn service() -> (CatalogService, Arc<MemoryStore>, BroadcastNotifier) {
        let store = Arc::new(MemoryStore::new());
        let notifier = BroadcastNotifier::new(64);
        let service = CatalogService::load(store.clone(), Arc::new(notifier.clone()))
            .await
            .unwrap();
        (service, store, notifier)
    }

    #[tokio::test]
    async fn test_add_product_registers_stock() {
        let (service, _, _) = service().await;
        let fries = service
            .add_product(base("Fries", ProductCategory::BaseDish, Some(1500), 20))
            .await
            .unwrap();

        assert_eq!(service.ledger().level(fries.id), Some(20));
        assert_eq!(service.product(fries.id).unwrap().stock(), Some(20));
    }

    #[tokio::test]
    async fn test_add_product_rejects_bad_shapes() {
        let (service, _, _) = service().await;

        let unpriced_drink = service
            .add_product(base("Soda", ProductCategory::Drink, None, 5))
            .await;
        assert!(unpriced_drink.is_err());

        let negative = service
            .add_product(base("Fries", ProductCategory::BaseDish, Some(1500), -1))
            .await;
        assert!(negative.is_err());

        assert!(service.products().is_empty());
    }

    #[tokio::test]
    async fn test_variant_needs_active_base_parent() {
        let (service, _, _) = service().await;
        let chicken = service
            .add_product(base("Chicken", ProductCategory::BaseDish, None, 40))
            .await
            .unwrap();
        let cheese = service
            .add_product(base("Cheese", ProductCategory::Extra, Some(500), 10))
            .await
            .unwrap();

        assert!(service.add_variant(variant("2 pieces", chicken.id, 3500, 2)).await.is_ok());
        assert!(service.add_variant(variant("Double", cheese.id, 900, 2)).await.is_err());
        assert!(service.add_variant(variant("Ghost", ProductId(99), 900, 1)).await.is_err());

        service.deactivate_product(chicken.id).await.unwrap();
        let err = service
            .add_variant(variant("4 pieces", chicken.id, 6500, 4))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_core(),
            Some(CoreError::Validation(ValidationError::Inactive { .. }))
        ));
    }

    #[tokio::test]
    async fn test_add_combo_resolves_through_components() {
        let (service, _, _) = service().await;
        let chicken = service
            .add_product(base("Chicken", ProductCategory::BaseDish, None, 40))
            .await
            .unwrap();
        let half = service
            .add_variant(variant("Half", chicken.id, 4500, 2))
            .await
            .unwrap();
        let fries = service
            .add_product(base("Fries", ProductCategory::BaseDish, Some(1500), 20))
            .await
            .unwrap();

        let family = service
            .add_combo(combo("Family", 12000), &[(half.id, 2), (fries.id, 1)])
            .await
            .unwrap();

        let prepared = service
            .prepare_order(&CreateOrderRequest::new(1, vec![OrderLineRequest::new(family.id, 3)]))
            .unwrap();
        assert_eq!(prepared.requirement.units(chicken.id), 12);
        assert_eq!(prepared.requirement.units(fries.id), 3);
        assert_eq!(service.components(family.id).len(), 2);
    }

    #[tokio::test]
    async fn test_combo_cannot_contain_combo() {
        let (service, _, _) = service().await;
        let fries = service
            .add_product(base("Fries", ProductCategory::BaseDish, Some(1500), 20))
            .await
            .unwrap();
        let small = service
            .add_combo(combo("Small", 2000), &[(fries.id, 1)])
            .await
            .unwrap();

        assert!(service.add_combo(combo("Nested", 3000), &[(small.id, 1)]).await.is_err());
        assert!(service.add_combo(combo("Empty", 3000), &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_restock_updates_ledger_store_and_notifies() {
        let (service, store, notifier) = service().await;
        let mut admin = notifier.subscribe(Audience::Admin);
        let fries = service
            .add_product(base("Fries", ProductCategory::BaseDish, Some(1500), 20))
            .await
            .unwrap();

        let level = service.restock(fries.id, 35).await.unwrap();
        assert_eq!(level.stock, 35);
        assert_eq!(service.ledger().level(fries.id), Some(35));
        assert_eq!(store.stock(fries.id), Some(35));

        let event = admin.try_recv().unwrap();
        assert_eq!(event.event_type, "stock_changed");
        assert_eq!(event.payload["new_stock"], 35);
    }

    #[tokio::test]
    async fn test_restock_rejects_non_base_and_negative() {
        let (service, _, _) = service().await;
        let chicken = service
            .add_product(base("Chicken", ProductCategory::BaseDish, None, 40))
            .await
            .unwrap();
        let half = service
            .add_variant(variant("Half", chicken.id, 4500, 2))
            .await
            .unwrap();

        assert!(service.restock(half.id, 10).await.is_err());
        assert!(service.restock(chicken.id, -1).await.is_err());
        assert_eq!(service.ledger().level(chicken.id), Some(40));
    }

    #[tokio::test]
    async fn test_low_stock_skips_inactive() {
        let (service, _, _) = service().await;
        let fries = service
            .add_product(base("Fries", ProductCategory::BaseDish, Some(1500), 3))
            .await
            .unwrap();
        let soda = service
            .add_product(base("Soda", ProductCategory::Drink, Some(1000), 1))
            .await
            .unwrap();
        service
            .add_product(base("Water", ProductCategory::Drink, Some(600), 30))
            .await
            .unwrap();

        let low: Vec<_> = service.low_stock(5).into_iter().map(|p| p.id).collect();
        assert_eq!(low, vec![soda.id, fries.id]);

        service.deactivate_product(soda.id).await.unwrap();
        let low: Vec<_> = service.low_stock(5).into_iter().map(|p| p.id).collect();
        assert_eq!(low, vec![fries.id]);
    }

    #[tokio::test]
    async fn test_load_picks_up_persisted_catalog() {
        let store = Arc::new(MemoryStore::new());
        let fries = store
            .insert_product(&base("Fries", ProductCategory::BaseDish, Some(1500), 12))
            .await
            .unwrap();

        let service = CatalogService::load(store, Arc::new(BroadcastNotifier::new(8)))
            .await
            .unwrap();
        assert_eq!(service.ledger().level(fries.id), Some(12));
    }
}
