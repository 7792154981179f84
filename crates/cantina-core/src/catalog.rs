//! # Catalog Resolver
//!
//! The product catalog as an arena keyed by [`ProductId`], and the pure
//! operations that turn order requests into stock requirements and prices.
//!
//! ## Resolution
//! ```text
//! resolve(product, q)
//!   Base / Extra           → { product: q }
//!   Variant(parent, c)     → { parent: q × c }
//!   Combo[(p₁,n₁),(p₂,n₂)] → resolve(p₁, q×n₁) ⊕ resolve(p₂, q×n₂)
//!
//! ⊕ sums units per base product.
//! ```
//!
//! ## Example
//! ```text
//! Chicken (base, stock 40)
//!   └── Half chicken (variant, consumption 2)
//! Fries (base, stock 30)
//!
//! Family combo = 2 × Half chicken + 1 × Fries
//!
//! resolve(Family combo, 3) = { Chicken: 12, Fries: 3 }
//! ```
//!
//! The combined requirement of a whole order is the unit the stock ledger
//! reserves atomically.

use std::collections::{BTreeMap, HashMap};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{
    ComboComponent, CreateOrderRequest, NewOrder, NewOrderLine, OrderExtra, OrderLineRequest, Product,
    ProductCategory, ProductId, ProductKind,
};
use crate::validation::{validate_customer_field, validate_line_count, validate_notes, validate_quantity};

// =============================================================================
// Stock Requirement
// =============================================================================

/// Base product id → units required.
///
/// Ordered by product id, which is also the order in which the ledger
/// acquires its per-product locks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockRequirement(BTreeMap<ProductId, i64>);

impl StockRequirement {
    pub fn new() -> Self {
        StockRequirement(BTreeMap::new())
    }

    /// Adds units for a product, summing with any existing entry.
    pub fn add(&mut self, product_id: ProductId, units: i64) {
        *self.0.entry(product_id).or_insert(0) += units;
    }

    pub fn merge(&mut self, other: &StockRequirement) {
        for (product_id, units) in other.iter() {
            self.add(product_id, units);
        }
    }

    /// Units required of one product (0 if absent).
    pub fn units(&self, product_id: ProductId) -> i64 {
        self.0.get(&product_id).copied().unwrap_or(0)
    }

    /// Entries in ascending product id order.
    pub fn iter(&self) -> impl Iterator<Item = (ProductId, i64)> + '_ {
        self.0.iter().map(|(id, units)| (*id, *units))
    }

    pub fn product_ids(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(ProductId, i64)> for StockRequirement {
    fn from_iter<I: IntoIterator<Item = (ProductId, i64)>>(iter: I) -> Self {
        let mut requirement = StockRequirement::new();
        for (product_id, units) in iter {
            requirement.add(product_id, units);
        }
        requirement
    }
}

/// An order request after validation, pricing and resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedOrder {
    pub order: NewOrder,
    pub requirement: StockRequirement,
}

// =============================================================================
// Catalog
// =============================================================================

/// In-memory view of every product and combo composition.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: HashMap<ProductId, Product>,
    components: HashMap<ProductId, Vec<ComboComponent>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from rows loaded from persistence.
    pub fn from_parts(products: Vec<Product>, components: Vec<ComboComponent>) -> Self {
        let mut catalog = Catalog::new();
        for product in products {
            catalog.insert_product(product);
        }
        for component in components {
            catalog
                .components
                .entry(component.combo_id)
                .or_default()
                .push(component);
        }
        catalog
    }

    /// Inserts or replaces a product.
    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.id, product);
    }

    /// Replaces a combo's composition without checking it.
    ///
    /// Use [`Catalog::validate_combo`] first for anything user supplied.
    pub fn set_components(&mut self, combo_id: ProductId, components: Vec<ComboComponent>) {
        self.components.insert(combo_id, components);
    }

    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.get(&id)
    }

    pub fn product(&self, id: ProductId) -> CoreResult<&Product> {
        self.products
            .get(&id)
            .ok_or_else(|| CoreError::not_found("Product", id))
    }

    pub fn components(&self, combo_id: ProductId) -> &[ComboComponent] {
        self.components
            .get(&combo_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All products, ordered by id.
    pub fn products(&self) -> Vec<&Product> {
        let mut products: Vec<_> = self.products.values().collect();
        products.sort_by_key(|p| p.id);
        products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Soft-deletes a product. Variants and combos that reference it are
    /// left untouched.
    pub fn deactivate(&mut self, id: ProductId) -> CoreResult<()> {
        let product = self
            .products
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Product", id))?;
        product.is_active = false;
        Ok(())
    }

    /// Updates the cached stock of a base product.
    pub fn set_stock(&mut self, id: ProductId, stock: i64) {
        if let Some(Product {
            kind: ProductKind::Base { stock: current },
            ..
        }) = self.products.get_mut(&id)
        {
            *current = stock;
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolves `quantity` units of a product to base-product units.
    pub fn resolve(&self, product_id: ProductId, quantity: i64) -> CoreResult<StockRequirement> {
        let mut requirement = StockRequirement::new();
        let mut path = Vec::new();
        self.resolve_into(product_id, quantity, &mut path, &mut requirement)?;
        Ok(requirement)
    }

    fn resolve_into(
        &self,
        product_id: ProductId,
        quantity: i64,
        path: &mut Vec<ProductId>,
        acc: &mut StockRequirement,
    ) -> CoreResult<()> {
        let product = self.product(product_id)?;

        match product.kind {
            ProductKind::Base { .. } => acc.add(product.id, quantity),
            ProductKind::Variant {
                parent_id,
                stock_consumption,
            } => {
                let holds_stock = self.get(parent_id).map_or(false, Product::is_base);
                if !holds_stock {
                    return Err(CoreError::DanglingReference {
                        variant_id: product.id,
                        parent_id,
                    });
                }
                acc.add(parent_id, scale(quantity, stock_consumption)?);
            }
            ProductKind::Combo => {
                if path.contains(&product.id) {
                    return Err(CoreError::CyclicComposition {
                        combo_id: product.id,
                    });
                }
                path.push(product.id);
                for component in self.components(product.id) {
                    self.resolve_into(
                        component.component_id,
                        scale(quantity, component.quantity)?,
                        path,
                        acc,
                    )?;
                }
                path.pop();
            }
        }

        Ok(())
    }

    /// Combined requirement of every line and its extras.
    ///
    /// Extras are resolved like any other product with
    /// `extra.quantity × line.quantity` units.
    pub fn resolve_order_request(&self, lines: &[OrderLineRequest]) -> CoreResult<StockRequirement> {
        let mut requirement = StockRequirement::new();
        for line in lines {
            let mut path = Vec::new();
            self.resolve_into(line.product_id, line.quantity, &mut path, &mut requirement)?;
            for extra in &line.extras {
                self.resolve_into(
                    extra.product_id,
                    scale(extra.quantity, line.quantity)?,
                    &mut path,
                    &mut requirement,
                )?;
            }
        }
        Ok(requirement)
    }

    // =========================================================================
    // Display & Pricing
    // =========================================================================

    /// Name shown on tickets: "Parent (Variant)" for variants.
    pub fn display_name(&self, product_id: ProductId) -> CoreResult<String> {
        let product = self.product(product_id)?;
        Ok(match product.parent_id().and_then(|id| self.get(id)) {
            Some(parent) => format!("{} ({})", parent.name, product.name),
            None => product.name.clone(),
        })
    }

    /// Unit price of a line (product price plus extras) and the frozen extras.
    pub fn price_line(&self, line: &OrderLineRequest) -> CoreResult<(Money, Vec<OrderExtra>)> {
        let product = self.sellable(line.product_id)?;
        let mut unit_price = sale_price(product)?;

        let mut extras = Vec::with_capacity(line.extras.len());
        for requested in &line.extras {
            validate_quantity(requested.quantity)?;
            let extra = self.sellable(requested.product_id)?;
            if extra.category != ProductCategory::Extra {
                return Err(ValidationError::NotAllowed {
                    field: "extras".to_string(),
                    allowed: vec![ProductCategory::Extra.to_string()],
                }
                .into());
            }
            let extra_price = sale_price(extra)?;
            unit_price += extra_price.multiply_quantity(requested.quantity);
            extras.push(OrderExtra {
                product_id: extra.id,
                name: extra.name.clone(),
                unit_price: extra_price,
                quantity: requested.quantity,
            });
        }

        Ok((unit_price, extras))
    }

    /// Validates, prices and resolves an order request.
    ///
    /// Nothing is reserved here, the result is handed to the stock ledger.
    pub fn prepare_order(&self, request: &CreateOrderRequest) -> CoreResult<PreparedOrder> {
        validate_line_count(request.lines.len())?;
        let customer_name = validate_customer_field("customer_name", request.customer_name.as_deref())?;
        let customer_phone = validate_customer_field("customer_phone", request.customer_phone.as_deref())?;

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            validate_quantity(line.quantity)?;
            let (unit_price, extras) = self.price_line(line)?;
            lines.push(NewOrderLine {
                product_id: line.product_id,
                name_snapshot: self.display_name(line.product_id)?,
                quantity: line.quantity,
                unit_price,
                extras,
                notes: validate_notes(line.notes.as_deref())?,
            });
        }

        let total = lines
            .iter()
            .map(|l| l.unit_price.multiply_quantity(l.quantity))
            .sum();
        let requirement = self.resolve_order_request(&request.lines)?;

        Ok(PreparedOrder {
            order: NewOrder {
                waiter_id: request.waiter_id,
                customer_name,
                customer_phone,
                total,
                lines,
            },
            requirement,
        })
    }

    fn sellable(&self, product_id: ProductId) -> CoreResult<&Product> {
        let product = self.product(product_id)?;
        if !product.is_active {
            return Err(ValidationError::Inactive { id: product_id }.into());
        }
        Ok(product)
    }

    // =========================================================================
    // Catalog Management Checks
    // =========================================================================

    /// Checks a product about to be added.
    ///
    /// Variants must hang off an active base product that is not an extra.
    /// Combos are checked separately with [`Catalog::validate_combo`].
    pub fn validate_new_product(&self, product: &Product) -> CoreResult<()> {
        crate::validation::validate_product_name(&product.name)?;
        product.validate_shape()?;

        if let Some(parent_id) = product.parent_id() {
            let parent = self.product(parent_id)?;
            if !parent.is_base() || parent.category == ProductCategory::Extra {
                return Err(CoreError::DanglingReference {
                    variant_id: product.id,
                    parent_id,
                });
            }
            if !parent.is_active {
                return Err(ValidationError::Inactive { id: parent_id }.into());
            }
        }

        Ok(())
    }

    /// Checks a combo composition before it is stored.
    ///
    /// Components must exist and be base products or variants with a valid
    /// parent. A combo cannot contain itself or another combo.
    pub fn validate_combo(&self, combo_id: ProductId, components: &[ComboComponent]) -> CoreResult<()> {
        if components.is_empty() {
            return Err(ValidationError::Required {
                field: "components".to_string(),
            }
            .into());
        }

        for component in components {
            validate_quantity(component.quantity)?;
            if component.component_id == combo_id {
                return Err(CoreError::CyclicComposition { combo_id });
            }
            let product = self.product(component.component_id)?;
            if product.is_combo() {
                return Err(ValidationError::NotAllowed {
                    field: "components".to_string(),
                    allowed: vec!["base".to_string(), "variant".to_string()],
                }
                .into());
            }
            self.resolve(component.component_id, component.quantity)?;
        }

        Ok(())
    }
}

fn sale_price(product: &Product) -> CoreResult<Money> {
    product.price.ok_or_else(|| {
        ValidationError::NotSellable {
            name: product.name.clone(),
        }
        .into()
    })
}

fn scale(quantity: i64, factor: i64) -> CoreResult<i64> {
    quantity.checked_mul(factor).ok_or_else(|| {
        ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: i64::MAX,
        }
        .into()
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CHICKEN: ProductId = ProductId(1);
    const HALF_CHICKEN: ProductId = ProductId(2);
    const FRIES: ProductId = ProductId(3);
    const FAMILY_COMBO: ProductId = ProductId(4);
    const CHEESE: ProductId = ProductId(5);
    const SODA: ProductId = ProductId(6);

    fn base(id: ProductId, name: &str, category: ProductCategory, price: Option<i64>, stock: i64) -> Product {
        Product::new(
            id,
            name,
            category,
            price.map(Money::from_cents),
            ProductKind::Base { stock },
        )
    }

    fn req(entries: &[(ProductId, i64)]) -> StockRequirement {
        entries.iter().copied().collect()
    }

    fn component(combo_id: ProductId, component_id: ProductId, quantity: i64) -> ComboComponent {
        ComboComponent {
            combo_id,
            component_id,
            quantity,
        }
    }

    /// Chicken (unpriced base) with a half-chicken variant, fries, a family
    /// combo of 2 × half chicken + 1 × fries, a cheese extra and a soda.
    fn menu() -> Catalog {
        Catalog::from_parts(
            vec![
                base(CHICKEN, "Chicken", ProductCategory::BaseDish, None, 40),
                Product::new(
                    HALF_CHICKEN,
                    "Half",
                    ProductCategory::BaseDish,
                    Some(Money::from_cents(4500)),
                    ProductKind::Variant {
                        parent_id: CHICKEN,
                        stock_consumption: 2,
                    },
                ),
                base(FRIES, "Fries", ProductCategory::BaseDish, Some(1500), 30),
                Product::new(
                    FAMILY_COMBO,
                    "Family combo",
                    ProductCategory::Combo,
                    Some(Money::from_cents(9900)),
                    ProductKind::Combo,
                ),
                base(CHEESE, "Cheese", ProductCategory::Extra, Some(500), 20),
                base(SODA, "Soda", ProductCategory::Drink, Some(1200), 24),
            ],
            vec![
                component(FAMILY_COMBO, HALF_CHICKEN, 2),
                component(FAMILY_COMBO, FRIES, 1),
            ],
        )
    }

    #[test]
    fn test_base_resolves_to_itself() {
        let requirement = menu().resolve(FRIES, 4).unwrap();
        assert_eq!(requirement, req(&[(FRIES, 4)]));
    }

    #[test]
    fn test_variant_resolves_to_parent() {
        let requirement = menu().resolve(HALF_CHICKEN, 3).unwrap();
        assert_eq!(requirement, req(&[(CHICKEN, 6)]));
    }

    #[test]
    fn test_extra_resolves_like_base() {
        let requirement = menu().resolve(CHEESE, 2).unwrap();
        assert_eq!(requirement.units(CHEESE), 2);
    }

    #[test]
    fn test_combo_sums_components() {
        let requirement = menu().resolve(FAMILY_COMBO, 3).unwrap();
        assert_eq!(requirement, req(&[(CHICKEN, 12), (FRIES, 3)]));
    }

    #[test]
    fn test_unknown_product_is_not_found() {
        assert!(matches!(
            menu().resolve(ProductId(99), 1),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_variant_with_missing_parent_is_dangling() {
        let mut catalog = menu();
        catalog.insert_product(Product::new(
            ProductId(20),
            "Orphan",
            ProductCategory::BaseDish,
            Some(Money::from_cents(100)),
            ProductKind::Variant {
                parent_id: ProductId(77),
                stock_consumption: 1,
            },
        ));
        assert_eq!(
            catalog.resolve(ProductId(20), 1),
            Err(CoreError::DanglingReference {
                variant_id: ProductId(20),
                parent_id: ProductId(77),
            })
        );
    }

    #[test]
    fn test_cyclic_combo_is_detected() {
        let mut catalog = menu();
        let outer = ProductId(30);
        catalog.insert_product(Product::new(
            outer,
            "Outer",
            ProductCategory::Combo,
            Some(Money::from_cents(100)),
            ProductKind::Combo,
        ));
        catalog.set_components(outer, vec![component(outer, FAMILY_COMBO, 1)]);
        catalog.set_components(
            FAMILY_COMBO,
            vec![component(FAMILY_COMBO, FRIES, 1), component(FAMILY_COMBO, outer, 1)],
        );

        assert!(matches!(
            catalog.resolve(outer, 1),
            Err(CoreError::CyclicComposition { .. })
        ));
    }

    #[test]
    fn test_same_combo_twice_in_order_is_not_a_cycle() {
        let catalog = menu();
        let lines = vec![
            OrderLineRequest::new(FAMILY_COMBO, 1),
            OrderLineRequest::new(FAMILY_COMBO, 2),
        ];
        let requirement = catalog.resolve_order_request(&lines).unwrap();
        assert_eq!(requirement.units(CHICKEN), 12);
    }

    #[test]
    fn test_order_request_scales_extras_by_line_quantity() {
        let catalog = menu();
        let lines = vec![
            OrderLineRequest::new(FRIES, 2).with_extra(CHEESE, 3),
            OrderLineRequest::new(HALF_CHICKEN, 1),
        ];
        let requirement = catalog.resolve_order_request(&lines).unwrap();
        assert_eq!(
            requirement,
            req(&[(CHICKEN, 2), (FRIES, 2), (CHEESE, 6)])
        );
    }

    #[test]
    fn test_display_name_of_variant() {
        let catalog = menu();
        assert_eq!(catalog.display_name(HALF_CHICKEN).unwrap(), "Chicken (Half)");
        assert_eq!(catalog.display_name(SODA).unwrap(), "Soda");
    }

    #[test]
    fn test_prepare_order_prices_and_snapshots() {
        let catalog = menu();
        let request = CreateOrderRequest::new(
            7,
            vec![
                OrderLineRequest::new(HALF_CHICKEN, 2)
                    .with_extra(CHEESE, 1)
                    .with_notes("  well done "),
                OrderLineRequest::new(SODA, 1),
            ],
        );

        let prepared = catalog.prepare_order(&request).unwrap();
        let lines = &prepared.order.lines;

        assert_eq!(lines[0].name_snapshot, "Chicken (Half)");
        assert_eq!(lines[0].unit_price, Money::from_cents(5000));
        assert_eq!(lines[0].extras[0].name, "Cheese");
        assert_eq!(lines[0].notes.as_deref(), Some("well done"));
        assert_eq!(prepared.order.total, Money::from_cents(2 * 5000 + 1200));
        assert_eq!(
            prepared.requirement,
            req(&[(CHICKEN, 4), (CHEESE, 2), (SODA, 1)])
        );
    }

    #[test]
    fn test_prepare_order_rejects_empty_lines() {
        let request = CreateOrderRequest::new(1, vec![]);
        assert!(matches!(
            menu().prepare_order(&request),
            Err(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[test]
    fn test_unpriced_base_dish_is_not_sellable() {
        let request = CreateOrderRequest::new(1, vec![OrderLineRequest::new(CHICKEN, 1)]);
        assert!(matches!(
            menu().prepare_order(&request),
            Err(CoreError::Validation(ValidationError::NotSellable { .. }))
        ));
    }

    #[test]
    fn test_non_extra_cannot_be_attached_as_extra() {
        let request = CreateOrderRequest::new(1, vec![OrderLineRequest::new(FRIES, 1).with_extra(SODA, 1)]);
        assert!(matches!(
            menu().prepare_order(&request),
            Err(CoreError::Validation(ValidationError::NotAllowed { .. }))
        ));
    }

    #[test]
    fn test_inactive_product_cannot_be_ordered_but_still_resolves_in_combo() {
        let mut catalog = menu();
        catalog.deactivate(FRIES).unwrap();

        let direct = CreateOrderRequest::new(1, vec![OrderLineRequest::new(FRIES, 1)]);
        assert!(matches!(
            catalog.prepare_order(&direct),
            Err(CoreError::Validation(ValidationError::Inactive { .. }))
        ));

        let combo = CreateOrderRequest::new(1, vec![OrderLineRequest::new(FAMILY_COMBO, 1)]);
        assert!(catalog.prepare_order(&combo).is_ok());
    }

    #[test]
    fn test_validate_combo() {
        let catalog = menu();
        let new_combo = ProductId(40);

        assert!(catalog
            .validate_combo(new_combo, &[component(new_combo, HALF_CHICKEN, 1), component(new_combo, SODA, 1)])
            .is_ok());
        assert!(catalog.validate_combo(new_combo, &[]).is_err());
        assert!(matches!(
            catalog.validate_combo(new_combo, &[component(new_combo, new_combo, 1)]),
            Err(CoreError::CyclicComposition { .. })
        ));
        assert!(matches!(
            catalog.validate_combo(new_combo, &[component(new_combo, FAMILY_COMBO, 1)]),
            Err(CoreError::Validation(ValidationError::NotAllowed { .. }))
        ));
        assert!(catalog
            .validate_combo(new_combo, &[component(new_combo, FRIES, 0)])
            .is_err());
    }

    #[test]
    fn test_variant_must_hang_off_base_product() {
        let catalog = menu();
        let variant_of_variant = Product::new(
            ProductId(50),
            "Quarter",
            ProductCategory::BaseDish,
            Some(Money::from_cents(2500)),
            ProductKind::Variant {
                parent_id: HALF_CHICKEN,
                stock_consumption: 1,
            },
        );
        assert!(matches!(
            catalog.validate_new_product(&variant_of_variant),
            Err(CoreError::DanglingReference { .. })
        ));
    }
}
