//! # Product Repository
//!
//! Database operations for the catalog.
//!
//! ## Row Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products row                               ProductKind                 │
//! │  ─────────────────────────────────────────  ──────────────────────────  │
//! │  category = 'combo'                    ──►  Combo                       │
//! │  parent_id = P, stock_consumption = c  ──►  Variant { P, c }            │
//! │  otherwise, stock = s                  ──►  Base { s }                  │
//! │                                                                         │
//! │  Variants and combos are stored with stock = 0 and never read.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use cantina_core::{
    ComboComponent, Money, NewProduct, Product, ProductCategory, ProductId, ProductKind,
};

/// Matches only rows that hold stock.
pub(crate) const BASE_PRODUCT: &str = "parent_id IS NULL AND category <> 'combo'";

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    category: ProductCategory,
    price_cents: Option<i64>,
    stock: i64,
    parent_id: Option<i64>,
    stock_consumption: i64,
    is_active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let kind = match (row.category, row.parent_id) {
            (ProductCategory::Combo, _) => ProductKind::Combo,
            (_, Some(parent_id)) => ProductKind::Variant {
                parent_id: ProductId(parent_id),
                stock_consumption: row.stock_consumption,
            },
            (_, None) => ProductKind::Base { stock: row.stock },
        };

        Product {
            id: ProductId(row.id),
            name: row.name,
            category: row.category,
            price: row.price_cents.map(Money::from_cents),
            kind,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, FromRow)]
struct ComponentRow {
    combo_id: i64,
    component_id: i64,
    quantity: i64,
}

/// Columns for a new row: (stock, parent_id, stock_consumption).
fn kind_columns(kind: &ProductKind) -> (i64, Option<i64>, i64) {
    match *kind {
        ProductKind::Base { stock } => (stock, None, 1),
        ProductKind::Variant {
            parent_id,
            stock_consumption,
        } => (0, Some(parent_id.0), stock_consumption),
        ProductKind::Combo => (0, None, 1),
    }
}

const SELECT_PRODUCT: &str = r#"
    SELECT id, name, category, price_cents, stock, parent_id, stock_consumption, is_active
    FROM products
"#;

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Every product, active or not, ordered by id.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!("{SELECT_PRODUCT} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), "Loaded products");
        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn get_by_id(&self, id: ProductId) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!("{SELECT_PRODUCT} WHERE id = ?1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Product::from))
    }

    /// Every combo composition row.
    pub async fn list_components(&self) -> DbResult<Vec<ComboComponent>> {
        let rows: Vec<ComponentRow> = sqlx::query_as(
            "SELECT combo_id, component_id, quantity FROM combo_components ORDER BY combo_id, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ComboComponent {
                combo_id: ProductId(r.combo_id),
                component_id: ProductId(r.component_id),
                quantity: r.quantity,
            })
            .collect())
    }

    /// Inserts a base product or variant and returns it with its new id.
    pub async fn insert(&self, product: &NewProduct) -> DbResult<Product> {
        let mut tx = self.pool.begin().await?;
        let id = insert_row(&mut tx, product).await?;
        tx.commit().await?;

        Ok(product.clone().into_product(id))
    }

    /// Inserts a combo and its composition in one transaction.
    ///
    /// `components` carry the combo id they will be attached to; it is
    /// replaced by the id assigned here.
    pub async fn insert_combo(
        &self,
        product: &NewProduct,
        components: &[ComboComponent],
    ) -> DbResult<(Product, Vec<ComboComponent>)> {
        let mut tx = self.pool.begin().await?;
        let combo_id = insert_row(&mut tx, product).await?;

        let mut stored = Vec::with_capacity(components.len());
        for component in components {
            sqlx::query("INSERT INTO combo_components (combo_id, component_id, quantity) VALUES (?1, ?2, ?3)")
                .bind(combo_id.0)
                .bind(component.component_id.0)
                .bind(component.quantity)
                .execute(&mut *tx)
                .await?;
            stored.push(ComboComponent {
                combo_id,
                ..*component
            });
        }

        tx.commit().await?;
        debug!(id = %combo_id, components = stored.len(), "Inserted combo");

        Ok((product.clone().into_product(combo_id), stored))
    }

    /// Soft-deletes a product.
    pub async fn deactivate(&self, id: ProductId) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id.0)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Applies a stock delta to a base product and returns the new level.
    ///
    /// The update is guarded so the counter can never go negative.
    pub async fn adjust_stock(&self, id: ProductId, delta: i64) -> DbResult<i64> {
        debug!(id = %id, delta = delta, "Adjusting stock");

        let mut tx = self.pool.begin().await?;
        apply_stock_delta(&mut tx, id, delta).await?;
        let stock: i64 = sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(stock)
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

async fn insert_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product: &NewProduct,
) -> DbResult<ProductId> {
    let now = Utc::now();
    let (stock, parent_id, stock_consumption) = kind_columns(&product.kind);

    let result = sqlx::query(
        r#"
        INSERT INTO products (
            name, category, price_cents, stock, parent_id, stock_consumption,
            is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
        "#,
    )
    .bind(product.name.trim())
    .bind(product.category)
    .bind(product.price.map(|p| p.cents()))
    .bind(stock)
    .bind(parent_id)
    .bind(stock_consumption)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let id = ProductId(result.last_insert_rowid());
    debug!(id = %id, name = %product.name, category = %product.category, "Inserted product");
    Ok(id)
}

/// Adds `delta` to a base product's stock inside an open transaction.
///
/// Fails with `StockConflict` instead of letting the counter go negative.
pub(crate) async fn apply_stock_delta(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    id: ProductId,
    delta: i64,
) -> DbResult<()> {
    let result = sqlx::query(&format!(
        "UPDATE products SET stock = stock + ?2, updated_at = ?3
         WHERE id = ?1 AND {BASE_PRODUCT} AND stock + ?2 >= 0"
    ))
    .bind(id.0)
    .bind(delta)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::StockConflict {
            product_id: id.0,
            delta,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn base(name: &str, category: ProductCategory, price: Option<i64>, stock: i64) -> NewProduct {
        NewProduct::new(
            name,
            category,
            price.map(Money::from_cents),
            ProductKind::Base { stock },
        )
    }

    #[tokio::test]
    async fn test_insert_and_load_every_kind() {
        let db = db().await;
        let repo = db.products();

        let chicken = repo
            .insert(&base("Chicken", ProductCategory::BaseDish, None, 40))
            .await
            .unwrap();
        let half = repo
            .insert(&NewProduct::new(
                "Half",
                ProductCategory::BaseDish,
                Some(Money::from_cents(4500)),
                ProductKind::Variant {
                    parent_id: chicken.id,
                    stock_consumption: 2,
                },
            ))
            .await
            .unwrap();
        let (combo, components) = repo
            .insert_combo(
                &NewProduct::new(
                    "Family",
                    ProductCategory::Combo,
                    Some(Money::from_cents(9900)),
                    ProductKind::Combo,
                ),
                &[ComboComponent {
                    combo_id: ProductId(0),
                    component_id: half.id,
                    quantity: 2,
                }],
            )
            .await
            .unwrap();

        assert_eq!(components[0].combo_id, combo.id);

        let loaded = repo.list_all().await.unwrap();
        assert_eq!(loaded, vec![chicken.clone(), half.clone(), combo.clone()]);
        assert_eq!(loaded[0].stock(), Some(40));
        assert_eq!(loaded[1].parent_id(), Some(chicken.id));
        assert!(loaded[2].is_combo());

        let stored = repo.list_components().await.unwrap();
        assert_eq!(stored, components);
    }

    #[tokio::test]
    async fn test_adjust_stock_never_goes_negative() {
        let db = db().await;
        let repo = db.products();
        let fries = repo
            .insert(&base("Fries", ProductCategory::BaseDish, Some(1500), 3))
            .await
            .unwrap();

        assert_eq!(repo.adjust_stock(fries.id, -2).await.unwrap(), 1);
        assert!(matches!(
            repo.adjust_stock(fries.id, -2).await,
            Err(DbError::StockConflict { delta: -2, .. })
        ));
        assert_eq!(repo.adjust_stock(fries.id, 9).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_adjust_stock_rejects_non_base_products() {
        let db = db().await;
        let repo = db.products();
        let combo = repo
            .insert(&NewProduct::new(
                "Combo",
                ProductCategory::Combo,
                Some(Money::from_cents(100)),
                ProductKind::Combo,
            ))
            .await
            .unwrap();

        assert!(matches!(
            repo.adjust_stock(combo.id, 5).await,
            Err(DbError::StockConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_deactivate() {
        let db = db().await;
        let repo = db.products();
        let soda = repo
            .insert(&base("Soda", ProductCategory::Drink, Some(1200), 2))
            .await
            .unwrap();
        repo.insert(&base("Water", ProductCategory::Drink, Some(800), 5))
            .await
            .unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        repo.deactivate(soda.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(!repo.get_by_id(soda.id).await.unwrap().unwrap().is_active);

        assert!(matches!(
            repo.deactivate(ProductId(999)).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
