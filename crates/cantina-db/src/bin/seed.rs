//! # Demo Menu Seeder
//!
//! Populates a database with a small restaurant menu for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p cantina-db --bin seed
//! cargo run -p cantina-db --bin seed -- --db ./data/cantina.db
//! ```
//!
//! ## Generated Menu
//! ```text
//! Pollo (base, 80 pieces, not sold directly)
//!   ├── 2 piezas  (consumes 2)
//!   ├── 4 piezas  (consumes 4)
//!   └── 8 piezas  (consumes 8)
//! Papas fritas, Coca-Cola, Agua pura (base)
//! Queso, Salsa extra (extras)
//! Combo personal = 2 piezas + papas + Coca-Cola
//! Combo familiar = 8 piezas + 2 × papas + 2 × Coca-Cola
//! ```

use anyhow::Context;
use std::env;
use tracing_subscriber::EnvFilter;

use cantina_core::{ComboComponent, Money, NewProduct, ProductCategory, ProductId, ProductKind};
use cantina_db::{Database, DbConfig};

fn base(name: &str, category: ProductCategory, price: Option<i64>, stock: i64) -> NewProduct {
    NewProduct::new(
        name,
        category,
        price.map(Money::from_cents),
        ProductKind::Base { stock },
    )
}

fn variant(name: &str, parent_id: ProductId, price: i64, stock_consumption: i64) -> NewProduct {
    NewProduct::new(
        name,
        ProductCategory::BaseDish,
        Some(Money::from_cents(price)),
        ProductKind::Variant {
            parent_id,
            stock_consumption,
        },
    )
}

fn combo(name: &str, price: i64) -> NewProduct {
    NewProduct::new(
        name,
        ProductCategory::Combo,
        Some(Money::from_cents(price)),
        ProductKind::Combo,
    )
}

fn component(component_id: ProductId, quantity: i64) -> ComboComponent {
    ComboComponent {
        combo_id: ProductId(0),
        component_id,
        quantity,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = "./cantina_dev.db".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Cantina POS Demo Menu Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./cantina_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Cantina POS Demo Menu Seeder");
    println!("============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("opening {db_path}"))?;

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("Database already has {} products, skipping seed.", existing);
        println!("Delete the database file to regenerate.");
        return Ok(());
    }

    let products = db.products();

    let pollo = products.insert(&base("Pollo", ProductCategory::BaseDish, None, 80)).await?;
    let dos = products.insert(&variant("2 piezas", pollo.id, 3500, 2)).await?;
    products.insert(&variant("4 piezas", pollo.id, 6500, 4)).await?;
    let ocho = products.insert(&variant("8 piezas", pollo.id, 12000, 8)).await?;

    let papas = products
        .insert(&base("Papas fritas", ProductCategory::BaseDish, Some(1500), 50))
        .await?;
    let coca = products
        .insert(&base("Coca-Cola", ProductCategory::Drink, Some(1000), 48))
        .await?;
    products
        .insert(&base("Agua pura", ProductCategory::Drink, Some(600), 36))
        .await?;

    products
        .insert(&base("Queso", ProductCategory::Extra, Some(500), 30))
        .await?;
    products
        .insert(&base("Salsa extra", ProductCategory::Extra, Some(300), 40))
        .await?;

    products
        .insert_combo(
            &combo("Combo personal", 5200),
            &[component(dos.id, 1), component(papas.id, 1), component(coca.id, 1)],
        )
        .await
        .context("inserting Combo personal")?;
    products
        .insert_combo(
            &combo("Combo familiar", 17500),
            &[component(ocho.id, 1), component(papas.id, 2), component(coca.id, 2)],
        )
        .await
        .context("inserting Combo familiar")?;

    println!("Seeded {} products:", products.count().await?);
    for product in products.list_all().await? {
        let price = product
            .price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let stock = product
            .stock()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  #{:<3} {:<16} {:<10} price {:>8}  stock {:>4}",
            product.id.0, product.name, product.category.as_str(), price, stock
        );
    }

    println!();
    println!("Seed complete.");
    Ok(())
}
