//! # Daily Close Repository
//!
//! One reconciliation row per business date. Closing the same date again
//! replaces the earlier figures.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use cantina_core::{DailyClose, Money};

#[derive(Debug, FromRow)]
struct DailyCloseRow {
    business_date: NaiveDate,
    total_sales_cents: i64,
    cash_in_register_cents: i64,
    difference_cents: i64,
    created_at: DateTime<Utc>,
}

impl From<DailyCloseRow> for DailyClose {
    fn from(row: DailyCloseRow) -> Self {
        DailyClose {
            business_date: row.business_date,
            total_sales: Money::from_cents(row.total_sales_cents),
            cash_in_register: Money::from_cents(row.cash_in_register_cents),
            difference: Money::from_cents(row.difference_cents),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DailyCloseRepository {
    pool: SqlitePool,
}

impl DailyCloseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DailyCloseRepository { pool }
    }

    /// Inserts or replaces the close for `close.business_date`.
    pub async fn upsert(&self, close: &DailyClose) -> DbResult<()> {
        debug!(
            date = %close.business_date,
            total_sales = %close.total_sales,
            difference = %close.difference,
            "Saving daily close"
        );

        sqlx::query(
            r#"
            INSERT INTO daily_closes (
                business_date, total_sales_cents, cash_in_register_cents,
                difference_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (business_date) DO UPDATE SET
                total_sales_cents = excluded.total_sales_cents,
                cash_in_register_cents = excluded.cash_in_register_cents,
                difference_cents = excluded.difference_cents,
                created_at = excluded.created_at
            "#,
        )
        .bind(close.business_date)
        .bind(close.total_sales.cents())
        .bind(close.cash_in_register.cents())
        .bind(close.difference.cents())
        .bind(close.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, business_date: NaiveDate) -> DbResult<Option<DailyClose>> {
        let row: Option<DailyCloseRow> = sqlx::query_as(
            r#"
            SELECT business_date, total_sales_cents, cash_in_register_cents,
                   difference_cents, created_at
            FROM daily_closes
            WHERE business_date = ?1
            "#,
        )
        .bind(business_date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DailyClose::from))
    }

    /// Most recent closes first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<DailyClose>> {
        let rows: Vec<DailyCloseRow> = sqlx::query_as(
            r#"
            SELECT business_date, total_sales_cents, cash_in_register_cents,
                   difference_cents, created_at
            FROM daily_closes
            ORDER BY business_date DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DailyClose::from).collect())
    }
}
