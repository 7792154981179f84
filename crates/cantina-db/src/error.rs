//! # Database Errors
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error / MigrateError / serde_json::Error                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError            constraint kind, guard miss, connection state       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (cantina-engine)                                            │
//! │       StockConflict and NotFound keep their shape, the rest is opaque   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE constraint rejected the row.
    #[error("Duplicate value for {constraint}")]
    UniqueViolation { constraint: String },

    /// An order line, component or reservation points at a missing row.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A CHECK constraint rejected the row (negative stock, bad category,
    /// zero quantity).
    #[error("Check constraint failed: {0}")]
    CheckViolation(String),

    /// A guarded stock update matched no row: the counter would have gone
    /// negative or the product is not a base product.
    #[error("Stock conflict on product {product_id}: cannot apply {delta}")]
    StockConflict { product_id: i64, delta: i64 },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The extras column held JSON that does not match `OrderExtra`.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// True for errors that say the data was refused, not that the
    /// database was unreachable.
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            DbError::UniqueViolation { .. }
                | DbError::ForeignKeyViolation(_)
                | DbError::CheckViolation(_)
                | DbError::StockConflict { .. }
        )
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        constraint: message
                            .strip_prefix("UNIQUE constraint failed: ")
                            .unwrap_or(&message)
                            .to_string(),
                    },
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation(message),
                    ErrorKind::CheckViolation => DbError::CheckViolation(message),
                    _ => DbError::QueryFailed(message),
                }
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(!err.is_constraint());
    }

    #[test]
    fn test_pool_errors() {
        assert!(matches!(DbError::from(sqlx::Error::PoolTimedOut), DbError::PoolExhausted));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn test_stock_conflict_is_constraint() {
        let err = DbError::StockConflict {
            product_id: 4,
            delta: -3,
        };
        assert!(err.is_constraint());
        assert_eq!(err.to_string(), "Stock conflict on product 4: cannot apply -3");
    }

    #[tokio::test]
    async fn test_check_constraint_is_classified() {
        let db = crate::Database::new(crate::DbConfig::in_memory()).await.unwrap();
        let err: DbError = sqlx::query(
            "INSERT INTO products (name, category, price_cents, stock, created_at, updated_at)
             VALUES ('Soda', 'drink', 1200, -1, '2024-01-01', '2024-01-01')",
        )
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();

        assert!(matches!(err, DbError::CheckViolation(_)));
    }
}
