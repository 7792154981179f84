//! # Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Domain      │  │   Persistence   │  │     Configuration       │ │
//! │  │   (CoreError)   │  │  (StoreError)   │  │    (ConfigError)        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Database       │  │  InvalidConfig          │ │
//! │  │  NotFound       │  │  StockConflict  │  │  LoadFailed             │ │
//! │  │  Insufficient.. │  │  NotFound       │  │  SaveFailed             │ │
//! │  │  InvalidTrans.. │  │  Unavailable    │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Notification failures never surface as EngineError, they are logged.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use cantina_core::{CoreError, ProductId};
use cantina_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for persistence collaborator calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors returned by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A domain rule rejected the operation. Nothing was mutated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The persistence collaborator failed.
    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            EngineError::Core(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_insufficient_stock(&self) -> bool {
        matches!(self, EngineError::Core(CoreError::InsufficientStock { .. }))
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, EngineError::Core(CoreError::InvalidTransition { .. }))
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        EngineError::Store(StoreError::from(err))
    }
}

/// Failures of an [`OrderStore`](crate::store::OrderStore) or
/// [`CatalogStore`](crate::store::CatalogStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(DbError),

    /// A guarded stock update would have driven a counter below zero.
    ///
    /// The stock ledger checks first, so this means persistence and the
    /// ledger disagree about a counter.
    #[error("Stock update rejected for product {product_id} (delta {delta})")]
    StockConflict { product_id: ProductId, delta: i64 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::StockConflict { product_id, delta } => StoreError::StockConflict {
                product_id: ProductId(product_id),
                delta,
            },
            DbError::NotFound { entity, id } => StoreError::NotFound { entity, id },
            other => StoreError::Database(other),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

/// Why a notification could not be handed to the fanout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("No active subscribers")]
    NoSubscribers,
}
