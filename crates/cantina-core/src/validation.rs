//! # Validation Module
//!
//! Input validation for order and catalog requests.
//!
//! ## Where Validation Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Waiter request                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  THIS MODULE: shape checks (empty, length, ranges)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Catalog: references, kinds, prices                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StockLedger: availability                                             │
//! │                                                                         │
//! │  Nothing below this point runs if an earlier stage rejects.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_LINES};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;
const MAX_NOTES_LEN: usize = 500;
const MAX_CUSTOMER_FIELD_LEN: usize = 100;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name.
///
/// ## Example
/// ```rust
/// use cantina_core::validation::validate_product_name;
///
/// assert!(validate_product_name("Pollo frito").is_ok());
/// assert!(validate_product_name("   ").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates free-text line notes ("no onions").
///
/// Returns the trimmed text, or `None` when blank.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<Option<String>> {
    optional_text("notes", notes, MAX_NOTES_LEN)
}

/// Validates an optional customer name or phone.
pub fn validate_customer_field(field: &str, value: Option<&str>) -> ValidationResult<Option<String>> {
    optional_text(field, value, MAX_CUSTOMER_FIELD_LEN)
}

fn optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(Some(value.to_string()))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line or extra quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a selling price. Zero is not a price.
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if !price.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "price".to_string(),
        });
    }
    Ok(())
}

/// Validates a cash amount (payment, register count).
pub fn validate_cash_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "cash".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates an absolute stock level set by an administrator.
pub fn validate_stock_level(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in an order.
///
/// ## Rules
/// - At least one line
/// - At most MAX_ORDER_LINES (100)
pub fn validate_line_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if count > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
