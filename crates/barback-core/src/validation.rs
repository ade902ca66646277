//! # Validation Module
//!
//! Business-rule validation for request bodies, run after deserialization
//! and before anything touches the store.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: serde (barback-server extractors)                             │
//! │  └── shape and types of the JSON body                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  └── lengths, ranges, formats                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  └── NOT NULL, UNIQUE, foreign keys                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use barback_core::validation::{validate_product_name, validate_sale_quantity};
//!
//! assert!(validate_product_name("Negroni").is_ok());
//! assert!(validate_sale_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::{MAX_ITEM_QUANTITY, MAX_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

// =============================================================================
// Account Validators
// =============================================================================

/// Validates a username.
///
/// ## Rules
/// - 3 to 32 characters after trimming
/// - Letters, digits, `_`, `.` and `-` only
///
/// ## Returns
/// The trimmed username.
pub fn validate_username(username: &str) -> ValidationResult<String> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }
    if username.chars().count() < USERNAME_MIN_LEN {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: USERNAME_MIN_LEN,
        });
    }
    if username.chars().count() > USERNAME_MAX_LEN {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: USERNAME_MAX_LEN,
        });
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "must contain only letters, numbers, dots, hyphens, and underscores".to_string(),
        });
    }

    Ok(username.to_string())
}

/// Validates a new password. Not trimmed.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "password".to_string(),
        });
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: PASSWORD_MIN_LEN,
        });
    }
    if password.chars().count() > PASSWORD_MAX_LEN {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: PASSWORD_MAX_LEN,
        });
    }
    Ok(())
}

/// Validates a 6-digit authenticator code.
///
/// ## Example
/// ```rust
/// use barback_core::validation::validate_totp_code;
///
/// assert!(validate_totp_code("012345").is_ok());
/// assert!(validate_totp_code("12345").is_err());
/// assert!(validate_totp_code("12a456").is_err());
/// ```
pub fn validate_totp_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must be 6 digits".to_string(),
        });
    }
    Ok(code.to_string())
}

// =============================================================================
// Catalog Validators
// =============================================================================

fn validate_name(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates a product or recipe name (1 to 200 characters).
///
/// ## Example
/// ```rust
/// use barback_core::validation::validate_product_name;
///
/// assert_eq!(validate_product_name("  Aperol Spritz ").unwrap(), "Aperol Spritz");
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<String> {
    validate_name("name", name, 200)
}

/// Categories may be empty; empty means "Uncategorized" in reports.
pub fn validate_category(category: &str) -> ValidationResult<String> {
    let category = category.trim();
    if category.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: "category".to_string(),
            max: 100,
        });
    }
    Ok(category.to_string())
}

/// Validates a unit label; empty becomes `"unit"`.
pub fn validate_unit(unit: &str) -> ValidationResult<String> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Ok("unit".to_string());
    }
    if unit.chars().count() > 30 {
        return Err(ValidationError::TooLong {
            field: "unit".to_string(),
            max: 30,
        });
    }
    Ok(unit.to_string())
}

/// Validates a tab's customer name (1 to 100 characters).
pub fn validate_customer_name(name: &str) -> ValidationResult<String> {
    validate_name("customerName", name, 100)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a price or cost in cents.
///
/// ## Rules
/// - 0 (free item) up to [`MAX_PRICE_CENTS`]
///
/// ## Example
/// ```rust
/// use barback_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents("price", 1099).is_ok());
/// assert!(validate_price_cents("price", 0).is_ok());
/// assert!(validate_price_cents("price", -100).is_err());
/// ```
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }
    Ok(())
}

/// Validates a stock level. Negative stock is allowed (oversold bar),
/// NaN and infinities are not.
pub fn validate_stock_quantity(field: &str, quantity: f64) -> ValidationResult<()> {
    if !quantity.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }
    Ok(())
}

/// Validates a par level or recipe ingredient amount: finite and not
/// negative.
pub fn validate_non_negative(field: &str, value: f64) -> ValidationResult<()> {
    validate_stock_quantity(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates the quantity of a cart or tab line.
///
/// ## Rules
/// - Must be positive
/// - Must not exceed [`MAX_ITEM_QUANTITY`]
pub fn validate_sale_quantity(qty: i64) -> ValidationResult<()> {
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

/// Validates a flat tax rate percentage (0 to 100).
pub fn validate_tax_rate(rate: f64) -> ValidationResult<()> {
    if !rate.is_finite() || !(0.0..=100.0).contains(&rate) {
        return Err(ValidationError::OutOfRange {
            field: "taxRate".to_string(),
            min: 0,
            max: 100,
        });
    }
    Ok(())
}

/// Validates a UTC offset in minutes (-14h to +14h).
pub fn validate_utc_offset(minutes: i32) -> ValidationResult<()> {
    if !(-840..=840).contains(&minutes) {
        return Err(ValidationError::OutOfRange {
            field: "utcOffsetMinutes".to_string(),
            min: -840,
            max: 840,
        });
    }
    Ok(())
}

// =============================================================================
// ID Validators
// =============================================================================

/// Validates a UUID path or body id.
///
/// ## Example
/// ```rust
/// use barback_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("  bar_tender.1 ").unwrap(), "bar_tender.1");
        assert!(matches!(validate_username(""), Err(ValidationError::Required { .. })));
        assert!(matches!(validate_username("ab"), Err(ValidationError::TooShort { .. })));
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("émile").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("correct horse").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password("").is_err());
        assert!(validate_password(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_validate_totp_code() {
        assert_eq!(validate_totp_code(" 123456 ").unwrap(), "123456");
        assert!(validate_totp_code("1234567").is_err());
        assert!(validate_totp_code("").is_err());
    }

    #[test]
    fn test_validate_names() {
        assert!(validate_product_name(&"A".repeat(300)).is_err());
        assert_eq!(validate_category("  ").unwrap(), "");
        assert_eq!(validate_unit("").unwrap(), "unit");
        assert_eq!(validate_customer_name(" Table 4 ").unwrap(), "Table 4");
        let err = validate_customer_name("").unwrap_err();
        assert_eq!(err.field(), "customerName");
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents("price", MAX_PRICE_CENTS).is_ok());
        assert!(validate_price_cents("cost", MAX_PRICE_CENTS + 1).is_err());
        assert_eq!(validate_price_cents("cost", -1).unwrap_err().field(), "cost");
    }

    #[test]
    fn test_validate_stock_values() {
        assert!(validate_stock_quantity("quantity", -3.5).is_ok());
        assert!(validate_stock_quantity("quantity", f64::NAN).is_err());
        assert!(validate_non_negative("parLevel", 0.0).is_ok());
        assert!(matches!(
            validate_non_negative("parLevel", -1.0),
            Err(ValidationError::Negative { .. })
        ));
    }

    #[test]
    fn test_validate_sale_quantity() {
        assert!(validate_sale_quantity(1).is_ok());
        assert!(validate_sale_quantity(999).is_ok());
        assert!(validate_sale_quantity(0).is_err());
        assert!(validate_sale_quantity(-1).is_err());
        assert!(validate_sale_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_tax_rate_and_offset() {
        assert!(validate_tax_rate(14.975).is_ok());
        assert!(validate_tax_rate(100.5).is_err());
        assert!(validate_tax_rate(f64::INFINITY).is_err());
        assert!(validate_utc_offset(-300).is_ok());
        assert!(validate_utc_offset(900).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
