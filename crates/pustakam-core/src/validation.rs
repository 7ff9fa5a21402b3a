//! # Validation Module
//!
//! Input validation for order placement, amendments and courier data.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Storefront (TypeScript)                                      │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: HTTP handler (Rust)                                          │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  └── CHECK / UNIQUE / append-only triggers                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pustakam_core::validation::{validate_order_id, validate_pincode};
//!
//! assert!(validate_order_id("ATK-2024-001").is_ok());
//! assert!(validate_pincode("520001").is_ok());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::{OrderItem, ShippingAddress};
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_ITEMS, MAX_UNIT_PRICE_PAISE, ORDER_NUMBER_PREFIX};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifiers
// =============================================================================

/// Validates an order number of the form `ATK-{year}-{sequence}`.
///
/// ## Rules
/// - Prefix `ATK`
/// - Four-digit year
/// - Sequence of at least three digits
///
/// ```rust
/// use pustakam_core::validation::validate_order_id;
///
/// assert!(validate_order_id("ATK-2024-1042").is_ok());
/// assert!(validate_order_id("ATK-24-1").is_err());
/// ```
pub fn validate_order_id(order_id: &str) -> ValidationResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "order_id".to_string(),
        reason: reason.to_string(),
    };

    let mut parts = order_id.split('-');
    let (prefix, year, seq) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(y), Some(s), None) => (p, y, s),
        _ => return Err(invalid("expected ATK-YYYY-NNN")),
    };

    if prefix != ORDER_NUMBER_PREFIX {
        return Err(invalid("unknown prefix"));
    }
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("year must be four digits"));
    }
    if seq.len() < 3 || !seq.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("sequence must be at least three digits"));
    }

    Ok(())
}

/// Formats an order number from its year and per-year sequence.
///
/// ```rust
/// use pustakam_core::validation::format_order_id;
///
/// assert_eq!(format_order_id(2024, 7), "ATK-2024-007");
/// assert_eq!(format_order_id(2024, 1042), "ATK-2024-1042");
/// ```
pub fn format_order_id(year: i32, sequence: i64) -> String {
    format!("{}-{}-{:03}", ORDER_NUMBER_PREFIX, year, sequence)
}

/// Validates a courier AWB.
///
/// ## Rules
/// - Not empty, at most 40 characters
/// - Letters, digits and hyphens only
pub fn validate_tracking_number(awb: &str) -> ValidationResult<()> {
    if awb.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "tracking_number".to_string(),
        });
    }
    if awb.len() > 40 {
        return Err(ValidationError::TooLong {
            field: "tracking_number".to_string(),
            max: 40,
        });
    }
    if !awb.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "tracking_number".to_string(),
            reason: "must contain only letters, digits and hyphens".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Items
// =============================================================================

/// Validates a quantity for a single line.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 || quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates the item list of an order.
///
/// ## Rules
/// - At least one item, at most [`MAX_ORDER_ITEMS`]
/// - Each line has a book id and title
/// - Quantity within range, price not negative
/// - A book appears on one line only
pub fn validate_items(items: &[OrderItem]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if items.len() > MAX_ORDER_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_ITEMS as i64,
        });
    }

    let mut seen = HashSet::new();
    for item in items {
        require("book_id", &item.book_id)?;
        require("title", &item.title)?;
        validate_quantity(item.quantity)?;
        if item.unit_price.is_negative() {
            return Err(ValidationError::MustBePositive {
                field: "unit_price".to_string(),
            });
        }
        if item.unit_price.paise() > MAX_UNIT_PRICE_PAISE {
            return Err(ValidationError::OutOfRange {
                field: "unit_price".to_string(),
                min: 0,
                max: MAX_UNIT_PRICE_PAISE,
            });
        }
        if !seen.insert(item.book_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "book_id".to_string(),
                value: item.book_id.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Address
// =============================================================================

/// Validates an Indian postal pincode: six digits, not starting with 0.
pub fn validate_pincode(pincode: &str) -> ValidationResult<()> {
    let valid = pincode.len() == 6
        && pincode.chars().all(|c| c.is_ascii_digit())
        && !pincode.starts_with('0');
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "pincode".to_string(),
            reason: "must be six digits".to_string(),
        });
    }
    Ok(())
}

/// Validates a mobile number: ten digits, optionally prefixed with `+91`.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let digits = phone.trim().trim_start_matches("+91").trim();
    if digits.len() != 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must be a ten digit mobile number".to_string(),
        });
    }
    Ok(())
}

/// Validates a shipping address.
pub fn validate_shipping_address(address: &ShippingAddress) -> ValidationResult<()> {
    require("name", &address.name)?;
    require("line1", &address.line1)?;
    require("city", &address.city)?;
    require("state", &address.state)?;
    validate_phone(&address.phone)?;
    validate_pincode(&address.pincode)?;
    Ok(())
}

/// Validates a free-text reason (cancellation, refund, return).
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    require("reason", reason)?;
    if reason.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: 500,
        });
    }
    Ok(())
}

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
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
    use crate::money::Money;

    fn item(book_id: &str, qty: i64) -> OrderItem {
        OrderItem {
            book_id: book_id.to_string(),
            title: "Maha Prasthanam".to_string(),
            author: "Sri Sri".to_string(),
            quantity: qty,
            unit_price: Money::from_rupees(150),
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Lakshmi".to_string(),
            phone: "+91 9876543210".to_string(),
            line1: "12-3-45, Gandhi Nagar".to_string(),
            line2: None,
            city: "Vijayawada".to_string(),
            state: "Andhra Pradesh".to_string(),
            pincode: "520003".to_string(),
        }
    }

    #[test]
    fn test_order_id_format() {
        assert!(validate_order_id("ATK-2024-001").is_ok());
        assert!(validate_order_id("ATK-2025-12345").is_ok());
        assert!(validate_order_id("ORD-2024-001").is_err());
        assert!(validate_order_id("ATK-2024-01").is_err());
        assert!(validate_order_id("ATK-2024-001-9").is_err());
        assert!(validate_order_id("").is_err());
    }

    #[test]
    fn test_format_order_id_round_trips_through_validation() {
        let id = format_order_id(2024, 1);
        assert_eq!(id, "ATK-2024-001");
        assert!(validate_order_id(&id).is_ok());
    }

    #[test]
    fn test_items() {
        assert!(validate_items(&[item("bk-1", 1), item("bk-2", 3)]).is_ok());
        assert!(validate_items(&[]).is_err());
        assert!(matches!(
            validate_items(&[item("bk-1", 0)]),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            validate_items(&[item("bk-1", 1), item("bk-1", 2)]),
            Err(ValidationError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_unit_price_cap() {
        let mut at_cap = item("bk-1", MAX_ITEM_QUANTITY);
        at_cap.unit_price = Money::from_paise(MAX_UNIT_PRICE_PAISE);
        assert!(validate_items(&[at_cap]).is_ok());

        let mut huge = item("bk-1", 2);
        huge.unit_price = Money::from_paise(i64::MAX / 2 + 1);
        assert_eq!(
            validate_items(&[huge]),
            Err(ValidationError::OutOfRange {
                field: "unit_price".to_string(),
                min: 0,
                max: MAX_UNIT_PRICE_PAISE,
            })
        );
    }

    #[test]
    fn test_address() {
        assert!(validate_shipping_address(&address()).is_ok());

        let mut bad = address();
        bad.pincode = "52000".to_string();
        assert!(validate_shipping_address(&bad).is_err());

        let mut bad = address();
        bad.phone = "12345".to_string();
        assert!(validate_shipping_address(&bad).is_err());

        let mut bad = address();
        bad.city = "  ".to_string();
        assert!(matches!(
            validate_shipping_address(&bad),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_tracking_number() {
        assert!(validate_tracking_number("SR123456789").is_ok());
        assert!(validate_tracking_number("").is_err());
        assert!(validate_tracking_number("AWB 123").is_err());
    }
}
