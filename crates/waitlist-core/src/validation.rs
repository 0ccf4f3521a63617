//! # Validation Module
//!
//! Input validation for the join form and queue settings.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Chat widget / host dashboard                                 │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Lifecycle (Rust)                                             │
//! │  └── THIS MODULE: rules checked before any state changes               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use waitlist_core::validation::{validate_party_size, validate_phone};
//!
//! validate_phone("+1 (555) 010-2030").unwrap();
//! validate_party_size(4).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::NewCustomer;
use crate::{
    MAX_AVERAGE_SERVICE_MINUTES, MAX_CAPACITY, MAX_CUSTOMER_NAME_LEN, MAX_NOTES_LEN,
    MAX_PARTY_SIZE, MAX_QUEUE_NAME_LEN, MAX_WITHDRAW_REASON_LEN,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn required_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
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

    Ok(())
}

fn optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<()> {
    match value {
        Some(v) if v.trim().chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

/// Validates the customer's display name (1..=100 characters).
///
/// ```rust
/// use waitlist_core::validation::validate_customer_name;
///
/// assert!(validate_customer_name("Ana").is_ok());
/// assert!(validate_customer_name("   ").is_err());
/// ```
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    required_text("customer_name", name, MAX_CUSTOMER_NAME_LEN)
}

/// Validates a contact phone number.
///
/// ## Rules
/// - 7 to 15 digits
/// - Separators `+ - ( )` and spaces are allowed, anything else is not
/// - `+` only as the first character
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let phone = phone.trim();

    if phone.is_empty() {
        return Err(ValidationError::Required {
            field: "customer_phone".to_string(),
        });
    }

    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "customer_phone".to_string(),
        reason: reason.to_string(),
    };

    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '))
    {
        return Err(invalid("may contain only digits, spaces, and + - ( )"));
    }

    if phone.rfind('+').is_some_and(|i| i > 0) {
        return Err(invalid("+ is only allowed as the first character"));
    }

    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(invalid("must contain 7 to 15 digits"));
    }

    Ok(())
}

/// Validates optional free-text notes (≤ 500 characters).
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    optional_text("notes", notes, MAX_NOTES_LEN)
}

/// Validates an optional withdraw reason (≤ 200 characters).
pub fn validate_withdraw_reason(reason: Option<&str>) -> ValidationResult<()> {
    optional_text("withdraw_reason", reason, MAX_WITHDRAW_REASON_LEN)
}

/// Validates a queue's display name (1..=100 characters).
pub fn validate_queue_name(name: &str) -> ValidationResult<()> {
    required_text("name", name, MAX_QUEUE_NAME_LEN)
}

/// Validates a UUID string.
///
/// ```rust
/// use waitlist_core::validation::validate_uuid;
///
/// assert!(validate_uuid("queue_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("queue_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    uuid::Uuid::parse_str(id.trim())
        .map(|_| ())
        .map_err(|_| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a valid UUID".to_string(),
        })
}

// =============================================================================
// Numeric Validators
// =============================================================================

fn in_range(field: &str, value: i64, min: i64, max: i64) -> ValidationResult<()> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

/// Validates the number of guests (1..=50).
pub fn validate_party_size(party_size: i64) -> ValidationResult<()> {
    in_range("party_size", party_size, 1, MAX_PARTY_SIZE)
}

/// Validates a queue's average service time in minutes (1..=240).
pub fn validate_average_service_minutes(minutes: i64) -> ValidationResult<()> {
    in_range(
        "average_service_minutes",
        minutes,
        1,
        MAX_AVERAGE_SERVICE_MINUTES,
    )
}

/// Validates an optional capacity (1..=10000 when set).
pub fn validate_capacity(capacity: Option<i64>) -> ValidationResult<()> {
    match capacity {
        Some(c) => in_range("capacity", c, 1, MAX_CAPACITY),
        None => Ok(()),
    }
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates a whole join form, stopping at the first problem.
pub fn validate_new_customer(customer: &NewCustomer) -> ValidationResult<()> {
    validate_customer_name(&customer.name)?;
    validate_phone(&customer.phone)?;
    validate_party_size(customer.party_size)?;
    validate_notes(customer.notes.as_deref())?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_name() {
        assert!(validate_customer_name("Ana María").is_ok());
        assert!(matches!(
            validate_customer_name(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_customer_name(&"x".repeat(101)),
            Err(ValidationError::TooLong { max: 100, .. })
        ));
        // Counted in characters, not bytes
        assert!(validate_customer_name(&"é".repeat(100)).is_ok());
    }

    #[test]
    fn test_phone() {
        assert!(validate_phone("5550102").is_ok());
        assert!(validate_phone("+1 (555) 010-2030").is_ok());
        assert!(validate_phone("").is_err());
        assert!(validate_phone("555-01").is_err());
        assert!(validate_phone("1234567890123456").is_err());
        assert!(validate_phone("555 0102 ext 4").is_err());
        assert!(validate_phone("555+0102030").is_err());
    }

    #[test]
    fn test_party_size_bounds() {
        assert!(validate_party_size(1).is_ok());
        assert!(validate_party_size(50).is_ok());
        assert!(matches!(
            validate_party_size(0),
            Err(ValidationError::OutOfRange { min: 1, max: 50, .. })
        ));
        assert!(validate_party_size(51).is_err());
    }

    #[test]
    fn test_optional_text() {
        assert!(validate_notes(None).is_ok());
        assert!(validate_notes(Some("")).is_ok());
        assert!(validate_notes(Some(&"n".repeat(501))).is_err());
        assert!(validate_withdraw_reason(Some(&"r".repeat(200))).is_ok());
        assert!(validate_withdraw_reason(Some(&"r".repeat(201))).is_err());
    }

    #[test]
    fn test_queue_settings() {
        assert!(validate_queue_name("Patio").is_ok());
        assert!(validate_queue_name(" ").is_err());
        assert!(validate_average_service_minutes(0).is_err());
        assert!(validate_average_service_minutes(240).is_ok());
        assert!(validate_capacity(None).is_ok());
        assert!(validate_capacity(Some(0)).is_err());
        assert!(validate_capacity(Some(10_000)).is_ok());
    }

    #[test]
    fn test_new_customer_reports_first_problem() {
        let mut customer = NewCustomer::new("", "bad", 0);
        assert!(matches!(
            validate_new_customer(&customer),
            Err(ValidationError::Required { .. })
        ));

        customer.name = "Ana".to_string();
        assert!(matches!(
            validate_new_customer(&customer),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }
}
