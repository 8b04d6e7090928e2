//! # Validation Module
//!
//! Field validation applied to creation inputs and patches.
//!
//! ## Where Validation Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller ──► service.create(input)                                      │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │           input.validate()   ◄── THIS MODULE                           │
//! │                 │ Ok                                                    │
//! │                 ▼                                                       │
//! │     connectivity check ─► remote insert / mirror upsert                │
//! │                                                                         │
//! │  A rejected input never reaches the remote store or the mirror, so an  │
//! │  invalid row can never end up pending in the reconciliation queue.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use duka_core::validation::{validate_name, validate_phone};
//!
//! validate_name("name", "Jane").unwrap();
//! validate_phone("phone", "+255700000001").unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_NAME_LEN, MAX_TEXT_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a person, customer or title name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_NAME_LEN`] characters
pub fn validate_name(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates free-form text. Empty text is allowed.
pub fn validate_text(field: &str, value: &str) -> ValidationResult<()> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        });
    }
    Ok(())
}

/// Validates a phone number in international form.
///
/// ## Rules
/// - Leading `+`
/// - Followed by 8 to 15 digits, nothing else
///
/// ## Example
/// ```rust
/// use duka_core::validation::validate_phone;
///
/// assert!(validate_phone("phone", "+255700000001").is_ok());
/// assert!(validate_phone("phone", "0700000001").is_err());
/// assert!(validate_phone("phone", "+255 700 000").is_err());
/// ```
pub fn validate_phone(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let digits = value
        .strip_prefix('+')
        .ok_or_else(|| invalid("must start with '+' and a country code"))?;

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("must contain only digits after '+'"));
    }

    if !(8..=15).contains(&digits.len()) {
        return Err(invalid("must have between 8 and 15 digits"));
    }

    Ok(())
}

/// Validates an email address.
///
/// Deliberately loose: exactly one `@`, a non-empty local part and a
/// domain containing a dot that neither starts nor ends with it.
pub fn validate_email(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let invalid = || ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid email address".to_string(),
    };

    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;

    if local.is_empty()
        || domain.contains('@')
        || value.chars().any(char::is_whitespace)
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a money amount in minor units.
pub fn validate_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a UUID string.
///
/// ## Example
/// ```rust
/// use duka_core::validation::validate_uuid;
///
/// assert!(validate_uuid("customer_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("customer_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
