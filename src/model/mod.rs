//! Entity Records
//!
//! Plain value records exchanged across the wire and stored by the backing
//! store. The command dispatcher builds a fresh record per request from the
//! decoded fields and hands it to exactly one collaborator call.
//!
//! Every record knows how to validate itself from decoded `&str` fields
//! (`from_fields`) and how to render itself in the `|`-delimited wire form
//! ([`WireRecord::to_wire`]).

pub mod product;
pub mod supplier;
pub mod user;

pub use product::{Product, DESCRIPTION_MAX_LEN, LOW_STOCK_THRESHOLD, PRODUCT_FIELDS, SKU_MAX_LEN};
pub use supplier::{Supplier, SUPPLIER_FIELDS};
pub use user::{Role, User, SIGNUP_FIELDS, USER_UPDATE_FIELDS};

use thiserror::Error;

/// A record that can be rendered in the `|`-delimited wire form.
pub trait WireRecord {
    /// Renders the record's fields joined by `|`.
    fn to_wire(&self) -> String;
}

/// Validation failures for individual record fields.
///
/// The `Display` text is sent to the client inside a `FAILURE` response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// The record had the wrong number of fields
    #[error("Expected {expected} fields but received {found}.")]
    FieldCount { expected: usize, found: usize },

    /// A required field was empty
    #[error("{field} is required.")]
    Missing { field: &'static str },

    /// A numeric field did not parse
    #[error("{field} must be a number, got '{value}'.")]
    NotANumber { field: &'static str, value: String },

    /// A numeric field was negative
    #[error("{field} must not be negative.")]
    Negative { field: &'static str },

    /// A numeric field was outside its allowed range
    #[error("{field} is out of range.")]
    OutOfRange { field: &'static str },

    /// A price had more than two decimal places
    #[error("Price may have at most 2 decimal places.")]
    TooPrecise,

    /// A field exceeded its maximum length
    #[error("{field} must be at most {max} characters.")]
    TooLong { field: &'static str, max: usize },

    /// A SKU contained characters outside the allowed set
    #[error("SKU '{0}' may only contain letters, digits, '.', '_', '/' and '-'.")]
    InvalidSku(String),

    /// An email address was malformed
    #[error("'{0}' is not a valid email address.")]
    InvalidEmail(String),

    /// A role was neither admin nor staff
    #[error("Role must be 'admin' or 'staff', got '{0}'.")]
    InvalidRole(String),
}

/// Checks that a record has exactly `expected` fields.
pub(crate) fn expect_fields(fields: &[&str], expected: usize) -> Result<(), FieldError> {
    if fields.len() != expected {
        return Err(FieldError::FieldCount {
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

/// Returns the field unchanged, or an error if it is blank.
pub(crate) fn required(field: &'static str, value: &str) -> Result<String, FieldError> {
    if value.trim().is_empty() {
        return Err(FieldError::Missing { field });
    }
    Ok(value.to_string())
}

/// Parses a non-negative whole number that fits in a `u32`.
pub(crate) fn parse_count(field: &'static str, value: &str) -> Result<u32, FieldError> {
    let value = value.trim();
    let n: i64 = value.parse().map_err(|_| FieldError::NotANumber {
        field,
        value: value.to_string(),
    })?;

    if n < 0 {
        return Err(FieldError::Negative { field });
    }

    u32::try_from(n).map_err(|_| FieldError::OutOfRange { field })
}

/// Parses a server-assigned record id.
pub(crate) fn parse_id(field: &'static str, value: &str) -> Result<i64, FieldError> {
    let value = value.trim();
    let id: i64 = value.parse().map_err(|_| FieldError::NotANumber {
        field,
        value: value.to_string(),
    })?;

    if id < 0 {
        return Err(FieldError::Negative { field });
    }
    Ok(id)
}

/// Normalizes an email address for storage and lookup.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Validates and normalizes a required email address.
pub(crate) fn parse_email(value: &str) -> Result<String, FieldError> {
    let email = normalize_email(value);
    if email.is_empty() {
        return Err(FieldError::Missing { field: "Email" });
    }

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(FieldError::InvalidEmail(email)),
    }
}
