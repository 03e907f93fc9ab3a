//! Product records.

use crate::model::{expect_fields, parse_count, required, FieldError, WireRecord};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of wire fields in a product record.
pub const PRODUCT_FIELDS: usize = 7;

/// Maximum SKU length in characters.
pub const SKU_MAX_LEN: usize = 32;

/// Maximum description length in characters.
pub const DESCRIPTION_MAX_LEN: usize = 10_000;

/// Products at or below this quantity are flagged as low stock.
pub const LOW_STOCK_THRESHOLD: u32 = 10;

/// A stocked product, keyed by its SKU.
///
/// Wire form: `sku|brand|name|description|quantity|price|imageUrl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique key; immutable once created
    pub sku: String,
    pub brand: String,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    /// Non-negative, at most two decimal places; scale is preserved as sent
    pub price: Decimal,
    pub image_url: String,
}

impl Product {
    /// Builds a product from its seven decoded wire fields.
    ///
    /// The image URL is the last field and may contain `|`.
    pub fn from_fields(fields: &[&str]) -> Result<Self, FieldError> {
        expect_fields(fields, PRODUCT_FIELDS)?;

        let sku = validate_sku(fields[0])?;
        let name = required("Name", fields[2])?;

        let description = fields[3].to_string();
        if description.chars().count() > DESCRIPTION_MAX_LEN {
            return Err(FieldError::TooLong {
                field: "Description",
                max: DESCRIPTION_MAX_LEN,
            });
        }

        Ok(Self {
            sku,
            brand: fields[1].to_string(),
            name,
            description,
            quantity: parse_count("Quantity", fields[4])?,
            price: parse_price(fields[5])?,
            image_url: fields[6].to_string(),
        })
    }

    /// Returns true when the quantity is at or below [`LOW_STOCK_THRESHOLD`].
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= LOW_STOCK_THRESHOLD
    }
}

impl WireRecord for Product {
    fn to_wire(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.sku,
            self.brand,
            self.name,
            self.description,
            self.quantity,
            self.price,
            self.image_url
        )
    }
}

/// Validates a SKU: 1-32 characters of ASCII alphanumerics, `.`, `_`, `/`, `-`.
pub fn validate_sku(value: &str) -> Result<String, FieldError> {
    let sku = value.trim();

    if sku.is_empty() {
        return Err(FieldError::Missing { field: "SKU" });
    }
    if sku.len() > SKU_MAX_LEN {
        return Err(FieldError::TooLong {
            field: "SKU",
            max: SKU_MAX_LEN,
        });
    }

    let valid = sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '-'));
    if !valid {
        return Err(FieldError::InvalidSku(sku.to_string()));
    }

    Ok(sku.to_string())
}

/// Parses a non-negative price with at most two significant decimal places.
///
/// Trailing zeros past the second place are dropped, so `1.500` is stored
/// as `1.50` while `7` and `5.5` keep their scale.
fn parse_price(value: &str) -> Result<Decimal, FieldError> {
    let value = value.trim();
    let mut price = Decimal::from_str(value).map_err(|_| FieldError::NotANumber {
        field: "Price",
        value: value.to_string(),
    })?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(FieldError::Negative { field: "Price" });
    }
    if price.normalize().scale() > 2 {
        return Err(FieldError::TooPrecise);
    }
    if price.scale() > 2 {
        price.rescale(2);
    }

    Ok(price)
}
