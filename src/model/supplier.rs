//! Supplier records.

use crate::model::{expect_fields, parse_id, required, FieldError, WireRecord};
use serde::{Deserialize, Serialize};

/// Number of wire fields in a supplier record, id included.
pub const SUPPLIER_FIELDS: usize = 7;

/// A supplier.
///
/// Wire form: `id|company|contactName|phone|email|address|notes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    /// Server-assigned id; `None` until the store assigns one
    pub id: Option<i64>,
    pub company: String,
    pub contact_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    /// Last field, so it may contain `|`
    pub notes: String,
}

impl Supplier {
    /// Builds a supplier from its seven decoded wire fields.
    ///
    /// An empty id field yields `id: None` (used when adding).
    pub fn from_fields(fields: &[&str]) -> Result<Self, FieldError> {
        expect_fields(fields, SUPPLIER_FIELDS)?;

        let id = match fields[0].trim() {
            "" => None,
            id => Some(parse_id("Supplier id", id)?),
        };

        Ok(Self {
            id,
            company: required("Company", fields[1])?,
            contact_name: fields[2].to_string(),
            phone: fields[3].trim().to_string(),
            email: fields[4].trim().to_string(),
            address: fields[5].to_string(),
            notes: fields[6].to_string(),
        })
    }
}

impl WireRecord for Supplier {
    fn to_wire(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.id.map(|id| id.to_string()).unwrap_or_default(),
            self.company,
            self.contact_name,
            self.phone,
            self.email,
            self.address,
            self.notes
        )
    }
}
