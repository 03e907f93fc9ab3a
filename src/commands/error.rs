//! Errors raised while executing a command.

use crate::auth::HashError;
use crate::model::FieldError;
use crate::protocol::ParseError;
use crate::storage::{Entity, StoreError};
use thiserror::Error;

/// Sanitized text for any store fault other than a duplicate or missing key.
pub const DATABASE_ERROR: &str = "Database error, please try again.";

/// Sanitized text for a panic or other unexpected dispatch fault.
pub const INTERNAL_ERROR: &str = "Internal server error.";

/// A command failed before, during or after its collaborator call.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The payload did not have the expected shape
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A record field failed validation
    #[error(transparent)]
    Field(#[from] FieldError),

    /// The backing store reported a fault
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Hashing a credential failed
    #[error(transparent)]
    Hash(#[from] HashError),

    /// One record of a bulk payload was invalid
    #[error("record {index}: {source}")]
    BatchRecord {
        /// 1-based position in the batch
        index: usize,
        #[source]
        source: Box<CommandError>,
    },
}

impl CommandError {
    /// Returns true if the detail must stay in the server log.
    pub fn is_internal(&self) -> bool {
        match self {
            CommandError::Store(StoreError::Duplicate { .. } | StoreError::NotFound { .. }) => {
                false
            }
            CommandError::Store(_) | CommandError::Hash(_) => true,
            CommandError::BatchRecord { source, .. } => source.is_internal(),
            CommandError::Parse(_) | CommandError::Field(_) => false,
        }
    }

    /// The message sent to the client inside the `FAILURE` response.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Parse(e) => e.to_string(),
            CommandError::Field(e) => e.to_string(),
            CommandError::Store(StoreError::Duplicate { entity, key }) => {
                duplicate_message(*entity, key)
            }
            CommandError::Store(StoreError::NotFound { entity, key }) => {
                not_found_message(*entity, key)
            }
            CommandError::Store(_) | CommandError::Hash(_) => DATABASE_ERROR.to_string(),
            CommandError::BatchRecord { index, source } => {
                if source.is_internal() {
                    source.user_message()
                } else {
                    format!("Record {index}: {}", source.user_message())
                }
            }
        }
    }
}

fn duplicate_message(entity: Entity, key: &str) -> String {
    match entity {
        Entity::Product => format!("A product with SKU '{key}' already exists."),
        Entity::User => format!("An account with email '{key}' already exists."),
        Entity::Supplier => format!("Supplier '{key}' already exists."),
    }
}

fn not_found_message(entity: Entity, key: &str) -> String {
    match entity {
        Entity::Product => format!("Product with SKU '{key}' not found."),
        Entity::User => format!("User with id '{key}' not found."),
        Entity::Supplier => format!("Supplier with id '{key}' not found."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message() {
        let err = CommandError::Store(StoreError::Duplicate {
            entity: Entity::Product,
            key: "SKU1".into(),
        });
        assert_eq!(err.user_message(), "A product with SKU 'SKU1' already exists.");
        assert!(!err.is_internal());
    }

    #[test]
    fn test_store_faults_are_sanitized() {
        let err = CommandError::Store(StoreError::Unavailable);
        assert_eq!(err.user_message(), DATABASE_ERROR);
        assert!(err.is_internal());

        let err = CommandError::Store(StoreError::Io(std::io::Error::other("disk full")));
        assert_eq!(err.user_message(), DATABASE_ERROR);
    }

    #[test]
    fn test_batch_record_message() {
        let err = CommandError::BatchRecord {
            index: 2,
            source: Box::new(ParseError::FieldCount {
                expected: 7,
                found: 6,
            }
            .into()),
        };
        assert_eq!(err.user_message(), "Record 2: Expected 7 fields but received 6.");
    }
}
