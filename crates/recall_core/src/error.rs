//! Error types for Recall core.

use crate::validate::ValidationIssue;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Recall core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An event or ingest payload failed schema checks. Rejected before
    /// touching the log; never fatal to the process.
    #[error("validation failed: {}", format_issues(.issues))]
    Validation {
        /// Field-level validation messages.
        issues: Vec<ValidationIssue>,
    },

    /// An event was applied against a snapshot it cannot mutate (wrong
    /// entity kind, or a task event with no prior ingest). Indicates a
    /// programming error or a corrupted log, never a user-facing condition.
    #[error("event {event_type} cannot apply to entity {entity_id}: {message}")]
    EntityMismatch {
        /// The entity the event targeted.
        entity_id: String,
        /// Wire name of the offending event kind.
        event_type: &'static str,
        /// Description of the mismatch.
        message: String,
    },

    /// Storage backend failure (transaction failure, corruption, I/O).
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// A schema migration failed. The store must not open with a partial
    /// schema.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },

    /// A malformed identifier was supplied.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in the current state (e.g. an unknown
    /// pagination cursor).
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Serialization failure. An unknown event `type` on the wire surfaces
    /// here (a version mismatch between writer and reader).
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a validation error from collected issues.
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self::Validation { issues }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid identifier error.
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an entity mismatch error.
    pub fn entity_mismatch(
        entity_id: impl Into<String>,
        event_type: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::EntityMismatch {
            entity_id: entity_id.into(),
            event_type,
            message: message.into(),
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_fields() {
        let err = CoreError::validation(vec![
            ValidationIssue::new("events[0].id", "must be 22 characters"),
            ValidationIssue::new("events[1].componentID", "must not be empty"),
        ]);
        let text = err.to_string();
        assert!(text.contains("events[0].id"));
        assert!(text.contains("events[1].componentID"));
    }

    #[test]
    fn storage_error_message() {
        let err = CoreError::storage("disk full");
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
