//! Error types for the migration engine.

use thiserror::Error;

use crate::backend::BackendError;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Bootstrap preconditions or catalog invariants violated. Nothing was applied.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backend call made while applying a migration failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A migration variant does not support the requested action.
    #[error("unsupported {kind} action '{action}'")]
    UnsupportedAction {
        /// Variant name.
        kind: String,
        /// The rejected action.
        action: String,
    },

    /// Reading or writing the ledger failed.
    #[error("Ledger error in '{collection}': {source}")]
    Ledger {
        /// Ledger collection name.
        collection: String,
        /// Underlying backend failure.
        #[source]
        source: BackendError,
    },

    /// A migration failed and its undo failed as well.
    #[error("Undo for migration '{migration}' failed: {source} (original failure: {cause})")]
    Undo {
        /// Identity of the forward migration.
        migration: String,
        /// The failure that triggered the undo.
        cause: BackendError,
        /// The undo failure.
        #[source]
        source: Box<MigrationError>,
    },

    /// A ledger record could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled by the caller.
    #[error("Migration run cancelled")]
    Cancelled,
}

impl MigrationError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unsupported action error.
    pub fn unsupported_action(kind: impl Into<String>, action: impl Into<String>) -> Self {
        Self::UnsupportedAction {
            kind: kind.into(),
            action: action.into(),
        }
    }

    /// Create a ledger error.
    pub fn ledger(collection: impl Into<String>, source: BackendError) -> Self {
        Self::Ledger {
            collection: collection.into(),
            source,
        }
    }

    /// The backend failure behind this error, if the service reported it.
    ///
    /// Only these failures are eligible for compensation by an undo.
    pub fn backend_reported(&self) -> Option<&BackendError> {
        match self {
            Self::Backend(err) if err.is_remote() => Some(err),
            _ => None,
        }
    }

    /// Check if the database service itself reported this failure.
    pub fn is_backend_reported(&self) -> bool {
        self.backend_reported().is_some()
    }

    /// Check if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a ledger error.
    pub fn is_ledger_error(&self) -> bool {
        matches!(self, Self::Ledger { .. })
    }

    /// Check if the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::config("database 'shop' does not exist");
        assert!(err.to_string().contains("shop"));

        let err = MigrationError::unsupported_action("database", "rename");
        assert_eq!(err.to_string(), "unsupported database action 'rename'");
    }

    #[test]
    fn test_backend_reported() {
        let err = MigrationError::from(BackendError::duplicate_collection("orders"));
        assert!(err.is_backend_reported());

        let err = MigrationError::from(BackendError::transport("connection refused"));
        assert!(!err.is_backend_reported());

        let err = MigrationError::ledger("_cairn_migrations", BackendError::duplicate_collection("x"));
        assert!(!err.is_backend_reported());
        assert!(err.is_ledger_error());

        assert!(!MigrationError::unsupported_action("database", "x").is_backend_reported());
    }

    #[test]
    fn test_undo_display_carries_both_failures() {
        let err = MigrationError::Undo {
            migration: "0002_orders".to_string(),
            cause: BackendError::duplicate_collection("orders"),
            source: Box::new(BackendError::transport("connection reset").into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("0002_orders"));
        assert!(msg.contains("connection reset"));
        assert!(msg.contains("duplicate name: orders"));
    }
}
