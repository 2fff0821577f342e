//! The database capability surface consumed by the migration engine.
//!
//! The engine never talks to a driver directly. Everything it needs from the
//! target document store goes through the [`Backend`] trait, which keeps the
//! surface small: open/create/remove a database, check/create/drop a
//! collection, and check/create a document.
//!
//! Rollback decisions depend on telling apart failures reported by the
//! database service itself ([`BackendError::Remote`]) from failures that
//! never reached it ([`BackendError::Transport`]). Implementations must map
//! their driver errors onto these two variants faithfully.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{MemoryBackend, Operation, ProvisionedUser};

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Well-known error numbers reported by the document store.
pub mod error_num {
    /// The addressed document does not exist.
    pub const DOCUMENT_NOT_FOUND: u32 = 1202;
    /// The addressed collection does not exist.
    pub const COLLECTION_NOT_FOUND: u32 = 1203;
    /// A collection with the requested name already exists.
    pub const DUPLICATE_NAME: u32 = 1207;
    /// A document with the requested key already exists.
    pub const UNIQUE_CONSTRAINT_VIOLATED: u32 = 1210;
    /// The document carries no usable `_key`.
    pub const DOCUMENT_KEY_BAD: u32 = 1221;
    /// The addressed database does not exist.
    pub const DATABASE_NOT_FOUND: u32 = 1228;
    /// A database with the requested name already exists.
    pub const DUPLICATE_DATABASE_NAME: u32 = 1229;
}

/// Errors surfaced by a [`Backend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The database service processed the request and rejected it.
    #[error("backend error {code} [{error_num}]: {message}")]
    Remote {
        /// HTTP-style status code.
        code: u16,
        /// Service-specific error number.
        error_num: u32,
        /// Message returned by the service.
        message: String,
    },

    /// The request never produced a service response (connection, TLS,
    /// timeouts, malformed responses).
    #[error("transport error: {0}")]
    Transport(String),
}

impl BackendError {
    /// Create a backend-reported error.
    pub fn remote(code: u16, error_num: u32, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            error_num,
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// The named database does not exist.
    pub fn database_not_found(name: &str) -> Self {
        Self::remote(
            404,
            error_num::DATABASE_NOT_FOUND,
            format!("database not found: {}", name),
        )
    }

    /// The named database already exists.
    pub fn duplicate_database(name: &str) -> Self {
        Self::remote(
            409,
            error_num::DUPLICATE_DATABASE_NAME,
            format!("duplicate database name: {}", name),
        )
    }

    /// The named collection does not exist.
    pub fn collection_not_found(name: &str) -> Self {
        Self::remote(
            404,
            error_num::COLLECTION_NOT_FOUND,
            format!("collection or view not found: {}", name),
        )
    }

    /// The named collection already exists.
    pub fn duplicate_collection(name: &str) -> Self {
        Self::remote(
            409,
            error_num::DUPLICATE_NAME,
            format!("duplicate name: {}", name),
        )
    }

    /// A document with the given key already exists.
    pub fn unique_constraint(key: &str) -> Self {
        Self::remote(
            409,
            error_num::UNIQUE_CONSTRAINT_VIOLATED,
            format!("unique constraint violated: {}", key),
        )
    }

    /// Check if the service itself reported this failure.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Check if this is a transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if the service reported the addressed resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote { code: 404, .. })
    }

    /// Service error number, if any.
    pub fn error_num(&self) -> Option<u32> {
        match self {
            Self::Remote { error_num, .. } => Some(*error_num),
            Self::Transport(_) => None,
        }
    }
}

/// A live handle to a database on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabaseHandle {
    name: String,
}

impl DatabaseHandle {
    /// Create a handle for the named database.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name of the database this handle addresses.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A user granted access to a database when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseUser {
    /// Login name.
    pub username: String,
    /// Password; `None` creates the user without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl DatabaseUser {
    /// Create a user with a password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
        }
    }

    /// Create a user without a password.
    pub fn without_password(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }
}

/// Kind of collection to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Plain document collection.
    #[default]
    Document,
    /// Edge collection for graph relations.
    Edge,
}

/// Settings applied when creating a collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionOptions {
    /// Document or edge collection.
    pub kind: CollectionKind,
    /// Whether writes wait for a disk sync before returning.
    pub wait_for_sync: bool,
}

impl CollectionOptions {
    /// Options for an edge collection.
    pub fn edge() -> Self {
        Self {
            kind: CollectionKind::Edge,
            ..Self::default()
        }
    }

    /// Set whether writes wait for sync.
    pub fn wait_for_sync(mut self, wait: bool) -> Self {
        self.wait_for_sync = wait;
        self
    }
}

/// The capabilities the migration engine needs from a document store.
///
/// Every call is a single remote round trip. Implementations are expected
/// to be reliable at the transport level; the engine performs no retries.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open an existing database. A missing database must be reported as a
    /// [`BackendError::Remote`] for which [`BackendError::is_not_found`] holds.
    async fn open_database(&self, name: &str) -> BackendResult<DatabaseHandle>;

    /// Create a database, provisioning each listed user as active.
    async fn create_database(
        &self,
        name: &str,
        users: &[DatabaseUser],
    ) -> BackendResult<DatabaseHandle>;

    /// Remove a database.
    async fn remove_database(&self, db: &DatabaseHandle) -> BackendResult<()>;

    /// Check whether a collection exists.
    async fn collection_exists(&self, db: &DatabaseHandle, name: &str) -> BackendResult<bool>;

    /// Create a collection.
    async fn create_collection(
        &self,
        db: &DatabaseHandle,
        name: &str,
        options: &CollectionOptions,
    ) -> BackendResult<()>;

    /// Drop a collection.
    async fn drop_collection(&self, db: &DatabaseHandle, name: &str) -> BackendResult<()>;

    /// Check whether a document with the given key exists in a collection.
    async fn document_exists(
        &self,
        db: &DatabaseHandle,
        collection: &str,
        key: &str,
    ) -> BackendResult<bool>;

    /// Insert a document. The document's `_key` field identifies it.
    async fn create_document(
        &self,
        db: &DatabaseHandle,
        collection: &str,
        document: serde_json::Value,
    ) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_vs_transport() {
        let err = BackendError::duplicate_collection("orders");
        assert!(err.is_remote());
        assert!(!err.is_transport());
        assert_eq!(err.error_num(), Some(error_num::DUPLICATE_NAME));

        let err = BackendError::transport("connection refused");
        assert!(err.is_transport());
        assert!(!err.is_remote());
        assert_eq!(err.error_num(), None);
    }

    #[test]
    fn test_not_found() {
        assert!(BackendError::database_not_found("shop").is_not_found());
        assert!(BackendError::collection_not_found("orders").is_not_found());
        assert!(!BackendError::unique_constraint("k").is_not_found());
        assert!(!BackendError::transport("404").is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::database_not_found("shop");
        assert_eq!(
            err.to_string(),
            "backend error 404 [1228]: database not found: shop"
        );
    }

    #[test]
    fn test_collection_options_deserialize() {
        let options: CollectionOptions =
            serde_json::from_str(r#"{"kind": "edge"}"#).unwrap();
        assert_eq!(options.kind, CollectionKind::Edge);
        assert!(!options.wait_for_sync);
    }
}
