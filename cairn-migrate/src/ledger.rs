//! Ledger of applied migrations.
//!
//! The ledger is a collection in the target database holding one document
//! per applied migration, keyed by the migration's file name. Rows are
//! only ever inserted; the engine never updates or deletes them.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{Backend, CollectionOptions, DatabaseHandle};
use crate::error::{MigrateResult, MigrationError};

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Migration file name.
    #[serde(rename = "_key")]
    pub key: String,
    /// Checksum of the migration content when it was applied.
    pub checksum: String,
}

impl LedgerRecord {
    /// Create a record.
    pub fn new(key: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            checksum: checksum.into(),
        }
    }
}

/// Ledger operations against one database.
pub struct Ledger<'a, B: Backend + ?Sized> {
    backend: &'a B,
    db: &'a DatabaseHandle,
    collection: &'a str,
}

impl<'a, B: Backend + ?Sized> Ledger<'a, B> {
    /// Address the ledger stored in `collection` of `db`.
    pub fn new(backend: &'a B, db: &'a DatabaseHandle, collection: &'a str) -> Self {
        Self {
            backend,
            db,
            collection,
        }
    }

    /// Name of the ledger collection.
    pub fn collection(&self) -> &str {
        self.collection
    }

    /// Create the ledger collection if it is missing. Returns whether it was created.
    pub async fn ensure(&self) -> MigrateResult<bool> {
        let exists = self
            .backend
            .collection_exists(self.db, self.collection)
            .await
            .map_err(|e| MigrationError::ledger(self.collection, e))?;
        if exists {
            return Ok(false);
        }

        self.backend
            .create_collection(self.db, self.collection, &CollectionOptions::default())
            .await
            .map_err(|e| MigrationError::ledger(self.collection, e))?;

        info!(
            database = %self.db.name(),
            collection = %self.collection,
            "Created ledger collection"
        );
        Ok(true)
    }

    /// Check whether a migration has been recorded.
    pub async fn exists(&self, file_name: &str) -> MigrateResult<bool> {
        self.backend
            .document_exists(self.db, self.collection, file_name)
            .await
            .map_err(|e| MigrationError::ledger(self.collection, e))
    }

    /// Record a migration as applied.
    pub async fn append(&self, file_name: &str, checksum: &str) -> MigrateResult<()> {
        let record = serde_json::to_value(LedgerRecord::new(file_name, checksum))?;
        self.backend
            .create_document(self.db, self.collection, record)
            .await
            .map_err(|e| MigrationError::ledger(self.collection, e))
    }
}
