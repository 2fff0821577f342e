//! In-process document store implementing [`Backend`].
//!
//! `MemoryBackend` keeps databases, collections and documents in memory.
//! It is cheap to clone: clones share the same state, so a test can hand one
//! copy to the engine and inspect the other afterwards.
//!
//! Two hooks exist for exercising the engine:
//!
//! - **Failure injection**: [`MemoryBackend::fail_on`] queues an error that
//!   the next matching [`Operation`] returns instead of running.
//! - **Journal**: every call is appended to a journal (including calls that
//!   fail), available through [`MemoryBackend::journal`].
//!
//! ```rust,ignore
//! use cairn_migrate::backend::{BackendError, MemoryBackend, Operation};
//!
//! let backend = MemoryBackend::new().with_database("shop");
//! backend.fail_on(
//!     Operation::create_collection("shop", "orders"),
//!     BackendError::transport("connection reset"),
//! );
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    Backend, BackendError, BackendResult, CollectionOptions, DatabaseHandle, DatabaseUser,
    error_num,
};

/// A backend call, as recorded in the journal and matched by failure injection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `open_database(name)`.
    OpenDatabase(String),
    /// `create_database(name, ..)`.
    CreateDatabase(String),
    /// `remove_database(db)`.
    RemoveDatabase(String),
    /// `collection_exists(db, collection)`.
    CollectionExists {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
    },
    /// `create_collection(db, collection, ..)`.
    CreateCollection {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
    },
    /// `drop_collection(db, collection)`.
    DropCollection {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
    },
    /// `document_exists(db, collection, key)`.
    DocumentExists {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
        /// Document key.
        key: String,
    },
    /// `create_document(db, collection, document)`; `key` is the document's `_key`.
    CreateDocument {
        /// Database name.
        database: String,
        /// Collection name.
        collection: String,
        /// Document key.
        key: String,
    },
}

impl Operation {
    /// `CreateCollection` shorthand.
    pub fn create_collection(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::CreateCollection {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// `DropCollection` shorthand.
    pub fn drop_collection(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::DropCollection {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// `CollectionExists` shorthand.
    pub fn collection_exists(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self::CollectionExists {
            database: database.into(),
            collection: collection.into(),
        }
    }

    /// `DocumentExists` shorthand.
    pub fn document_exists(
        database: impl Into<String>,
        collection: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::DocumentExists {
            database: database.into(),
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// `CreateDocument` shorthand.
    pub fn create_document(
        database: impl Into<String>,
        collection: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self::CreateDocument {
            database: database.into(),
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Check if this call writes to the store.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Self::OpenDatabase(_) | Self::CollectionExists { .. } | Self::DocumentExists { .. }
        )
    }
}

/// A user provisioned on a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedUser {
    /// Login name.
    pub username: String,
    /// Password, if one was given.
    pub password: Option<String>,
    /// Whether the user may log in.
    pub active: bool,
}

#[derive(Debug, Default)]
struct CollectionState {
    options: CollectionOptions,
    documents: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct DatabaseState {
    users: Vec<ProvisionedUser>,
    collections: BTreeMap<String, CollectionState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    databases: HashMap<String, DatabaseState>,
    failures: Vec<(Operation, BackendError)>,
    journal: Vec<Operation>,
}

impl MemoryState {
    /// Journal the call and pop a queued failure for it, if any.
    fn enter(&mut self, op: Operation) -> BackendResult<()> {
        let injected = self.failures.iter().position(|(target, _)| *target == op);
        self.journal.push(op);

        match injected {
            Some(idx) => Err(self.failures.remove(idx).1),
            None => Ok(()),
        }
    }

    fn database(&self, name: &str) -> BackendResult<&DatabaseState> {
        self.databases
            .get(name)
            .ok_or_else(|| BackendError::database_not_found(name))
    }

    fn database_mut(&mut self, name: &str) -> BackendResult<&mut DatabaseState> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| BackendError::database_not_found(name))
    }
}

/// In-memory [`Backend`] implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an empty database.
    pub fn with_database(self, name: impl Into<String>) -> Self {
        self.state
            .write()
            .databases
            .entry(name.into())
            .or_default();
        self
    }

    /// Seed an empty collection, creating its database if needed.
    pub fn with_collection(self, database: impl Into<String>, collection: impl Into<String>) -> Self {
        self.state
            .write()
            .databases
            .entry(database.into())
            .or_default()
            .collections
            .entry(collection.into())
            .or_default();
        self
    }

    /// Make the next call matching `op` fail with `error`.
    ///
    /// Each queued failure fires once. Queue the same operation several times
    /// to fail it repeatedly.
    pub fn fail_on(&self, op: Operation, error: BackendError) {
        self.state.write().failures.push((op, error));
    }

    /// All calls made so far, in order.
    pub fn journal(&self) -> Vec<Operation> {
        self.state.read().journal.clone()
    }

    /// Calls made so far that write to the store.
    pub fn writes(&self) -> Vec<Operation> {
        self.state
            .read()
            .journal
            .iter()
            .filter(|op| op.is_write())
            .cloned()
            .collect()
    }

    /// Forget the journal.
    pub fn clear_journal(&self) {
        self.state.write().journal.clear();
    }

    /// Check whether a database exists.
    pub fn has_database(&self, name: &str) -> bool {
        self.state.read().databases.contains_key(name)
    }

    /// Check whether a collection exists.
    pub fn has_collection(&self, database: &str, collection: &str) -> bool {
        self.state
            .read()
            .databases
            .get(database)
            .is_some_and(|db| db.collections.contains_key(collection))
    }

    /// Names of the collections in a database, sorted.
    pub fn collections(&self, database: &str) -> Vec<String> {
        self.state
            .read()
            .databases
            .get(database)
            .map(|db| db.collections.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Options a collection was created with.
    pub fn collection_options(&self, database: &str, collection: &str) -> Option<CollectionOptions> {
        self.state
            .read()
            .databases
            .get(database)?
            .collections
            .get(collection)
            .map(|c| c.options.clone())
    }

    /// Documents stored in a collection, ordered by key.
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Value> {
        self.state
            .read()
            .databases
            .get(database)
            .and_then(|db| db.collections.get(collection))
            .map(|c| c.documents.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Users provisioned on a database.
    pub fn users(&self, database: &str) -> Vec<ProvisionedUser> {
        self.state
            .read()
            .databases
            .get(database)
            .map(|db| db.users.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn open_database(&self, name: &str) -> BackendResult<DatabaseHandle> {
        let mut state = self.state.write();
        state.enter(Operation::OpenDatabase(name.to_string()))?;
        state.database(name)?;
        Ok(DatabaseHandle::new(name))
    }

    async fn create_database(
        &self,
        name: &str,
        users: &[DatabaseUser],
    ) -> BackendResult<DatabaseHandle> {
        let mut state = self.state.write();
        state.enter(Operation::CreateDatabase(name.to_string()))?;

        if state.databases.contains_key(name) {
            return Err(BackendError::duplicate_database(name));
        }

        let users = users
            .iter()
            .map(|u| ProvisionedUser {
                username: u.username.clone(),
                password: u.password.clone(),
                active: true,
            })
            .collect();

        state.databases.insert(
            name.to_string(),
            DatabaseState {
                users,
                collections: BTreeMap::new(),
            },
        );
        Ok(DatabaseHandle::new(name))
    }

    async fn remove_database(&self, db: &DatabaseHandle) -> BackendResult<()> {
        let mut state = self.state.write();
        state.enter(Operation::RemoveDatabase(db.name().to_string()))?;
        state
            .databases
            .remove(db.name())
            .map(|_| ())
            .ok_or_else(|| BackendError::database_not_found(db.name()))
    }

    async fn collection_exists(&self, db: &DatabaseHandle, name: &str) -> BackendResult<bool> {
        let mut state = self.state.write();
        state.enter(Operation::collection_exists(db.name(), name))?;
        Ok(state.database(db.name())?.collections.contains_key(name))
    }

    async fn create_collection(
        &self,
        db: &DatabaseHandle,
        name: &str,
        options: &CollectionOptions,
    ) -> BackendResult<()> {
        let mut state = self.state.write();
        state.enter(Operation::create_collection(db.name(), name))?;

        let database = state.database_mut(db.name())?;
        if database.collections.contains_key(name) {
            return Err(BackendError::duplicate_collection(name));
        }

        database.collections.insert(
            name.to_string(),
            CollectionState {
                options: options.clone(),
                documents: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, db: &DatabaseHandle, name: &str) -> BackendResult<()> {
        let mut state = self.state.write();
        state.enter(Operation::drop_collection(db.name(), name))?;
        state
            .database_mut(db.name())?
            .collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BackendError::collection_not_found(name))
    }

    async fn document_exists(
        &self,
        db: &DatabaseHandle,
        collection: &str,
        key: &str,
    ) -> BackendResult<bool> {
        let mut state = self.state.write();
        state.enter(Operation::document_exists(db.name(), collection, key))?;
        state
            .database(db.name())?
            .collections
            .get(collection)
            .map(|c| c.documents.contains_key(key))
            .ok_or_else(|| BackendError::collection_not_found(collection))
    }

    async fn create_document(
        &self,
        db: &DatabaseHandle,
        collection: &str,
        document: Value,
    ) -> BackendResult<()> {
        let key = document
            .get("_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();

        let mut state = self.state.write();
        state.enter(Operation::create_document(db.name(), collection, key.as_str()))?;

        if key.is_empty() {
            return Err(BackendError::remote(
                400,
                error_num::DOCUMENT_KEY_BAD,
                "illegal document key",
            ));
        }

        let documents = &mut state
            .database_mut(db.name())?
            .collections
            .get_mut(collection)
            .ok_or_else(|| BackendError::collection_not_found(collection))?
            .documents;

        if documents.contains_key(&key) {
            return Err(BackendError::unique_constraint(&key));
        }
        documents.insert(key, document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_open_missing_database() {
        let backend = MemoryBackend::new();
        let err = backend.open_database("shop").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.error_num(), Some(error_num::DATABASE_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_create_database_provisions_active_users() {
        let backend = MemoryBackend::new();
        let users = vec![
            DatabaseUser::new("app", "secret"),
            DatabaseUser::without_password("reader"),
        ];

        let db = backend.create_database("shop", &users).await.unwrap();
        assert_eq!(db.name(), "shop");

        let provisioned = backend.users("shop");
        assert_eq!(provisioned.len(), 2);
        assert!(provisioned.iter().all(|u| u.active));
        assert_eq!(provisioned[0].password.as_deref(), Some("secret"));
        assert_eq!(provisioned[1].password, None);

        let err = backend.create_database("shop", &[]).await.unwrap_err();
        assert_eq!(err.error_num(), Some(error_num::DUPLICATE_DATABASE_NAME));
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let backend = MemoryBackend::new().with_database("shop");
        let db = DatabaseHandle::new("shop");

        assert!(!backend.collection_exists(&db, "orders").await.unwrap());
        backend
            .create_collection(&db, "orders", &CollectionOptions::edge())
            .await
            .unwrap();
        assert!(backend.collection_exists(&db, "orders").await.unwrap());
        assert_eq!(
            backend.collection_options("shop", "orders"),
            Some(CollectionOptions::edge())
        );

        let err = backend
            .create_collection(&db, "orders", &CollectionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_num(), Some(error_num::DUPLICATE_NAME));

        backend.drop_collection(&db, "orders").await.unwrap();
        assert!(!backend.has_collection("shop", "orders"));
        assert!(backend.drop_collection(&db, "orders").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_documents_are_unique_by_key() {
        let backend = MemoryBackend::new().with_collection("shop", "ledger");
        let db = DatabaseHandle::new("shop");

        backend
            .create_document(&db, "ledger", json!({"_key": "a", "checksum": "1"}))
            .await
            .unwrap();
        assert!(backend.document_exists(&db, "ledger", "a").await.unwrap());
        assert!(!backend.document_exists(&db, "ledger", "b").await.unwrap());

        let err = backend
            .create_document(&db, "ledger", json!({"_key": "a"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_num(), Some(error_num::UNIQUE_CONSTRAINT_VIOLATED));

        let err = backend
            .create_document(&db, "ledger", json!({"checksum": "2"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_num(), Some(error_num::DOCUMENT_KEY_BAD));

        assert_eq!(
            backend.documents("shop", "ledger"),
            vec![json!({"_key": "a", "checksum": "1"})]
        );
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let backend = MemoryBackend::new().with_database("shop");
        let db = DatabaseHandle::new("shop");
        backend.fail_on(
            Operation::create_collection("shop", "orders"),
            BackendError::transport("connection reset"),
        );

        let err = backend
            .create_collection(&db, "orders", &CollectionOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(!backend.has_collection("shop", "orders"));

        backend
            .create_collection(&db, "orders", &CollectionOptions::default())
            .await
            .unwrap();
        assert!(backend.has_collection("shop", "orders"));
    }

    #[tokio::test]
    async fn test_journal_records_failed_calls() {
        let backend = MemoryBackend::new();
        let _ = backend.open_database("shop").await;
        backend.create_database("shop", &[]).await.unwrap();

        assert_eq!(
            backend.journal(),
            vec![
                Operation::OpenDatabase("shop".into()),
                Operation::CreateDatabase("shop".into()),
            ]
        );
        assert_eq!(backend.writes(), vec![Operation::CreateDatabase("shop".into())]);

        backend.clear_journal();
        assert!(backend.journal().is_empty());
    }
}
