//! Migration types and per-variant apply logic.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::{Backend, CollectionOptions, DatabaseHandle, DatabaseUser};
use crate::error::{MigrateResult, MigrationError};

/// What a migration does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Action {
    /// Bring the target into existence.
    Create,
    /// Remove the target.
    Delete,
    /// Change an existing target.
    Modify,
}

impl Action {
    /// Lowercase action name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Modify => "modify",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "delete" => Ok(Self::Delete),
            "modify" => Ok(Self::Modify),
            _ => Err(MigrationError::unsupported_action("migration", s)),
        }
    }
}

impl TryFrom<String> for Action {
    type Error = MigrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Payload of a database migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMigration {
    /// Database name.
    pub name: String,
    /// Requested action.
    pub action: Action,
    /// Users provisioned when the database is created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<DatabaseUser>,
}

impl DatabaseMigration {
    /// Create the named database.
    pub fn create(name: impl Into<String>) -> Self {
        Self::new(name, Action::Create)
    }

    /// Delete the active database.
    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(name, Action::Delete)
    }

    /// Modify the named database.
    pub fn modify(name: impl Into<String>) -> Self {
        Self::new(name, Action::Modify)
    }

    /// Create a database migration with an explicit action.
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            allowed: Vec::new(),
        }
    }

    /// Grant a user access when the database is created.
    pub fn allow(mut self, user: DatabaseUser) -> Self {
        self.allowed.push(user);
        self
    }

    async fn apply<B: Backend + ?Sized>(
        &self,
        file_name: &str,
        backend: &B,
        db: &DatabaseHandle,
        materialized: &mut Materialized,
    ) -> MigrateResult<()> {
        match self.action {
            Action::Create => {
                if materialized.contains(file_name) {
                    debug!(migration = %file_name, database = %self.name, "Database already created");
                    return Ok(());
                }
                let handle = backend.create_database(&self.name, &self.allowed).await?;
                materialized.insert(file_name, handle);
            }
            Action::Delete => backend.remove_database(db).await?,
            Action::Modify => {
                debug!(migration = %file_name, database = %self.name, "Database modify has no engine-side effect");
            }
        }
        Ok(())
    }
}

/// Payload of a collection migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMigration {
    /// Collection name.
    pub name: String,
    /// Requested action.
    pub action: Action,
    /// Settings used on create.
    #[serde(default)]
    pub options: CollectionOptions,
}

impl CollectionMigration {
    /// Create the named collection.
    pub fn create(name: impl Into<String>) -> Self {
        Self::new(name, Action::Create)
    }

    /// Drop the named collection.
    pub fn delete(name: impl Into<String>) -> Self {
        Self::new(name, Action::Delete)
    }

    /// Modify the named collection.
    pub fn modify(name: impl Into<String>) -> Self {
        Self::new(name, Action::Modify)
    }

    /// Create a collection migration with an explicit action.
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            options: CollectionOptions::default(),
        }
    }

    /// Set the options used on create.
    pub fn with_options(mut self, options: CollectionOptions) -> Self {
        self.options = options;
        self
    }

    async fn apply<B: Backend + ?Sized>(&self, backend: &B, db: &DatabaseHandle) -> MigrateResult<()> {
        match self.action {
            Action::Create => backend.create_collection(db, &self.name, &self.options).await?,
            Action::Delete => backend.drop_collection(db, &self.name).await?,
            Action::Modify => {
                debug!(collection = %self.name, "Collection modify has no engine-side effect");
            }
        }
        Ok(())
    }
}

/// The variant-specific part of a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MigrationKind {
    /// Database lifecycle.
    Database(DatabaseMigration),
    /// Collection lifecycle.
    Collection(CollectionMigration),
}

impl MigrationKind {
    /// Variant name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Database(_) => "Database",
            Self::Collection(_) => "Collection",
        }
    }

    /// Requested action.
    pub fn action(&self) -> Action {
        match self {
            Self::Database(d) => d.action,
            Self::Collection(c) => c.action,
        }
    }
}

impl From<DatabaseMigration> for MigrationKind {
    fn from(value: DatabaseMigration) -> Self {
        Self::Database(value)
    }
}

impl From<CollectionMigration> for MigrationKind {
    fn from(value: CollectionMigration) -> Self {
        Self::Collection(value)
    }
}

/// A single named unit of schema or data change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    file_name: String,
    #[serde(default)]
    checksum: String,
    #[serde(flatten)]
    kind: MigrationKind,
}

impl Migration {
    /// Create a migration identified by `file_name`.
    pub fn new(file_name: impl Into<String>, kind: impl Into<MigrationKind>) -> Self {
        Self {
            file_name: file_name.into(),
            checksum: String::new(),
            kind: kind.into(),
        }
    }

    /// Set the checksum directly.
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }

    /// Set the checksum from the migration's source content.
    pub fn with_content(self, content: impl AsRef<[u8]>) -> Self {
        let checksum = Self::compute_checksum(content);
        self.with_checksum(checksum)
    }

    /// SHA-256 of the content, hex encoded.
    pub fn compute_checksum(content: impl AsRef<[u8]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_ref());
        hex::encode(hasher.finalize())
    }

    /// Identity of this migration; the ledger key.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Content checksum stored alongside the ledger key.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Variant payload.
    pub fn kind(&self) -> &MigrationKind {
        &self.kind
    }

    /// The database payload, if this migration creates a database.
    pub fn as_database_create(&self) -> Option<&DatabaseMigration> {
        match &self.kind {
            MigrationKind::Database(d) if d.action == Action::Create => Some(d),
            _ => None,
        }
    }

    /// Check if this migration creates or deletes a database.
    ///
    /// These are never written to the ledger: creation is handled by
    /// bootstrap and deletion removes the ledger along with the database.
    pub fn is_database_lifecycle(&self) -> bool {
        matches!(
            &self.kind,
            MigrationKind::Database(d) if matches!(d.action, Action::Create | Action::Delete)
        )
    }

    /// Check if a successful apply is written to the ledger.
    pub fn is_recorded(&self) -> bool {
        !self.is_database_lifecycle()
    }

    /// Apply the migration against the active database.
    pub async fn apply<B: Backend + ?Sized>(
        &self,
        backend: &B,
        db: &DatabaseHandle,
        materialized: &mut Materialized,
    ) -> MigrateResult<()> {
        match &self.kind {
            MigrationKind::Database(d) => d.apply(&self.file_name, backend, db, materialized).await,
            MigrationKind::Collection(c) => c.apply(backend, db).await,
        }
    }
}

/// A forward migration and its optional compensating undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedMigration {
    /// The forward change.
    pub change: Migration,
    /// Applied only when `change` fails with a backend-reported error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo: Option<Migration>,
}

impl PairedMigration {
    /// Pair a change with no undo.
    pub fn new(change: Migration) -> Self {
        Self { change, undo: None }
    }

    /// Attach an undo.
    pub fn with_undo(mut self, undo: Migration) -> Self {
        self.undo = Some(undo);
        self
    }
}

impl From<Migration> for PairedMigration {
    fn from(change: Migration) -> Self {
        Self::new(change)
    }
}

/// Databases created during a run, keyed by the migration that created them.
#[derive(Debug, Default)]
pub struct Materialized {
    handles: HashMap<String, DatabaseHandle>,
}

impl Materialized {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `file_name` produced `handle`.
    pub fn insert(&mut self, file_name: impl Into<String>, handle: DatabaseHandle) {
        self.handles.insert(file_name.into(), handle);
    }

    /// Handle created by `file_name`, if any.
    pub fn get(&self, file_name: &str) -> Option<&DatabaseHandle> {
        self.handles.get(file_name)
    }

    /// Check if `file_name` has already produced a database.
    pub fn contains(&self, file_name: &str) -> bool {
        self.handles.contains_key(file_name)
    }

    /// Number of databases created.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if nothing was created.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
