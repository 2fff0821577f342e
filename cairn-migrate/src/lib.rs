//! # cairn-migrate
//!
//! Migration engine for document databases.
//!
//! This crate provides:
//! - Ordered application of user-authored migrations against a target database
//! - A ledger collection that makes re-runs skip completed migrations
//! - Automatic compensation through an optional per-migration undo
//! - Bootstrap of the target database when it does not exist yet
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────────┐
//! │   Catalog    │────▶│   Bootstrap    │────▶│ Migration Engine │
//! └──────────────┘     └────────────────┘     └──────────────────┘
//!                              │                  │          │
//!                              ▼                  ▼          ▼
//!                      ┌────────────────┐   ┌──────────┐ ┌─────────┐
//!                      │    Backend     │◀──│ Variants │ │ Ledger  │
//!                      └────────────────┘   └──────────┘ └─────────┘
//! ```
//!
//! The engine talks to the database only through the [`Backend`] trait.
//! [`MemoryBackend`] implements it in process.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cairn_migrate::{
//!     CollectionMigration, DatabaseMigration, MemoryBackend, Migration, MigrationEngine,
//!     MigratorConfig, PairedMigration,
//! };
//!
//! async fn run() -> Result<(), cairn_migrate::MigrationError> {
//!     let catalog = vec![
//!         PairedMigration::new(Migration::new("0001_shop", DatabaseMigration::create("shop"))),
//!         PairedMigration::new(Migration::new("0002_orders", CollectionMigration::create("orders")))
//!             .with_undo(Migration::new("0002_orders_undo", CollectionMigration::delete("orders"))),
//!     ];
//!
//!     let engine = MigrationEngine::new(MigratorConfig::new("shop"), MemoryBackend::new());
//!     let report = engine.run(&catalog).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Recording policy
//!
//! A successful migration is written to the ledger unless it creates or
//! deletes a database. Database creation is covered by bootstrap, and a
//! deleted database takes its ledger with it.

pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod migration;

// Re-exports
pub use backend::{
    Backend, BackendError, BackendResult, CollectionKind, CollectionOptions, DatabaseHandle,
    DatabaseUser, MemoryBackend, Operation, ProvisionedUser,
};
pub use bootstrap::Bootstrap;
pub use config::{DEFAULT_LEDGER_COLLECTION, MigratorConfig};
pub use engine::{MigrationEngine, MigrationReport, StepOutcome};
pub use error::{MigrateResult, MigrationError};
pub use ledger::{Ledger, LedgerRecord};
pub use migration::{
    Action, CollectionMigration, DatabaseMigration, Materialized, Migration, MigrationKind,
    PairedMigration,
};
pub use tokio_util::sync::CancellationToken;
