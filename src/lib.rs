//! # Cairn
//!
//! Ledger-tracked schema migrations for document databases.
//!
//! Cairn provides:
//! - An ordered catalog of migrations, each paired with an optional undo
//! - A ledger collection so a completed migration never runs twice
//! - Automatic compensation when the database rejects a migration
//! - Creation of the target database on first run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cairn::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MigrationError> {
//!     let catalog = vec![
//!         Migration::new("0001_shop", DatabaseMigration::create("shop")).into(),
//!         Migration::new("0002_orders", CollectionMigration::create("orders")).into(),
//!     ];
//!
//!     let engine = MigrationEngine::new(MigratorConfig::new("shop"), MemoryBackend::new());
//!     let report = engine.run(&catalog).await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Migration engine, backends and ledger.
pub mod migrate {
    pub use cairn_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        Action, Backend, BackendError, CancellationToken, CollectionMigration, CollectionOptions,
        DatabaseHandle, DatabaseMigration, DatabaseUser, MemoryBackend, Migration,
        MigrationEngine, MigrationError, MigrationReport, MigratorConfig, PairedMigration,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrateResult, MigrationEngine, MigrationError};
