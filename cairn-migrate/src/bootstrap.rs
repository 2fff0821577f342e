//! Resolving the target database before any ledger access.
//!
//! The ledger lives inside the target database, so the database has to
//! exist before the engine can tell which migrations already ran. When it
//! is missing, the first catalog entry must be the migration that creates
//! it; bootstrap runs that creation up front and marks it materialized so
//! the engine later re-evaluates it as a no-op.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::backend::{Backend, DatabaseHandle};
use crate::config::MigratorConfig;
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::Ledger;
use crate::migration::{Materialized, PairedMigration};

/// Outcome of bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    /// Handle to the target database.
    pub database: DatabaseHandle,
    /// Index of the first catalog entry the engine should process.
    pub start: usize,
    /// Whether bootstrap created the target database.
    pub created_database: bool,
    /// Whether bootstrap created the ledger collection.
    pub created_ledger: bool,
}

/// Reject catalogs that reuse a file name. Makes no backend calls.
pub fn check_catalog(catalog: &[PairedMigration]) -> MigrateResult<()> {
    let mut seen = HashSet::with_capacity(catalog.len());
    for paired in catalog {
        let file_name = paired.change.file_name();
        if file_name.is_empty() {
            return Err(MigrationError::config("migration with an empty file name"));
        }
        if !seen.insert(file_name) {
            return Err(MigrationError::config(format!(
                "migration '{}' appears more than once in the catalog",
                file_name
            )));
        }
    }
    Ok(())
}

/// Open or create the target database and make sure the ledger exists.
pub async fn resolve<B: Backend + ?Sized>(
    backend: &B,
    config: &MigratorConfig,
    catalog: &[PairedMigration],
    materialized: &mut Materialized,
) -> MigrateResult<Bootstrap> {
    let name = config.database.as_str();

    let (database, start, created_database) = match backend.open_database(name).await {
        Ok(database) => {
            let start = match catalog.first() {
                Some(first) if first.change.as_database_create().is_some() => {
                    debug!(
                        migration = %first.change.file_name(),
                        database = %name,
                        "Database exists, skipping its create migration"
                    );
                    1
                }
                _ => 0,
            };
            (database, start, false)
        }
        Err(e) if e.is_not_found() => {
            let first = catalog.first().ok_or_else(|| {
                MigrationError::config(format!(
                    "database '{}' does not exist and the catalog is empty",
                    name
                ))
            })?;

            let create = first.change.as_database_create().ok_or_else(|| {
                MigrationError::config(format!(
                    "database '{}' does not exist and the first migration '{}' does not create it",
                    name,
                    first.change.file_name()
                ))
            })?;

            if create.name != name {
                return Err(MigrationError::config(format!(
                    "configured database '{}' does not match '{}' created by migration '{}'",
                    name,
                    create.name,
                    first.change.file_name()
                )));
            }

            let database = backend.create_database(&create.name, &create.allowed).await?;
            materialized.insert(first.change.file_name(), database.clone());
            info!(database = %name, users = create.allowed.len(), "Created target database");
            (database, 0, true)
        }
        Err(e) => return Err(e.into()),
    };

    let created_ledger = Ledger::new(backend, &database, &config.ledger_collection)
        .ensure()
        .await?;

    Ok(Bootstrap {
        database,
        start,
        created_database,
        created_ledger,
    })
}
