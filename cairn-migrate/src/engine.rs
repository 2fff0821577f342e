//! Migration engine implementation.

use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, DatabaseHandle};
use crate::bootstrap;
use crate::config::MigratorConfig;
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::Ledger;
use crate::migration::{Materialized, PairedMigration};

/// What happened to a single paired migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Already in the ledger; nothing ran.
    Skipped,
    /// Applied; not eligible for recording.
    Applied,
    /// Applied and written to the ledger.
    Recorded,
    /// Failed, then compensated by its undo. Not recorded.
    RolledBack,
}

/// Result of a migration run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
    /// Whether the target database was created by this run.
    pub bootstrapped: bool,
    /// File names of migrations applied successfully, in order.
    pub applied: Vec<String>,
    /// Subset of `applied` written to the ledger.
    pub recorded: Vec<String>,
    /// File names skipped because the ledger already had them.
    pub skipped: Vec<String>,
    /// File names whose undo ran after a failed apply.
    pub rolled_back: Vec<String>,
}

impl MigrationReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            duration_ms: 0,
            bootstrapped: false,
            applied: Vec::new(),
            recorded: Vec::new(),
            skipped: Vec::new(),
            rolled_back: Vec::new(),
        }
    }

    fn push(&mut self, file_name: &str, outcome: StepOutcome) {
        let file_name = file_name.to_string();
        match outcome {
            StepOutcome::Skipped => self.skipped.push(file_name),
            StepOutcome::Applied => self.applied.push(file_name),
            StepOutcome::Recorded => {
                self.recorded.push(file_name.clone());
                self.applied.push(file_name);
            }
            StepOutcome::RolledBack => self.rolled_back.push(file_name),
        }
    }

    /// Check if the run changed anything on the target.
    pub fn has_changes(&self) -> bool {
        self.bootstrapped || !self.applied.is_empty() || !self.rolled_back.is_empty()
    }

    /// Get a summary of the run.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if self.bootstrapped {
            parts.push("database created".to_string());
        }

        if !self.applied.is_empty() {
            parts.push(format!(
                "{} applied ({} recorded)",
                self.applied.len(),
                self.recorded.len()
            ));
        }

        if !self.rolled_back.is_empty() {
            parts.push(format!("{} rolled back", self.rolled_back.len()));
        }

        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }

        if parts.is_empty() {
            "No migrations applied".to_string()
        } else {
            format!("{} in {}ms", parts.join(", "), self.duration_ms)
        }
    }
}

/// Applies a catalog of paired migrations to one target database.
///
/// Migrations run strictly in catalog order, one at a time. Each is checked
/// against the ledger first; a recorded migration is skipped. A migration
/// that fails with a backend-reported error and has an undo is compensated
/// and the run continues; any other failure aborts the run, leaving earlier
/// ledger rows in place.
pub struct MigrationEngine<B: Backend> {
    config: MigratorConfig,
    backend: B,
    cancel: Option<CancellationToken>,
}

impl<B: Backend> MigrationEngine<B> {
    /// Create a new migration engine.
    pub fn new(config: MigratorConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            cancel: None,
        }
    }

    /// Abort in-flight work when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Get the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bootstrap the target and apply every pending migration in `catalog`.
    pub async fn run(&self, catalog: &[PairedMigration]) -> MigrateResult<MigrationReport> {
        let start = Instant::now();
        let mut report = MigrationReport::new();

        self.config.validate()?;
        bootstrap::check_catalog(catalog)?;

        info!(
            database = %self.config.database,
            migrations = catalog.len(),
            "Starting migration run"
        );

        let mut materialized = Materialized::new();
        let boot = self
            .guard(bootstrap::resolve(
                &self.backend,
                &self.config,
                catalog,
                &mut materialized,
            ))
            .await?;
        report.bootstrapped = boot.created_database;

        let ledger = Ledger::new(&self.backend, &boot.database, &self.config.ledger_collection);

        for paired in &catalog[boot.start..] {
            let file_name = paired.change.file_name();
            match self
                .step(&ledger, &boot.database, paired, &mut materialized)
                .await
            {
                Ok(outcome) => report.push(file_name, outcome),
                Err(e) => {
                    error!(
                        migration = %file_name,
                        error = %e,
                        applied = report.applied.len(),
                        "Migration run aborted"
                    );
                    return Err(e);
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as i64;
        info!(summary = %report.summary(), "Migration run complete");
        Ok(report)
    }

    /// Process one paired migration.
    async fn step(
        &self,
        ledger: &Ledger<'_, B>,
        db: &DatabaseHandle,
        paired: &PairedMigration,
        materialized: &mut Materialized,
    ) -> MigrateResult<StepOutcome> {
        let change = &paired.change;
        let file_name = change.file_name();

        if self.guard(ledger.exists(file_name)).await? {
            debug!(migration = %file_name, "Already applied");
            return Ok(StepOutcome::Skipped);
        }

        let err = match self
            .guard(change.apply(&self.backend, db, materialized))
            .await
        {
            Ok(()) if change.is_recorded() => {
                self.guard(ledger.append(file_name, change.checksum()))
                    .await?;
                info!(migration = %file_name, kind = change.kind().name(), "Applied migration");
                return Ok(StepOutcome::Recorded);
            }
            Ok(()) => {
                info!(
                    migration = %file_name,
                    kind = change.kind().name(),
                    "Applied migration (not recorded)"
                );
                return Ok(StepOutcome::Applied);
            }
            Err(err) => err,
        };

        let (undo, cause) = match (&paired.undo, err) {
            (Some(undo), MigrationError::Backend(cause)) if cause.is_remote() => (undo, cause),
            (_, err) => return Err(err),
        };

        warn!(
            migration = %file_name,
            undo = %undo.file_name(),
            error = %cause,
            "Migration failed, applying undo"
        );

        match self.guard(undo.apply(&self.backend, db, materialized)).await {
            Ok(()) => Ok(StepOutcome::RolledBack),
            Err(MigrationError::Cancelled) => Err(MigrationError::Cancelled),
            Err(source) => Err(MigrationError::Undo {
                migration: file_name.to_string(),
                cause,
                source: Box::new(source),
            }),
        }
    }

    /// Race `fut` against the cancellation token, if one is set.
    async fn guard<T>(&self, fut: impl Future<Output = MigrateResult<T>>) -> MigrateResult<T> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(MigrationError::Cancelled),
                result = fut => result,
            },
            None => fut.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::migration::{CollectionMigration, DatabaseMigration, Migration};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_empty() {
        let report = MigrationReport::new();
        assert!(!report.has_changes());
        assert_eq!(report.summary(), "No migrations applied");
    }

    #[test]
    fn test_report_summary() {
        let mut report = MigrationReport::new();
        report.bootstrapped = true;
        report.push("0001_shop", StepOutcome::Applied);
        report.push("0002_orders", StepOutcome::Recorded);
        report.push("0003_items", StepOutcome::RolledBack);
        report.push("0004_users", StepOutcome::Skipped);
        report.duration_ms = 12;

        assert!(report.has_changes());
        assert_eq!(report.applied, vec!["0001_shop", "0002_orders"]);
        assert_eq!(report.recorded, vec!["0002_orders"]);
        assert_eq!(
            report.summary(),
            "database created, 2 applied (1 recorded), 1 rolled back, 1 skipped in 12ms"
        );
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_backend() {
        let backend = MemoryBackend::new();
        let engine = MigrationEngine::new(MigratorConfig::new(""), backend.clone());

        let err = engine.run(&[]).await.unwrap_err();
        assert!(err.is_config_error());
        assert!(backend.journal().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_catalog_entries_fail_before_backend() {
        let backend = MemoryBackend::new();
        let engine = MigrationEngine::new(MigratorConfig::new("shop"), backend.clone());
        let orders = PairedMigration::new(Migration::new(
            "0002_orders",
            CollectionMigration::create("orders"),
        ));

        let err = engine.run(&[orders.clone(), orders]).await.unwrap_err();
        assert!(err.is_config_error());
        assert!(backend.journal().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let backend = MemoryBackend::new();
        let token = CancellationToken::new();
        token.cancel();

        let engine = MigrationEngine::new(MigratorConfig::new("shop"), backend.clone())
            .with_cancellation(token);
        let catalog = vec![PairedMigration::new(Migration::new(
            "0001_shop",
            DatabaseMigration::create("shop"),
        ))];

        let err = engine.run(&catalog).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(backend.journal().is_empty());
        assert!(!backend.has_database("shop"));
    }

    #[tokio::test]
    async fn test_uncancelled_token_runs_normally() {
        let backend = MemoryBackend::new();
        let engine = MigrationEngine::new(MigratorConfig::new("shop"), backend.clone())
            .with_cancellation(CancellationToken::new());
        let catalog = vec![PairedMigration::new(Migration::new(
            "0001_shop",
            DatabaseMigration::create("shop"),
        ))];

        let report = engine.run(&catalog).await.unwrap();
        assert!(report.bootstrapped);
        assert_eq!(report.applied, vec!["0001_shop"]);
        assert!(report.recorded.is_empty());
    }
}
