//! Converts legacy tables to the snapshot-capable format.
//!
//! Migration is idempotent: migrating a table that is already in the snapshot-capable format is an
//! expected outcome, reported as [`MigrationResult::already_migrated`] rather than as an error.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::engine::{MigrateOutcome, TableEngine};
use crate::table::TableIdent;
use crate::table_properties::{TableProperties, TRANSLATED_TO_EXTERNAL};
use crate::{Error, HistoryResult};

/// What a call to [`MigrationOrchestrator::migrate`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    pub table: TableIdent,
    /// `true` if the table was already in the snapshot-capable format and nothing changed.
    pub already_migrated: bool,
}

#[derive(Clone)]
pub struct MigrationOrchestrator {
    engine: Arc<dyn TableEngine>,
}

impl MigrationOrchestrator {
    pub fn new(engine: Arc<dyn TableEngine>) -> Self {
        Self { engine }
    }

    /// Migrate `table` in place.
    ///
    /// The engine refuses to migrate a table still marked `TRANSLATED_TO_EXTERNAL`, so that
    /// property is removed first.
    ///
    /// # Errors
    /// [`Error::TableNotFound`], [`Error::EngineUnavailable`] and [`Error::MigrationRejected`]
    /// propagate. [`Error::AlreadyMigrated`] never does.
    #[instrument(name = "migration.migrate", skip_all, fields(table = %table), err)]
    pub fn migrate(&self, table: &TableIdent) -> HistoryResult<MigrationResult> {
        let props = TableProperties::from(self.engine.table_properties(table)?);
        if props.is_snapshot_capable() {
            info!("table is already migrated");
            return Ok(self.already_migrated(table));
        }

        self.engine
            .unset_table_property(table, TRANSLATED_TO_EXTERNAL)?;
        match self.engine.migrate(table) {
            Ok(MigrateOutcome::Migrated) => {
                info!("migrated table to the snapshot-capable format");
                Ok(MigrationResult {
                    table: table.clone(),
                    already_migrated: false,
                })
            }
            Ok(MigrateOutcome::AlreadyMigrated) | Err(Error::AlreadyMigrated(_)) => {
                info!("table was migrated concurrently");
                Ok(self.already_migrated(table))
            }
            Err(err) => Err(err),
        }
    }

    /// Migrate each table in order, stopping at the first table that fails.
    pub fn migrate_all<'a>(
        &self,
        tables: impl IntoIterator<Item = &'a TableIdent>,
    ) -> HistoryResult<Vec<MigrationResult>> {
        tables
            .into_iter()
            .map(|table| self.migrate(table))
            .collect()
    }

    fn already_migrated(&self, table: &TableIdent) -> MigrationResult {
        MigrationResult {
            table: table.clone(),
            already_migrated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::memory::InMemoryEngine;
    use crate::row::{Row, RowStream};
    use crate::snapshot::{Snapshot, SnapshotId};
    use crate::utils::test_utils::test_table;
    use crate::Timestamp;

    fn engine() -> Arc<InMemoryEngine> {
        let engine = InMemoryEngine::new(EngineConfig::new("tester", "bucket").unwrap());
        engine
            .create_legacy_table(&test_table(), vec![Row::new().with("id", 1)])
            .unwrap();
        Arc::new(engine)
    }

    #[test]
    fn migrate_twice_reports_already_migrated() {
        let engine = engine();
        let orchestrator = MigrationOrchestrator::new(engine.clone());
        let first = orchestrator.migrate(&test_table()).unwrap();
        assert!(!first.already_migrated);
        assert_eq!(engine.list_snapshots(&test_table()).unwrap().len(), 1);

        let second = orchestrator.migrate(&test_table()).unwrap();
        assert!(second.already_migrated);
        assert_eq!(engine.list_snapshots(&test_table()).unwrap().len(), 1);
    }

    #[test]
    fn translated_flag_is_removed_before_migrating() {
        let engine = engine();
        MigrationOrchestrator::new(engine.clone())
            .migrate(&test_table())
            .unwrap();
        let props = engine.table_properties(&test_table()).unwrap();
        assert!(!props.contains_key(TRANSLATED_TO_EXTERNAL));
        assert!(TableProperties::from(props).is_snapshot_capable());
    }

    #[test]
    fn missing_table_and_unavailable_engine_propagate() {
        let engine = engine();
        let orchestrator = MigrationOrchestrator::new(engine.clone());
        let missing = TableIdent::try_new("test_db", "missing").unwrap();
        assert!(matches!(
            orchestrator.migrate(&missing),
            Err(Error::TableNotFound(_))
        ));

        engine.set_available(false);
        let err = orchestrator.migrate(&test_table()).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn migrate_all_stops_at_first_failure() {
        let engine = engine();
        let other = TableIdent::try_new("test_db", "other").unwrap();
        engine.create_legacy_table(&other, vec![]).unwrap();
        let orchestrator = MigrationOrchestrator::new(engine.clone());

        let results = orchestrator.migrate_all([&test_table(), &other]).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.already_migrated));

        let missing = TableIdent::try_new("test_db", "missing").unwrap();
        assert!(orchestrator
            .migrate_all([&test_table(), &missing, &other])
            .is_err());
    }

    // An engine whose catalog lags behind: properties report a legacy table, but the migration
    // call finds it already converted.
    struct StaleCatalogEngine {
        outcome: fn(&TableIdent) -> HistoryResult<MigrateOutcome>,
    }

    impl TableEngine for StaleCatalogEngine {
        fn migrate(&self, table: &TableIdent) -> HistoryResult<MigrateOutcome> {
            (self.outcome)(table)
        }
        fn list_snapshots(&self, _: &TableIdent) -> HistoryResult<Vec<Snapshot>> {
            unimplemented!()
        }
        fn append(&self, _: &TableIdent, _: Vec<Row>) -> HistoryResult<Snapshot> {
            unimplemented!()
        }
        fn read_as_of(&self, _: &TableIdent, _: Timestamp) -> HistoryResult<RowStream> {
            unimplemented!()
        }
        fn read_snapshot(&self, _: &TableIdent, _: SnapshotId) -> HistoryResult<RowStream> {
            unimplemented!()
        }
        fn read_incremental(
            &self,
            _: &TableIdent,
            _: Option<SnapshotId>,
            _: SnapshotId,
        ) -> HistoryResult<RowStream> {
            unimplemented!()
        }
        fn table_properties(&self, _: &TableIdent) -> HistoryResult<HashMap<String, String>> {
            Ok(HashMap::new())
        }
        fn unset_table_property(&self, _: &TableIdent, _: &str) -> HistoryResult<()> {
            Ok(())
        }
    }

    #[test]
    fn engine_already_migrated_answers_are_not_errors() {
        let answers: [fn(&TableIdent) -> HistoryResult<MigrateOutcome>; 2] = [
            |_| Ok(MigrateOutcome::AlreadyMigrated),
            |table| Err(Error::AlreadyMigrated(table.clone())),
        ];
        for outcome in answers {
            let orchestrator = MigrationOrchestrator::new(Arc::new(StaleCatalogEngine { outcome }));
            let result = orchestrator.migrate(&test_table()).unwrap();
            assert!(result.already_migrated);
            assert_eq!(result.table, test_table());
        }
    }

    #[test]
    fn rejected_migration_propagates() {
        let orchestrator = MigrationOrchestrator::new(Arc::new(StaleCatalogEngine {
            outcome: |table| {
                Err(Error::MigrationRejected {
                    table: table.clone(),
                    reason: "unsupported file format".to_string(),
                })
            },
        }));
        assert!(matches!(
            orchestrator.migrate(&test_table()),
            Err(Error::MigrationRejected { .. })
        ));
    }
}
