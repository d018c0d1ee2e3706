//! An in-process [`TableEngine`].
//!
//! Tables live in memory only. Legacy tables are created with
//! [`InMemoryEngine::create_legacy_table`] and have no snapshot history until they are migrated.
//! Every successful write then appends exactly one snapshot, stamped by the engine's [`Clock`].
//! Table contents are kept per snapshot as shared, immutable row batches, so reading an old
//! snapshot never copies more than the rows it streams.
//!
//! Incremental reads follow append-only change tracking: only `append` snapshots inside the range
//! contribute rows. `delete`, `overwrite` and `replace` snapshots are skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::engine::clock::{Clock, SystemClock};
use crate::engine::{MigrateOutcome, TableEngine};
use crate::history::search::{search_by_key_with_bounds, Bound};
use crate::row::{stream_batches, Row, RowStream};
use crate::snapshot::{
    Operation, Snapshot, SnapshotId, ADDED_RECORDS, DELETED_RECORDS, TOTAL_RECORDS,
};
use crate::table::TableIdent;
use crate::table_properties::{
    TableProperties, TableType, FORMAT_VERSION, LOCATION, TABLE_TYPE, TRANSLATED_TO_EXTERNAL,
};
use crate::utils::require;
use crate::{Error, HistoryResult, Timestamp};

const MIGRATED_FORMAT_VERSION: &str = "2";

struct Commit {
    snapshot: Snapshot,
    added: Arc<Vec<Row>>,
    contents: Arc<Vec<Row>>,
}

struct TableData {
    properties: HashMap<String, String>,
    // contents while the table is still in the legacy format
    legacy_rows: Arc<Vec<Row>>,
    commits: Vec<Commit>,
}

impl TableData {
    fn is_snapshot_capable(&self) -> bool {
        TableProperties::from(&self.properties).is_snapshot_capable()
    }

    fn current_contents(&self) -> Arc<Vec<Row>> {
        self.commits
            .last()
            .map(|c| c.contents.clone())
            .unwrap_or_default()
    }

    fn position(&self, table: &TableIdent, id: SnapshotId) -> HistoryResult<usize> {
        self.commits
            .iter()
            .position(|c| c.snapshot.snapshot_id() == id)
            .ok_or_else(|| Error::snapshot_not_found(table, id))
    }
}

struct EngineState {
    tables: HashMap<TableIdent, TableData>,
    next_snapshot_id: i64,
}

impl EngineState {
    fn table(&self, ident: &TableIdent) -> HistoryResult<&TableData> {
        self.tables
            .get(ident)
            .ok_or_else(|| Error::TableNotFound(ident.clone()))
    }

    fn table_mut(&mut self, ident: &TableIdent) -> HistoryResult<&mut TableData> {
        self.tables
            .get_mut(ident)
            .ok_or_else(|| Error::TableNotFound(ident.clone()))
    }

    // Tables that have not been migrated have no snapshots to read: to a snapshot reader they do
    // not exist.
    fn snapshot_table(&self, ident: &TableIdent) -> HistoryResult<&TableData> {
        let table = self.table(ident)?;
        require!(
            table.is_snapshot_capable(),
            Error::TableNotFound(ident.clone())
        );
        Ok(table)
    }

    fn snapshot_table_mut(&mut self, ident: &TableIdent) -> HistoryResult<&mut TableData> {
        let table = self.table_mut(ident)?;
        require!(
            table.is_snapshot_capable(),
            Error::TableNotFound(ident.clone())
        );
        Ok(table)
    }
}

/// A [`TableEngine`] that keeps every table in process memory.
pub struct InMemoryEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<EngineState>,
    available: AtomicBool,
}

impl InMemoryEngine {
    /// Create an engine that stamps commits with the system clock.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let next_snapshot_id = config.first_snapshot_id;
        Self {
            config,
            clock,
            state: RwLock::new(EngineState {
                tables: HashMap::new(),
                next_snapshot_id,
            }),
            available: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Simulate losing (or regaining) the connection to the engine. While unavailable, every call
    /// fails with [`Error::EngineUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Register a table in the legacy format, holding `rows` and no snapshot history. The table is
    /// marked `TRANSLATED_TO_EXTERNAL`, as legacy tables are after a managed-to-external
    /// translation.
    pub fn create_legacy_table(&self, ident: &TableIdent, rows: Vec<Row>) -> HistoryResult<()> {
        let properties = HashMap::from([
            (TABLE_TYPE.to_string(), TableType::Hive.to_string()),
            (TRANSLATED_TO_EXTERNAL.to_string(), "TRUE".to_string()),
            (
                LOCATION.to_string(),
                self.config.table_location(ident)?.to_string(),
            ),
        ]);
        self.create(ident, properties, rows)
    }

    /// Register an empty table in the snapshot-capable format. It has no snapshots until its first
    /// commit.
    pub fn create_table(&self, ident: &TableIdent) -> HistoryResult<()> {
        let properties = HashMap::from([
            (TABLE_TYPE.to_string(), TableType::Iceberg.to_string()),
            (
                FORMAT_VERSION.to_string(),
                MIGRATED_FORMAT_VERSION.to_string(),
            ),
            (
                LOCATION.to_string(),
                self.config.table_location(ident)?.to_string(),
            ),
        ]);
        self.create(ident, properties, vec![])
    }

    fn create(
        &self,
        ident: &TableIdent,
        properties: HashMap<String, String>,
        rows: Vec<Row>,
    ) -> HistoryResult<()> {
        self.check_available(ident)?;
        let mut state = self.state.write();
        require!(
            !state.tables.contains_key(ident),
            Error::generic(format!("Table {ident} already exists"))
        );
        state.tables.insert(
            ident.clone(),
            TableData {
                properties,
                legacy_rows: Arc::new(rows),
                commits: vec![],
            },
        );
        Ok(())
    }

    /// Logically delete every row matching `predicate`, committing a `delete` snapshot.
    #[instrument(name = "memory_engine.delete", skip_all, fields(table = %table), err)]
    pub fn delete_where(
        &self,
        table: &TableIdent,
        predicate: impl Fn(&Row) -> bool,
    ) -> HistoryResult<Snapshot> {
        self.check_available(table)?;
        let mut state = self.state.write();
        let current = state.snapshot_table(table)?.current_contents();
        let (deleted, kept): (Vec<Row>, Vec<Row>) =
            current.iter().cloned().partition(|row| predicate(row));
        let summary = [(DELETED_RECORDS, deleted.len().to_string())];
        self.commit(&mut state, table, Operation::Delete, vec![], kept, summary)
    }

    /// Replace the table's contents with `rows`, committing an `overwrite` snapshot.
    #[instrument(name = "memory_engine.overwrite", skip_all, fields(table = %table), err)]
    pub fn overwrite(&self, table: &TableIdent, rows: Vec<Row>) -> HistoryResult<Snapshot> {
        self.check_available(table)?;
        let mut state = self.state.write();
        let deleted = state.snapshot_table(table)?.current_contents().len();
        let summary = [
            (ADDED_RECORDS, rows.len().to_string()),
            (DELETED_RECORDS, deleted.to_string()),
        ];
        self.commit(
            &mut state,
            table,
            Operation::Overwrite,
            rows.clone(),
            rows,
            summary,
        )
    }

    fn check_available(&self, table: &TableIdent) -> HistoryResult<()> {
        require!(
            self.available.load(Ordering::SeqCst),
            Error::engine_unavailable(table, "in-memory engine is offline")
        );
        Ok(())
    }

    /// Append one snapshot to `table`. The caller holds the write lock, so allocating the id,
    /// stamping the time and swapping the current snapshot happen atomically.
    fn commit<'a>(
        &self,
        state: &mut EngineState,
        table: &TableIdent,
        operation: Operation,
        added: Vec<Row>,
        contents: Vec<Row>,
        summary: impl IntoIterator<Item = (&'a str, String)>,
    ) -> HistoryResult<Snapshot> {
        let snapshot_id = SnapshotId::new(state.next_snapshot_id);
        let data = state.snapshot_table_mut(table)?;
        let parent = data.commits.last().map(|c| &c.snapshot);
        // commit times never run backwards along the chain, even if the clock does
        let timestamp = self
            .clock
            .now_ms()
            .max(parent.map_or(Timestamp::MIN, Snapshot::timestamp_ms));
        let snapshot = Snapshot::new(
            snapshot_id,
            parent.map(Snapshot::snapshot_id),
            timestamp,
            operation,
        )
        .with_summary(summary)
        .with_summary([(TOTAL_RECORDS, contents.len().to_string())]);

        data.commits.push(Commit {
            snapshot: snapshot.clone(),
            added: Arc::new(added),
            contents: Arc::new(contents),
        });
        state.next_snapshot_id += 1;
        info!(
            %table,
            %snapshot_id,
            %operation,
            timestamp,
            "committed snapshot"
        );
        Ok(snapshot)
    }
}

impl TableEngine for InMemoryEngine {
    #[instrument(name = "memory_engine.migrate", skip_all, fields(table = %table), err)]
    fn migrate(&self, table: &TableIdent) -> HistoryResult<MigrateOutcome> {
        self.check_available(table)?;
        let mut state = self.state.write();
        let data = state.table_mut(table)?;
        let props = TableProperties::from(&data.properties);
        require!(
            !props.is_snapshot_capable(),
            Error::AlreadyMigrated(table.clone())
        );
        require!(
            !props.is_translated_to_external(),
            Error::MigrationRejected {
                table: table.clone(),
                reason: format!("table property {TRANSLATED_TO_EXTERNAL} is set"),
            }
        );

        data.properties
            .insert(TABLE_TYPE.to_string(), TableType::Iceberg.to_string());
        data.properties.insert(
            FORMAT_VERSION.to_string(),
            MIGRATED_FORMAT_VERSION.to_string(),
        );
        let rows = std::mem::take(&mut data.legacy_rows);
        let rows = Arc::unwrap_or_clone(rows);
        let summary = [(ADDED_RECORDS, rows.len().to_string())];
        self.commit(
            &mut state,
            table,
            Operation::Append,
            rows.clone(),
            rows,
            summary,
        )?;
        Ok(MigrateOutcome::Migrated)
    }

    fn list_snapshots(&self, table: &TableIdent) -> HistoryResult<Vec<Snapshot>> {
        self.check_available(table)?;
        let state = self.state.read();
        let data = state.snapshot_table(table)?;
        Ok(data.commits.iter().map(|c| c.snapshot.clone()).collect())
    }

    #[instrument(name = "memory_engine.append", skip_all, fields(table = %table), err)]
    fn append(&self, table: &TableIdent, rows: Vec<Row>) -> HistoryResult<Snapshot> {
        self.check_available(table)?;
        let mut state = self.state.write();
        let current = state.snapshot_table(table)?.current_contents();
        let mut contents = Vec::with_capacity(current.len() + rows.len());
        contents.extend(current.iter().cloned());
        contents.extend(rows.iter().cloned());
        let summary = [(ADDED_RECORDS, rows.len().to_string())];
        self.commit(
            &mut state,
            table,
            Operation::Append,
            rows,
            contents,
            summary,
        )
    }

    fn read_as_of(&self, table: &TableIdent, timestamp: Timestamp) -> HistoryResult<RowStream> {
        self.check_available(table)?;
        let state = self.state.read();
        let data = state.snapshot_table(table)?;
        let idx = search_by_key_with_bounds(
            &data.commits,
            timestamp,
            |c| c.snapshot.timestamp_ms(),
            Bound::GreatestLower,
        );
        match idx {
            Some(idx) => Ok(stream_batches(vec![data.commits[idx].contents.clone()])),
            None => Err(match data.commits.first() {
                Some(first) => Error::NoSnapshotBeforeTime {
                    table: table.clone(),
                    timestamp,
                    earliest: first.snapshot.timestamp_ms(),
                },
                None => Error::EmptyHistory(table.clone()),
            }),
        }
    }

    fn read_snapshot(
        &self,
        table: &TableIdent,
        snapshot_id: SnapshotId,
    ) -> HistoryResult<RowStream> {
        self.check_available(table)?;
        let state = self.state.read();
        let data = state.snapshot_table(table)?;
        let idx = data.position(table, snapshot_id)?;
        Ok(stream_batches(vec![data.commits[idx].contents.clone()]))
    }

    #[instrument(
        name = "memory_engine.read_incremental",
        skip_all,
        fields(table = %table, start = ?start, end = %end),
        err
    )]
    fn read_incremental(
        &self,
        table: &TableIdent,
        start: Option<SnapshotId>,
        end: SnapshotId,
    ) -> HistoryResult<RowStream> {
        self.check_available(table)?;
        let state = self.state.read();
        let data = state.snapshot_table(table)?;
        let from = match start {
            Some(start) => data.position(table, start)? + 1,
            None => 0,
        };
        let to = data.position(table, end)?;
        if let Some(start) = start {
            require!(
                from <= to + 1,
                Error::InvalidSnapshotRange {
                    table: table.clone(),
                    start,
                    end,
                }
            );
        }

        let batches = data.commits[from..=to]
            .iter()
            .filter(|c| {
                let is_append = c.snapshot.operation() == Operation::Append;
                if !is_append {
                    debug!(
                        snapshot_id = %c.snapshot.snapshot_id(),
                        operation = %c.snapshot.operation(),
                        "skipping non-append snapshot in incremental read"
                    );
                }
                is_append
            })
            .map(|c| c.added.clone())
            .collect();
        Ok(stream_batches(batches))
    }

    fn table_properties(&self, table: &TableIdent) -> HistoryResult<HashMap<String, String>> {
        self.check_available(table)?;
        Ok(self.state.read().table(table)?.properties.clone())
    }

    fn unset_table_property(&self, table: &TableIdent, key: &str) -> HistoryResult<()> {
        self.check_available(table)?;
        let mut state = self.state.write();
        if state.table_mut(table)?.properties.remove(key).is_some() {
            info!(%table, key, "unset table property");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::table::count_rows;
    use crate::utils::test_utils::test_table;

    fn rows(ids: impl IntoIterator<Item = i64>) -> Vec<Row> {
        ids.into_iter().map(|id| Row::new().with("id", id)).collect()
    }

    fn ids(stream: RowStream) -> Vec<i64> {
        stream
            .map(|row| match row.unwrap().get("id") {
                Some(crate::Scalar::Long(id)) => *id,
                other => panic!("unexpected id {other:?}"),
            })
            .collect()
    }

    // legacy table with rows 1..=3, migrated at t=1000 (snapshot 100), then appends at t=2000
    // (101, rows 4..=5) and t=3000 (102, row 6)
    fn engine_with_history() -> (InMemoryEngine, Arc<ManualClock>) {
        let config = EngineConfig::builder("tester", "bucket")
            .first_snapshot_id(100)
            .build()
            .unwrap();
        let clock = Arc::new(ManualClock::new(1000));
        let engine = InMemoryEngine::with_clock(config, clock.clone());
        let table = test_table();
        engine.create_legacy_table(&table, rows(1..=3)).unwrap();
        engine
            .unset_table_property(&table, TRANSLATED_TO_EXTERNAL)
            .unwrap();
        assert_eq!(engine.migrate(&table).unwrap(), MigrateOutcome::Migrated);
        clock.set(2000);
        engine.append(&table, rows(4..=5)).unwrap();
        clock.set(3000);
        engine.append(&table, rows([6])).unwrap();
        (engine, clock)
    }

    #[test]
    fn legacy_tables_have_no_history() {
        let engine = InMemoryEngine::new(EngineConfig::new("tester", "bucket").unwrap());
        let table = test_table();
        engine.create_legacy_table(&table, rows(1..=3)).unwrap();
        assert!(matches!(
            engine.list_snapshots(&table),
            Err(Error::TableNotFound(_))
        ));
        let props = TableProperties::from(engine.table_properties(&table).unwrap());
        assert!(!props.is_snapshot_capable());
        assert_eq!(
            props.location.unwrap().as_str(),
            "s3a://bucket/test_db/events/"
        );
    }

    #[test]
    fn migrate_requires_translated_flag_to_be_unset() {
        let engine = InMemoryEngine::new(EngineConfig::new("tester", "bucket").unwrap());
        let table = test_table();
        engine.create_legacy_table(&table, rows(1..=3)).unwrap();
        assert!(matches!(
            engine.migrate(&table),
            Err(Error::MigrationRejected { .. })
        ));
    }

    #[test]
    fn migrate_commits_existing_rows_once() {
        let (engine, _) = engine_with_history();
        let table = test_table();
        let snapshots = engine.list_snapshots(&table).unwrap();
        let first = &snapshots[0];
        assert_eq!(first.snapshot_id(), SnapshotId::new(100));
        assert_eq!(first.parent_id(), None);
        assert_eq!(first.operation(), Operation::Append);
        assert_eq!(first.added_records(), Some(3));
        assert!(matches!(
            engine.migrate(&table),
            Err(Error::AlreadyMigrated(_))
        ));
    }

    #[test]
    fn commits_form_a_parent_linked_chain() {
        let (engine, _) = engine_with_history();
        let snapshots = engine.list_snapshots(&test_table()).unwrap();
        let summary: Vec<_> = snapshots
            .iter()
            .map(|s| {
                (
                    s.snapshot_id().as_i64(),
                    s.parent_id().map(|p| p.as_i64()),
                    s.timestamp_ms(),
                    s.total_records(),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                (100, None, 1000, Some(3)),
                (101, Some(100), 2000, Some(5)),
                (102, Some(101), 3000, Some(6)),
            ]
        );
    }

    #[test]
    fn commit_time_never_precedes_parent() {
        let (engine, clock) = engine_with_history();
        clock.set(10);
        let snapshot = engine.append(&test_table(), rows([7])).unwrap();
        assert_eq!(snapshot.timestamp_ms(), 3000);
    }

    #[test]
    fn read_as_of_and_snapshot() {
        let (engine, _) = engine_with_history();
        let table = test_table();
        assert_eq!(ids(engine.read_as_of(&table, 2500).unwrap()), vec![1, 2, 3, 4, 5]);
        assert_eq!(ids(engine.read_as_of(&table, 3000).unwrap()), (1..=6).collect::<Vec<_>>());
        assert!(matches!(
            engine.read_as_of(&table, 999),
            Err(Error::NoSnapshotBeforeTime { earliest: 1000, .. })
        ));
        assert_eq!(
            ids(engine.read_snapshot(&table, SnapshotId::new(100)).unwrap()),
            vec![1, 2, 3]
        );
        assert!(matches!(
            engine.read_snapshot(&table, SnapshotId::new(7)),
            Err(Error::SnapshotNotFound { .. })
        ));
    }

    #[test]
    fn incremental_reads_only_see_appended_rows() {
        let (engine, _) = engine_with_history();
        let table = test_table();
        let read = |start: Option<i64>, end: i64| {
            ids(engine
                .read_incremental(&table, start.map(SnapshotId::new), SnapshotId::new(end))
                .unwrap())
        };
        assert_eq!(read(Some(100), 102), vec![4, 5, 6]);
        assert_eq!(read(Some(101), 102), vec![6]);
        assert_eq!(read(None, 101), vec![1, 2, 3, 4, 5]);
        assert_eq!(read(Some(102), 102), Vec::<i64>::new());

        let deleted = engine
            .delete_where(&table, |row| row.get("id") == Some(&crate::Scalar::Long(1)))
            .unwrap();
        assert_eq!(deleted.deleted_records(), Some(1));
        engine.append(&table, rows([8])).unwrap();
        assert_eq!(read(Some(102), 104), vec![8]);
        assert_eq!(count_rows(engine.read_snapshot(&table, SnapshotId::new(104)).unwrap()).unwrap(), 6);
    }

    #[test]
    fn overwrite_replaces_contents() {
        let (engine, _) = engine_with_history();
        let table = test_table();
        let snapshot = engine.overwrite(&table, rows([42])).unwrap();
        assert_eq!(snapshot.operation(), Operation::Overwrite);
        assert_eq!(snapshot.deleted_records(), Some(6));
        assert_eq!(
            ids(engine.read_snapshot(&table, snapshot.snapshot_id()).unwrap()),
            vec![42]
        );
    }

    #[test]
    fn offline_engine_fails_every_call() {
        let (engine, _) = engine_with_history();
        let table = test_table();
        engine.set_available(false);
        let err = engine.list_snapshots(&table).unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            engine.append(&table, rows([9])),
            Err(Error::EngineUnavailable { .. })
        ));
        engine.set_available(true);
        assert_eq!(engine.list_snapshots(&table).unwrap().len(), 3);
    }

    #[test]
    fn unknown_tables_are_not_found() {
        let (engine, _) = engine_with_history();
        let missing = TableIdent::try_new("test_db", "missing").unwrap();
        assert!(matches!(
            engine.migrate(&missing),
            Err(Error::TableNotFound(_))
        ));
        assert!(matches!(
            engine.table_properties(&missing),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn create_table_starts_with_empty_history() {
        let engine = InMemoryEngine::new(EngineConfig::new("tester", "bucket").unwrap());
        let table = test_table();
        engine.create_table(&table).unwrap();
        assert!(engine.list_snapshots(&table).unwrap().is_empty());
        assert!(matches!(
            engine.read_as_of(&table, 0),
            Err(Error::EmptyHistory(_))
        ));
        assert!(engine.create_table(&table).is_err());
    }
}
