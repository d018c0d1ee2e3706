//! Table identifiers and the [`Table`] entry point.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::HistoryCatalog;
use crate::engine::TableEngine;
use crate::history::History;
use crate::incremental::{ChangeSet, IncrementalReader};
use crate::migration::{MigrationOrchestrator, MigrationResult};
use crate::resolver;
use crate::row::{Row, RowStream};
use crate::snapshot::{Snapshot, SnapshotId};
use crate::time_travel::TimeTravelReader;
use crate::utils::require;
use crate::{Error, HistoryResult, Timestamp};

/// Identifies a table by namespace (database) and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableIdent {
    namespace: String,
    name: String,
}

impl TableIdent {
    pub fn try_new(namespace: impl Into<String>, name: impl Into<String>) -> HistoryResult<Self> {
        let namespace = namespace.into();
        let name = name.into();
        let valid_part = |part: &str| !part.is_empty() && !part.chars().any(char::is_whitespace);
        require!(
            valid_part(&namespace) && valid_part(&name) && !name.contains('.'),
            Error::InvalidTableIdent(format!("{namespace}.{name}"))
        );
        Ok(Self { namespace, name })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for TableIdent {
    type Err = Error;

    /// Parses `namespace.name`. The namespace may itself be dotted (`catalog.db.table`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = s
            .trim()
            .rsplit_once('.')
            .ok_or_else(|| Error::InvalidTableIdent(s.to_string()))?;
        Self::try_new(namespace, name)
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// One table at a [`TableEngine`].
///
/// `Table` holds no state besides its identifier and engine handle: every call reads fresh
/// history from the engine, so a `Table` never goes stale and can be shared across threads.
#[derive(Clone)]
pub struct Table {
    ident: TableIdent,
    engine: Arc<dyn TableEngine>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("ident", &self.ident).finish()
    }
}

impl Table {
    pub fn new(ident: TableIdent, engine: Arc<dyn TableEngine>) -> Self {
        Self { ident, engine }
    }

    pub fn ident(&self) -> &TableIdent {
        &self.ident
    }

    pub fn engine(&self) -> &Arc<dyn TableEngine> {
        &self.engine
    }

    /// Convert the table to the snapshot-capable format. Safe to call repeatedly.
    pub fn migrate(&self) -> HistoryResult<MigrationResult> {
        MigrationOrchestrator::new(self.engine.clone()).migrate(&self.ident)
    }

    pub fn history(&self) -> HistoryResult<History> {
        HistoryCatalog::new(self.engine.clone()).list_snapshots(&self.ident)
    }

    pub fn current_snapshot(&self) -> HistoryResult<Snapshot> {
        resolver::last(&self.history()?).cloned()
    }

    pub fn first_snapshot(&self) -> HistoryResult<Snapshot> {
        resolver::first(&self.history()?).cloned()
    }

    pub fn last_snapshot(&self) -> HistoryResult<Snapshot> {
        self.current_snapshot()
    }

    pub fn snapshot_as_of(&self, timestamp: Timestamp) -> HistoryResult<Snapshot> {
        resolver::resolve_as_of(&self.history()?, timestamp).cloned()
    }

    /// Commit `rows` as a new `append` snapshot and return it.
    pub fn append(&self, rows: Vec<Row>) -> HistoryResult<Snapshot> {
        let num_rows = rows.len();
        let snapshot = self.engine.append(&self.ident, rows)?;
        info!(
            table = %self.ident,
            snapshot_id = %snapshot.snapshot_id(),
            num_rows,
            "appended rows"
        );
        Ok(snapshot)
    }

    /// The table's current rows.
    pub fn scan(&self) -> HistoryResult<RowStream> {
        let current = self.current_snapshot()?;
        self.time_travel().read_snapshot(&self.ident, current.snapshot_id())
    }

    /// Number of rows in the current snapshot.
    pub fn count(&self) -> HistoryResult<usize> {
        count_rows(self.scan()?)
    }

    pub fn read_as_of(&self, timestamp: Timestamp) -> HistoryResult<(Snapshot, RowStream)> {
        self.time_travel().read_as_of(&self.ident, timestamp)
    }

    pub fn read_snapshot(&self, snapshot_id: SnapshotId) -> HistoryResult<RowStream> {
        self.time_travel().read_snapshot(&self.ident, snapshot_id)
    }

    pub fn read_between(&self, start: SnapshotId, end: SnapshotId) -> HistoryResult<RowStream> {
        self.incremental().read_between(&self.ident, start, end)
    }

    pub fn read_between_timestamps(
        &self,
        start: Timestamp,
        end: Option<Timestamp>,
    ) -> HistoryResult<RowStream> {
        self.incremental()
            .read_between_timestamps(&self.ident, start, end)
    }

    pub fn change_set(&self, start: SnapshotId, end: SnapshotId) -> HistoryResult<ChangeSet> {
        self.incremental().change_set(&self.ident, start, end)
    }

    fn time_travel(&self) -> TimeTravelReader {
        TimeTravelReader::new(self.engine.clone())
    }

    fn incremental(&self) -> IncrementalReader {
        IncrementalReader::new(self.engine.clone())
    }
}

/// Drain a row stream, failing on the first error.
pub fn count_rows(mut rows: RowStream) -> HistoryResult<usize> {
    rows.try_fold(0, |count, row| row.map(|_| count + 1))
}
