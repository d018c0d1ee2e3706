//! Reads a table as it was at an earlier point of its history.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::catalog::HistoryCatalog;
use crate::engine::TableEngine;
use crate::resolver;
use crate::row::RowStream;
use crate::snapshot::{Snapshot, SnapshotId};
use crate::table::{count_rows, TableIdent};
use crate::{HistoryResult, Timestamp};

/// Time-travel reads against a [`TableEngine`].
#[derive(Clone)]
pub struct TimeTravelReader {
    engine: Arc<dyn TableEngine>,
}

impl TimeTravelReader {
    pub fn new(engine: Arc<dyn TableEngine>) -> Self {
        Self { engine }
    }

    /// Read the table as of `timestamp`, returning the snapshot the read resolved to along with
    /// its rows.
    ///
    /// The snapshot is resolved from the table's history before any data is read, so an instant
    /// before the first commit fails with
    /// [`Error::NoSnapshotBeforeTime`](crate::Error::NoSnapshotBeforeTime) instead of an empty
    /// result. Rows are then read by the resolved snapshot id, so a commit that lands between the
    /// listing and the scan cannot change which snapshot the rows come from.
    #[instrument(
        name = "time_travel.read_as_of",
        skip_all,
        fields(table = %table, timestamp = timestamp),
        err
    )]
    pub fn read_as_of(
        &self,
        table: &TableIdent,
        timestamp: Timestamp,
    ) -> HistoryResult<(Snapshot, RowStream)> {
        let history = HistoryCatalog::new(self.engine.clone()).list_snapshots(table)?;
        let snapshot = resolver::resolve_as_of(&history, timestamp)?.clone();
        debug!(%table, snapshot_id = %snapshot.snapshot_id(), "resolved time travel target");
        let rows = self.engine.read_snapshot(table, snapshot.snapshot_id())?;
        Ok((snapshot, rows))
    }

    /// Read the table as of one snapshot.
    pub fn read_snapshot(
        &self,
        table: &TableIdent,
        snapshot_id: SnapshotId,
    ) -> HistoryResult<RowStream> {
        let history = HistoryCatalog::new(self.engine.clone()).list_snapshots(table)?;
        history.try_position(snapshot_id)?;
        debug!(%table, %snapshot_id, "reading snapshot");
        self.engine.read_snapshot(table, snapshot_id)
    }

    /// Number of rows the table held as of `timestamp`.
    pub fn count_as_of(&self, table: &TableIdent, timestamp: Timestamp) -> HistoryResult<usize> {
        let (_, rows) = self.read_as_of(table, timestamp)?;
        count_rows(rows)
    }
}
