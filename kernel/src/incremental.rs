//! Incremental reads: the rows introduced between two points of a table's history.
//!
//! Snapshot ids are validated against a freshly listed [`History`] before the engine is asked for
//! any data, so a bad range fails fast with an error naming the offending id. The actual change
//! computation belongs to the engine's change tracking.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::catalog::HistoryCatalog;
use crate::engine::TableEngine;
use crate::history::History;
use crate::resolver;
use crate::row::{empty_stream, RowStream};
use crate::snapshot::{Snapshot, SnapshotId};
use crate::table::TableIdent;
use crate::{HistoryResult, Timestamp};

/// A validated incremental boundary: the snapshots committed in `(start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub table: TableIdent,
    pub start: SnapshotId,
    pub end: SnapshotId,
    /// Commits strictly after `start` up to and including `end`, oldest first.
    pub snapshots: Vec<Snapshot>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Total records added over the range, as reported in the snapshot summaries. Snapshots
    /// without an `added-records` entry count as zero.
    pub fn added_records(&self) -> u64 {
        self.snapshots
            .iter()
            .filter_map(Snapshot::added_records)
            .sum()
    }
}

/// Reads the changes between snapshots of a table.
#[derive(Clone)]
pub struct IncrementalReader {
    engine: Arc<dyn TableEngine>,
}

impl IncrementalReader {
    pub fn new(engine: Arc<dyn TableEngine>) -> Self {
        Self { engine }
    }

    fn history(&self, table: &TableIdent) -> HistoryResult<History> {
        HistoryCatalog::new(self.engine.clone()).list_snapshots(table)
    }

    /// Stream the rows introduced by commits strictly after `start` up to and including `end`.
    ///
    /// A zero-width range (`start == end`) yields an empty stream without reading any data.
    ///
    /// # Errors
    /// - [`Error::SnapshotNotFound`](crate::Error::SnapshotNotFound) if either id is not in the
    ///   table's history.
    /// - [`Error::InvalidSnapshotRange`](crate::Error::InvalidSnapshotRange) if `start` was
    ///   committed after `end`.
    #[instrument(
        name = "incremental.read_between",
        skip_all,
        fields(table = %table, start = %start, end = %end),
        err
    )]
    pub fn read_between(
        &self,
        table: &TableIdent,
        start: SnapshotId,
        end: SnapshotId,
    ) -> HistoryResult<RowStream> {
        let history = self.history(table)?;
        let range = history.between(start, end)?;
        if range.is_empty() {
            debug!("zero-width snapshot range");
            return Ok(empty_stream());
        }
        debug!(num_snapshots = range.len(), "reading incremental range");
        self.engine.read_incremental(table, Some(start), end)
    }

    /// Describe the commits in `(start, end]` without reading any rows. Fails exactly as
    /// [`Self::read_between`] does.
    pub fn change_set(
        &self,
        table: &TableIdent,
        start: SnapshotId,
        end: SnapshotId,
    ) -> HistoryResult<ChangeSet> {
        let history = self.history(table)?;
        let snapshots = history.between(start, end)?.to_vec();
        Ok(ChangeSet {
            table: table.clone(),
            start,
            end,
            snapshots,
        })
    }

    /// Stream the rows committed inside the time window `[start, end]`, or `[start, now]` when
    /// `end` is `None`. Unlike [`Self::read_between`], the first snapshot in the window
    /// contributes its own rows.
    ///
    /// # Errors
    /// See [`resolver::timestamp_range_to_snapshots`].
    #[instrument(
        name = "incremental.read_between_timestamps",
        skip_all,
        fields(table = %table, start = start, end = ?end),
        err
    )]
    pub fn read_between_timestamps(
        &self,
        table: &TableIdent,
        start: Timestamp,
        end: Option<Timestamp>,
    ) -> HistoryResult<RowStream> {
        let history = self.history(table)?;
        let (first, last) = resolver::timestamp_range_to_snapshots(&history, start, end)?;
        // Read from the commit preceding the window. When the window opens at the oldest
        // snapshot there is none, and the engine reads from before the table's first commit.
        let first_idx = history.try_position(first.snapshot_id())?;
        let from = history.as_slice()[..first_idx]
            .last()
            .map(Snapshot::snapshot_id);
        debug!(
            first = %first.snapshot_id(),
            last = %last.snapshot_id(),
            from = ?from,
            "resolved timestamp window"
        );
        self.engine
            .read_incremental(table, from, last.snapshot_id())
    }
}
