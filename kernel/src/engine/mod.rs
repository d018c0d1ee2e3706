//! The interface to the table engine that owns storage, commits, and scans.
//!
//! This crate decides *which* snapshots to read; a [`TableEngine`] performs the reads and the
//! writes. Every engine call is an atomic server-side operation: an `append` either produces
//! exactly one new snapshot or fails, and `list_snapshots` returns a consistent view of the
//! engine's metadata at the time of the call.

use std::collections::HashMap;

use crate::row::{Row, RowStream};
use crate::snapshot::{Snapshot, SnapshotId};
use crate::table::TableIdent;
use crate::{HistoryResult, Timestamp};

pub mod clock;
pub mod memory;

/// Outcome of asking the engine to migrate a table to the snapshot-capable format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateOutcome {
    /// The table was converted and now has its first snapshot.
    Migrated,
    /// The table was already in the snapshot-capable format; nothing was done.
    AlreadyMigrated,
}

/// A table engine: the runtime that owns the tables and executes migrations, commits and scans.
///
/// Implementations must be safe to share across threads. Errors must identify the table they
/// concern; an engine that cannot be reached reports
/// [`Error::EngineUnavailable`](crate::Error::EngineUnavailable), and a table that does not exist
/// or is not yet in the snapshot-capable format reports
/// [`Error::TableNotFound`](crate::Error::TableNotFound).
pub trait TableEngine: Send + Sync {
    /// Convert the table to the snapshot-capable format in place.
    ///
    /// Engines may answer a redundant migration either with [`MigrateOutcome::AlreadyMigrated`]
    /// or with [`Error::AlreadyMigrated`](crate::Error::AlreadyMigrated).
    fn migrate(&self, table: &TableIdent) -> HistoryResult<MigrateOutcome>;

    /// The table's snapshots, oldest first, as recorded in the engine's metadata.
    fn list_snapshots(&self, table: &TableIdent) -> HistoryResult<Vec<Snapshot>>;

    /// Commit `rows` to the table, producing exactly one new `append` snapshot.
    fn append(&self, table: &TableIdent, rows: Vec<Row>) -> HistoryResult<Snapshot>;

    /// Scan the table as of the given instant.
    fn read_as_of(&self, table: &TableIdent, timestamp: Timestamp) -> HistoryResult<RowStream>;

    /// Scan the table as of the given snapshot.
    fn read_snapshot(&self, table: &TableIdent, snapshot_id: SnapshotId)
        -> HistoryResult<RowStream>;

    /// Stream the rows introduced by commits after `start` up to and including `end`. A `start` of
    /// `None` reads from before the table's first snapshot.
    fn read_incremental(
        &self,
        table: &TableIdent,
        start: Option<SnapshotId>,
        end: SnapshotId,
    ) -> HistoryResult<RowStream>;

    /// The table's catalog properties.
    fn table_properties(&self, table: &TableIdent) -> HistoryResult<HashMap<String, String>>;

    /// Remove one catalog property from the table. Removing an absent property is not an error.
    fn unset_table_property(&self, table: &TableIdent, key: &str) -> HistoryResult<()>;
}
