//! Definitions of errors that history navigation can encounter

use crate::snapshot::SnapshotId;
use crate::table::TableIdent;
use crate::Timestamp;

/// A [`std::result::Result`] that has the history [`Error`] as the error variant
pub type HistoryResult<T, E = Error> = std::result::Result<T, E>;

/// All the types of errors that the crate can run into
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The table engine or its catalog could not be reached. This is transient: the caller may
    /// retry with backoff.
    #[error("Table engine unavailable while accessing {table}: {reason}")]
    EngineUnavailable { table: TableIdent, reason: String },

    /// The table does not exist, or has not been migrated to the snapshot-capable format yet.
    #[error("Table not found or not in a snapshot-capable format: {0}")]
    TableNotFound(TableIdent),

    /// The table has never committed a snapshot.
    #[error("Table {0} has no snapshots")]
    EmptyHistory(TableIdent),

    /// The requested instant precedes the first commit of the table.
    #[error(
        "Table {table} has no snapshot at or before timestamp {timestamp}; \
         the earliest snapshot was committed at {earliest}"
    )]
    NoSnapshotBeforeTime {
        table: TableIdent,
        timestamp: Timestamp,
        earliest: Timestamp,
    },

    /// The requested instant follows the latest commit of the table.
    #[error(
        "Table {table} has no snapshot at or after timestamp {timestamp}; \
         the latest snapshot was committed at {latest}"
    )]
    NoSnapshotAfterTime {
        table: TableIdent,
        timestamp: Timestamp,
        latest: Timestamp,
    },

    /// The start snapshot of an incremental read was committed after the end snapshot.
    #[error("Invalid snapshot range for {table}: {start} is committed after {end}")]
    InvalidSnapshotRange {
        table: TableIdent,
        start: SnapshotId,
        end: SnapshotId,
    },

    /// A snapshot id that is not part of the table's history.
    #[error("Snapshot {snapshot_id} not found in the history of {table}")]
    SnapshotNotFound {
        table: TableIdent,
        snapshot_id: SnapshotId,
    },

    /// A timestamp window whose start is after its end.
    #[error("Invalid timestamp range: ({start}, {end})")]
    InvalidTimestampRange { start: Timestamp, end: Timestamp },

    /// A well-formed timestamp window that contains no commit.
    #[error("There are no commits in the timestamp range ({start}, {end})")]
    EmptyTimestampRange { start: Timestamp, end: Timestamp },

    /// The engine reported a history that is not an append-only, parent-linked log.
    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    /// The table is already in the snapshot-capable format. Expected on retries.
    #[error("Table {0} is already migrated")]
    AlreadyMigrated(TableIdent),

    /// The engine refused to migrate the table.
    #[error("Migration of {table} rejected: {reason}")]
    MigrationRejected { table: TableIdent, reason: String },

    /// A table identifier that is not of the form `namespace.name`.
    #[error("Invalid table identifier: {0}")]
    InvalidTableIdent(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An error performing operations on JSON data
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A std io error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Could not parse a url
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// An error that doesn't fit any other variant
    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    pub fn generic(msg: impl ToString) -> Self {
        Self::Generic(msg.to_string())
    }

    pub fn engine_unavailable(table: &TableIdent, reason: impl ToString) -> Self {
        Self::EngineUnavailable {
            table: table.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn snapshot_not_found(table: &TableIdent, snapshot_id: SnapshotId) -> Self {
        Self::SnapshotNotFound {
            table: table.clone(),
            snapshot_id,
        }
    }

    /// Whether the failure is transient. Only an unreachable engine qualifies; every other
    /// variant is either a precondition violation or a fatal condition of the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EngineUnavailable { .. })
    }
}
