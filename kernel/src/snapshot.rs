//! In-memory representation of one committed table snapshot.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumString};

use crate::Timestamp;

/// Summary key holding the number of rows added by a commit.
pub const ADDED_RECORDS: &str = "added-records";
/// Summary key holding the number of rows deleted by a commit.
pub const DELETED_RECORDS: &str = "deleted-records";
/// Summary key holding the number of rows in the table after a commit.
pub const TOTAL_RECORDS: &str = "total-records";

/// Identifier of a snapshot, unique within one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(i64);

impl SnapshotId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SnapshotId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for SnapshotId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The kind of write that produced a snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, StrumDisplay, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Only data files were added
    Append,
    /// Data files were added and removed in a logical overwrite
    Overwrite,
    /// Data files were removed and their contents logically deleted
    Delete,
    /// Files were rewritten without changing the table's logical contents
    Replace,
}

/// An immutable record of a table's state after one committed write.
///
/// Snapshots form a parent-linked chain: `parent_id` points at the snapshot that was current when
/// this one was committed. The chain's `timestamp_ms` never decreases from the root to the most
/// recent snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    snapshot_id: SnapshotId,
    parent_id: Option<SnapshotId>,
    timestamp_ms: Timestamp,
    operation: Operation,
    #[serde(default)]
    summary: HashMap<String, String>,
}

impl Snapshot {
    pub fn new(
        snapshot_id: SnapshotId,
        parent_id: Option<SnapshotId>,
        timestamp_ms: Timestamp,
        operation: Operation,
    ) -> Self {
        Self {
            snapshot_id,
            parent_id,
            timestamp_ms,
            operation,
            summary: HashMap::new(),
        }
    }

    pub fn with_summary<K, V>(mut self, summary: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.summary
            .extend(summary.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn snapshot_id(&self) -> SnapshotId {
        self.snapshot_id
    }

    pub fn parent_id(&self) -> Option<SnapshotId> {
        self.parent_id
    }

    pub fn timestamp_ms(&self) -> Timestamp {
        self.timestamp_ms
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn summary(&self) -> &HashMap<String, String> {
        &self.summary
    }

    /// The commit time as a UTC datetime, or `None` if the timestamp is out of chrono's range.
    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }

    pub fn added_records(&self) -> Option<u64> {
        self.summary_count(ADDED_RECORDS)
    }

    pub fn deleted_records(&self) -> Option<u64> {
        self.summary_count(DELETED_RECORDS)
    }

    pub fn total_records(&self) -> Option<u64> {
        self.summary_count(TOTAL_RECORDS)
    }

    // Engines write counts as decimal strings; anything unparsable is treated as absent.
    fn summary_count(&self, key: &str) -> Option<u64> {
        self.summary.get(key).and_then(|v| v.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("append", Operation::Append)]
    #[case("overwrite", Operation::Overwrite)]
    #[case("DELETE", Operation::Delete)]
    #[case("Replace", Operation::Replace)]
    fn operation_parses_engine_names(#[case] name: &str, #[case] expected: Operation) {
        assert_eq!(name.parse::<Operation>().unwrap(), expected);
        assert_eq!(expected.to_string(), name.to_lowercase());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        assert!("merge".parse::<Operation>().is_err());
    }

    #[test]
    fn summary_counts() {
        let snapshot = Snapshot::new(SnapshotId::new(5), Some(SnapshotId::new(4)), 0, Operation::Append)
            .with_summary([
                (ADDED_RECORDS, "12"),
                (TOTAL_RECORDS, "40"),
                (DELETED_RECORDS, "not-a-number"),
            ]);
        assert_eq!(snapshot.added_records(), Some(12));
        assert_eq!(snapshot.total_records(), Some(40));
        assert_eq!(snapshot.deleted_records(), None);
    }

    #[test]
    fn committed_at_is_utc_millis() {
        let snapshot = Snapshot::new(SnapshotId::new(1), None, 1_700_000_000_123, Operation::Append);
        let at = snapshot.committed_at().unwrap();
        assert_eq!(at.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn snapshot_deserializes_from_engine_json() {
        let json = r#"{
            "snapshot_id": 101,
            "parent_id": 100,
            "timestamp_ms": 2000,
            "operation": "append",
            "summary": {"added-records": "3"}
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.snapshot_id(), SnapshotId::new(101));
        assert_eq!(snapshot.parent_id(), Some(SnapshotId::new(100)));
        assert_eq!(snapshot.operation(), Operation::Append);
        assert_eq!(snapshot.added_records(), Some(3));
    }
}
