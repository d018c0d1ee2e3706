//! The append-only snapshot log of one table.
//!
//! A [`History`] is built from whatever the engine reports for a table's snapshots and is never
//! mutated afterwards. Construction checks the two properties every other part of the crate relies
//! on:
//!
//! - snapshots are ordered oldest first, with non-decreasing `timestamp_ms`;
//! - every parent link that points inside the history points at an earlier snapshot.
//!
//! Parent links may point at snapshots that are not in the listing: snapshot expiry is an engine
//! concern and can remove ancestors of the oldest retained snapshot.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use tracing::debug;

use crate::snapshot::{Snapshot, SnapshotId};
use crate::table::TableIdent;
use crate::utils::require;
use crate::{Error, HistoryResult};

pub(crate) mod search;

/// An ordered, immutable log of a table's snapshots, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    table: TableIdent,
    snapshots: Vec<Snapshot>,
    positions: HashMap<SnapshotId, usize>,
}

impl History {
    /// Build a history from an engine listing.
    ///
    /// The listing is expected in commit order. A listing that is not ordered by `timestamp_ms` is
    /// stably sorted first. Snapshots sharing a timestamp are then ordered by their parent links,
    /// so a newest-first listing comes out oldest first even when commits tie.
    pub fn try_new(table: TableIdent, mut snapshots: Vec<Snapshot>) -> HistoryResult<Self> {
        if !snapshots
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.timestamp_ms() <= b.timestamp_ms())
        {
            debug!(%table, "snapshot listing is not in commit order; sorting by timestamp");
            snapshots.sort_by_key(Snapshot::timestamp_ms);
        }
        for run in snapshots.chunk_by_mut(|a, b| a.timestamp_ms() == b.timestamp_ms()) {
            if run.len() > 1 {
                order_by_parent(run);
            }
        }

        let mut positions = HashMap::with_capacity(snapshots.len());
        for (idx, snapshot) in snapshots.iter().enumerate() {
            let id = snapshot.snapshot_id();
            require!(
                positions.insert(id, idx).is_none(),
                Error::InvalidHistory(format!("{table}: snapshot {id} is listed more than once"))
            );
        }
        for (idx, snapshot) in snapshots.iter().enumerate() {
            let Some(parent) = snapshot.parent_id() else {
                continue;
            };
            if let Some(&parent_idx) = positions.get(&parent) {
                require!(
                    parent_idx < idx,
                    Error::InvalidHistory(format!(
                        "{table}: snapshot {} is committed before its parent {parent}",
                        snapshot.snapshot_id()
                    ))
                );
            }
        }

        Ok(Self {
            table,
            snapshots,
            positions,
        })
    }

    pub fn table(&self) -> &TableIdent {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The oldest retained snapshot.
    pub fn first(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }

    /// The current snapshot of the table.
    pub fn last(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Snapshot> + ExactSizeIterator {
        self.snapshots.iter()
    }

    pub fn as_slice(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn get(&self, id: SnapshotId) -> Option<&Snapshot> {
        self.position(id).map(|idx| &self.snapshots[idx])
    }

    /// Position of `id` in commit order, or `None` if it is not part of this history.
    pub fn position(&self, id: SnapshotId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn contains(&self, id: SnapshotId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Like [`Self::position`], but fails with [`Error::SnapshotNotFound`].
    pub fn try_position(&self, id: SnapshotId) -> HistoryResult<usize> {
        self.position(id)
            .ok_or_else(|| Error::snapshot_not_found(&self.table, id))
    }

    /// The snapshots committed strictly after `start` up to and including `end`.
    ///
    /// Fails if either id is unknown or if `start` was committed after `end`. Returns an empty
    /// slice when `start == end`.
    pub fn between(&self, start: SnapshotId, end: SnapshotId) -> HistoryResult<&[Snapshot]> {
        let start_idx = self.try_position(start)?;
        let end_idx = self.try_position(end)?;
        require!(
            start_idx <= end_idx,
            Error::InvalidSnapshotRange {
                table: self.table.clone(),
                start,
                end,
            }
        );
        Ok(&self.snapshots[start_idx + 1..=end_idx])
    }
}

/// Reorders snapshots committed at the same instant so that each one follows the snapshot its
/// `parent_id` names. Members whose parent is outside the run keep their relative order. A cycle
/// is left as listed and rejected by the parent check afterwards.
fn order_by_parent(run: &mut [Snapshot]) {
    let mut remaining = run.to_vec();
    let mut ordered = Vec::with_capacity(run.len());
    while !remaining.is_empty() {
        let pending: HashSet<SnapshotId> = remaining.iter().map(Snapshot::snapshot_id).collect();
        let next = remaining
            .iter()
            .position(|s| s.parent_id().is_none_or(|parent| !pending.contains(&parent)))
            .unwrap_or(0);
        ordered.push(remaining.remove(next));
    }
    run.clone_from_slice(&ordered);
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}
