//! Resolves snapshots from a [`History`] by wall-clock time or by position.
//!
//! All timestamp resolution is a bounded binary search over the oldest-first history:
//!
//! - [`resolve_as_of`] finds the greatest lower bound: the latest snapshot committed at or before
//!   the instant. This is the snapshot a time-travel read sees.
//! - [`resolve_at_or_after`] finds the least upper bound: the earliest snapshot committed at or
//!   after the instant.
//!
//! # Visual Example:
//! ```ignore
//! snapshots:   s100                  s101                  s102
//!              |----------|----------|----------|----------|
//! timestamp:              t1                    t2
//! ```
//!
//! | Timestamp | resolve_as_of | resolve_at_or_after |
//! |-----------|---------------|---------------------|
//! | t1        | s100          | s101                |
//! | t2        | s101          | s102                |
//!
//! Because a history only ever grows at its tail with timestamps no smaller than the current tail,
//! resolving an instant that precedes new commits always yields the same snapshot before and after
//! those commits.

use tracing::debug;

use crate::history::search::{search_by_key_with_bounds, Bound};
use crate::history::History;
use crate::snapshot::Snapshot;
use crate::utils::require;
use crate::{Error, HistoryResult, Timestamp};

/// The oldest snapshot of the history.
pub fn first(history: &History) -> HistoryResult<&Snapshot> {
    history
        .first()
        .ok_or_else(|| Error::EmptyHistory(history.table().clone()))
}

/// The current (most recent) snapshot of the history.
pub fn last(history: &History) -> HistoryResult<&Snapshot> {
    history
        .last()
        .ok_or_else(|| Error::EmptyHistory(history.table().clone()))
}

/// Returns the latest snapshot whose `timestamp_ms <= timestamp`. When several snapshots share
/// that timestamp, the most recently committed one is returned.
///
/// # Errors
/// - [`Error::EmptyHistory`] if the table has never committed.
/// - [`Error::NoSnapshotBeforeTime`] if `timestamp` precedes the earliest snapshot.
pub fn resolve_as_of(history: &History, timestamp: Timestamp) -> HistoryResult<&Snapshot> {
    let earliest = first(history)?.timestamp_ms();
    let idx = search_by_key_with_bounds(
        history.as_slice(),
        timestamp,
        Snapshot::timestamp_ms,
        Bound::GreatestLower,
    )
    .ok_or_else(|| Error::NoSnapshotBeforeTime {
        table: history.table().clone(),
        timestamp,
        earliest,
    })?;
    let snapshot = &history.as_slice()[idx];
    debug!(
        table = %history.table(),
        timestamp,
        snapshot_id = %snapshot.snapshot_id(),
        "resolved snapshot as of timestamp"
    );
    Ok(snapshot)
}

/// Returns the earliest snapshot whose `timestamp_ms >= timestamp`. When several snapshots share
/// that timestamp, the first committed one is returned.
///
/// # Errors
/// - [`Error::EmptyHistory`] if the table has never committed.
/// - [`Error::NoSnapshotAfterTime`] if `timestamp` follows the latest snapshot.
pub fn resolve_at_or_after(history: &History, timestamp: Timestamp) -> HistoryResult<&Snapshot> {
    let latest = last(history)?.timestamp_ms();
    let idx = search_by_key_with_bounds(
        history.as_slice(),
        timestamp,
        Snapshot::timestamp_ms,
        Bound::LeastUpper,
    )
    .ok_or_else(|| Error::NoSnapshotAfterTime {
        table: history.table().clone(),
        timestamp,
        latest,
    })?;
    Ok(&history.as_slice()[idx])
}

/// Converts a timestamp window into the first and last snapshots committed inside it.
///
/// The start of the window resolves with [`resolve_at_or_after`] and the end with
/// [`resolve_as_of`]. When `end` is `None` the window is open and ends at the current snapshot.
///
/// # Errors
/// - [`Error::InvalidTimestampRange`] if `start > end`.
/// - [`Error::EmptyTimestampRange`] if no snapshot was committed inside the window.
/// - [`Error::NoSnapshotAfterTime`] if `start` follows the latest snapshot.
/// - [`Error::NoSnapshotBeforeTime`] if `end` precedes the earliest snapshot.
pub fn timestamp_range_to_snapshots(
    history: &History,
    start: Timestamp,
    end: Option<Timestamp>,
) -> HistoryResult<(&Snapshot, &Snapshot)> {
    if let Some(end) = end {
        require!(start <= end, Error::InvalidTimestampRange { start, end });
    }
    let first_in_window = resolve_at_or_after(history, start)?;
    let last_in_window = match end {
        Some(end) => resolve_as_of(history, end)?,
        None => last(history)?,
    };

    // Both resolutions succeed but cross over when the window falls strictly between two commits.
    let first_idx = history.try_position(first_in_window.snapshot_id())?;
    let last_idx = history.try_position(last_in_window.snapshot_id())?;
    require!(
        first_idx <= last_idx,
        Error::EmptyTimestampRange {
            start,
            end: end.unwrap_or(start),
        }
    );
    Ok((first_in_window, last_in_window))
}
