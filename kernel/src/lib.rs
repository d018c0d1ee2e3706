//! # table_history
//!
//! Snapshot history navigation for tables stored in a snapshot-capable (Iceberg-style) table
//! format. A table's history is an append-only, ordered log of immutable [`Snapshot`]s; this crate
//! answers questions over that log and issues bounded reads against a pluggable [`TableEngine`]:
//!
//! - list a table's history ([`catalog::HistoryCatalog`])
//! - find the snapshot that was current at a wall-clock instant, or the first/last snapshot
//!   ([`resolver`])
//! - read the table as it was at a timestamp or snapshot ([`time_travel::TimeTravelReader`])
//! - read only the rows committed between two snapshots ([`incremental::IncrementalReader`])
//! - convert legacy tables into the snapshot-capable format, idempotently
//!   ([`migration::MigrationOrchestrator`])
//!
//! The [`Table`] type ties these together for one table.
//!
//! # Engines
//!
//! The crate never touches storage itself. Everything that migrates, commits, or scans data goes
//! through the [`TableEngine`] trait, which is expected to be implemented on top of whatever
//! query runtime owns the tables. [`engine::memory::InMemoryEngine`] is a complete in-process
//! implementation used by the tests and the `time-travel` example.
//!
//! # Example
//!
//! ```
//! # use std::sync::Arc;
//! # use table_history::{EngineConfig, Row, Table, TableIdent, HistoryResult};
//! # use table_history::engine::memory::InMemoryEngine;
//! # fn main() -> HistoryResult<()> {
//! let config = EngineConfig::new("alice", "my-bucket")?;
//! let engine = Arc::new(InMemoryEngine::new(config));
//! let ident = TableIdent::try_new("alice_car_data", "car_sales")?;
//! engine.create_legacy_table(&ident, vec![Row::new().with("id", 1)])?;
//!
//! let table = Table::new(ident, engine);
//! assert!(!table.migrate()?.already_migrated);
//! let before = table.current_snapshot()?;
//! table.append(vec![Row::new().with("id", 2)])?;
//!
//! let history = table.history()?;
//! assert_eq!(history.len(), 2);
//! assert_eq!(table.read_as_of(before.timestamp_ms())?.1.count(), 1);
//! # Ok(())
//! # }
//! ```
#![warn(
    unreachable_pub,
    trivial_numeric_casts,
    unused_extern_crates,
    rust_2018_idioms,
    rust_2021_compatibility
)]

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod incremental;
pub mod migration;
pub mod resolver;
pub mod row;
pub mod snapshot;
pub mod table;
pub mod table_properties;
pub mod time_travel;

pub(crate) mod utils;

pub use config::EngineConfig;
pub use engine::{MigrateOutcome, TableEngine};
pub use error::{Error, HistoryResult};
pub use history::History;
pub use row::{Row, RowStream, Scalar};
pub use snapshot::{Operation, Snapshot, SnapshotId};
pub use table::{Table, TableIdent};

/// Milliseconds since the unix epoch, as recorded on every commit.
pub type Timestamp = i64;
