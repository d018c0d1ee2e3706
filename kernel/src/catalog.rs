//! Reads a table's snapshot history from the engine.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::engine::TableEngine;
use crate::history::History;
use crate::table::TableIdent;
use crate::HistoryResult;

/// Lists snapshot histories through a [`TableEngine`].
///
/// The catalog keeps no cache: every call goes to the engine, so two calls may return different
/// histories if commits happen in between, but each returned [`History`] is self-consistent.
#[derive(Clone)]
pub struct HistoryCatalog {
    engine: Arc<dyn TableEngine>,
}

impl HistoryCatalog {
    pub fn new(engine: Arc<dyn TableEngine>) -> Self {
        Self { engine }
    }

    /// The table's snapshots in commit order. An empty history is not an error here; callers that
    /// need a snapshot get [`Error::EmptyHistory`](crate::Error::EmptyHistory) from the resolver.
    ///
    /// # Errors
    /// - [`Error::TableNotFound`](crate::Error::TableNotFound) if the table does not exist or has
    ///   not been migrated.
    /// - [`Error::EngineUnavailable`](crate::Error::EngineUnavailable) if the engine cannot be
    ///   reached.
    /// - [`Error::InvalidHistory`](crate::Error::InvalidHistory) if the engine's listing breaks
    ///   the commit-order invariants.
    #[instrument(name = "history.list", skip_all, fields(table = %table), err)]
    pub fn list_snapshots(&self, table: &TableIdent) -> HistoryResult<History> {
        let snapshots = self.engine.list_snapshots(table)?;
        let history = History::try_new(table.clone(), snapshots)?;
        debug!(num_snapshots = history.len(), "listed snapshot history");
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::memory::InMemoryEngine;
    use crate::row::Row;
    use crate::table_properties::TRANSLATED_TO_EXTERNAL;
    use crate::utils::test_utils::test_table;
    use crate::Error;

    #[test]
    fn lists_each_commit_in_order() {
        let engine = Arc::new(InMemoryEngine::new(
            EngineConfig::new("tester", "bucket").unwrap(),
        ));
        let table = test_table();
        engine.create_table(&table).unwrap();
        let catalog = HistoryCatalog::new(engine.clone());
        assert!(catalog.list_snapshots(&table).unwrap().is_empty());

        let first = engine.append(&table, vec![Row::new().with("id", 1)]).unwrap();
        let second = engine.append(&table, vec![Row::new().with("id", 2)]).unwrap();
        let history = catalog.list_snapshots(&table).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.first(), Some(&first));
        assert_eq!(history.last(), Some(&second));
        assert_eq!(second.parent_id(), Some(first.snapshot_id()));
    }

    #[test]
    fn legacy_table_is_not_found() {
        let engine = Arc::new(InMemoryEngine::new(
            EngineConfig::new("tester", "bucket").unwrap(),
        ));
        let table = test_table();
        engine.create_legacy_table(&table, vec![]).unwrap();
        engine
            .unset_table_property(&table, TRANSLATED_TO_EXTERNAL)
            .unwrap();
        let catalog = HistoryCatalog::new(engine);
        assert!(matches!(
            catalog.list_snapshots(&table),
            Err(Error::TableNotFound(t)) if t == table
        ));
    }
}
