//! A number of utilities useful for testing that we want to use in multiple crates

use std::sync::{Arc, Mutex};

use table_history::engine::clock::ManualClock;
use table_history::engine::memory::InMemoryEngine;
use table_history::{
    EngineConfig, HistoryResult, Row, RowStream, Scalar, Table, TableEngine, TableIdent,
    Timestamp,
};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;

pub const TEST_USER: &str = "tester";
pub const TEST_BUCKET: &str = "test-bucket";
/// Id of the first snapshot any test engine commits.
pub const FIRST_SNAPSHOT_ID: i64 = 100;
/// Clock reading when a test engine is created.
pub const START_MS: Timestamp = 1000;

pub fn test_config() -> EngineConfig {
    EngineConfig::builder(TEST_USER, TEST_BUCKET)
        .first_snapshot_id(FIRST_SNAPSHOT_ID)
        .build()
        .expect("valid test config")
}

/// `<user>_CAR_DATA.CAR_SALES`
pub fn car_sales_ident() -> TableIdent {
    test_config()
        .table_ident("CAR_DATA", "CAR_SALES")
        .expect("valid table ident")
}

/// `<user>_CAR_DATA.CUSTOMER_DATA`
pub fn customer_data_ident() -> TableIdent {
    test_config()
        .table_ident("CAR_DATA", "CUSTOMER_DATA")
        .expect("valid table ident")
}

/// `n` car sales rows with ids starting at `first_id`.
pub fn car_sales_rows(first_id: i64, n: usize) -> Vec<Row> {
    const MODELS: [&str; 4] = ["Model A", "Model B", "Model C", "Model D"];
    (first_id..)
        .take(n)
        .map(|id| {
            Row::new()
                .with("sale_id", id)
                .with("model", MODELS[id.rem_euclid(MODELS.len() as i64) as usize])
                .with("sale_price", 20_000.0 + 250.0 * id as f64)
        })
        .collect()
}

/// Collect the `sale_id` column of a row stream, failing the test on any read error.
pub fn sale_ids(rows: RowStream) -> Vec<i64> {
    rows.map(|row| match row.expect("row read failed").get("sale_id") {
        Some(Scalar::Long(id)) => *id,
        other => panic!("expected a sale_id, got {other:?}"),
    })
    .collect()
}

/// An in-memory engine driven by a manual clock, plus one table on it.
pub struct TestTable {
    pub engine: Arc<InMemoryEngine>,
    pub clock: Arc<ManualClock>,
    pub table: Table,
}

impl TestTable {
    /// Append `rows` at exactly `timestamp`.
    pub fn append_at(
        &self,
        timestamp: Timestamp,
        rows: Vec<Row>,
    ) -> HistoryResult<table_history::Snapshot> {
        self.clock.set(timestamp);
        self.table.append(rows)
    }
}

/// A fresh engine holding the legacy `CAR_SALES` table with `num_rows` rows and no history.
pub fn legacy_table_setup(num_rows: usize) -> HistoryResult<TestTable> {
    let clock = Arc::new(ManualClock::new(START_MS));
    let engine = Arc::new(InMemoryEngine::with_clock(test_config(), clock.clone()));
    let ident = car_sales_ident();
    engine.create_legacy_table(&ident, car_sales_rows(1, num_rows))?;
    let table = Table::new(ident, engine.clone() as Arc<dyn TableEngine>);
    Ok(TestTable {
        engine,
        clock,
        table,
    })
}

/// The canonical three-snapshot history:
///
/// | snapshot | timestamp | rows added  | total rows |
/// |----------|-----------|-------------|------------|
/// | 100      | 1000      | sale_id 1-3 | 3          |
/// | 101      | 2000      | sale_id 4-5 | 5          |
/// | 102      | 3000      | sale_id 6   | 6          |
///
/// Snapshot 100 is the migration of the legacy table.
pub fn three_snapshot_setup() -> HistoryResult<TestTable> {
    let setup = legacy_table_setup(3)?;
    setup.table.migrate()?;
    setup.append_at(2000, car_sales_rows(4, 2))?;
    setup.append_at(3000, car_sales_rows(6, 1))?;
    Ok(setup)
}

pub fn assert_result_error_with_message<T, E: ToString>(res: Result<T, E>, message: &str) {
    match res {
        Ok(_) => panic!("Expected error, but got Ok result"),
        Err(error) => {
            let error_str = error.to_string();
            assert!(
                error_str.contains(message),
                "Error message does not contain the expected message.\nExpected message:\t{message}\nActual message:\t\t{error_str}"
            );
        }
    }
}

// Writer that captures log output into a shared buffer for test assertions
pub struct LogWriter(pub Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}

// Test helper that sets up tracing to capture log output
// The guard keeps the tracing subscriber active for the lifetime of the struct
pub struct LoggingTest {
    logs: Arc<Mutex<Vec<u8>>>,
    _guard: DefaultGuard,
}

impl Default for LoggingTest {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingTest {
    pub fn new() -> Self {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let logs_clone = logs.clone();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(move || LogWriter(logs_clone.clone()))
                    .with_ansi(false),
            ),
        );
        Self { logs, _guard }
    }

    pub fn logs(&self) -> String {
        String::from_utf8(self.logs.lock().unwrap().clone()).unwrap()
    }
}
