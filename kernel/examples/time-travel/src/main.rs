use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use table_history::engine::clock::{Clock, SystemClock};
use table_history::engine::memory::InMemoryEngine;
use table_history::migration::MigrationOrchestrator;
use table_history::{EngineConfig, History, HistoryResult, Row, Table, TableEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DATABASE_SUFFIX: &str = "CAR_DATA";
const MODELS: [&str; 5] = ["Model A", "Model B", "Model C", "Model D", "Model R"];

/// Walks through the life of a table's snapshot history: migrate two legacy tables, append
/// sampled rows, then time travel to before the appends and read only the rows they added.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// JSON parameters file with `username` and `s3BucketName`. Overrides --username/--bucket.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "demo")]
    username: String,

    #[arg(long, default_value = "demo-bucket")]
    bucket: String,

    /// Fraction of the current rows re-inserted by each append
    #[arg(long, default_value_t = 0.3, value_parser = parse_fraction)]
    sample_fraction: f64,

    /// Seed for the row sampler
    #[arg(long, default_value_t = 3)]
    seed: u64,

    /// Number of rows in the legacy car sales table
    #[arg(long, default_value_t = 50)]
    rows: usize,
}

fn parse_fraction(s: &str) -> Result<f64, String> {
    let fraction: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&fraction) {
        Ok(fraction)
    } else {
        Err(format!("{fraction} is not between 0 and 1"))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{e:#?}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> HistoryResult<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::new(&cli.username, &cli.bucket)?,
    };
    println!("Running as username: {}", config.username);

    let car_sales = config.table_ident(DATABASE_SUFFIX, "CAR_SALES")?;
    let customer_data = config.table_ident(DATABASE_SUFFIX, "CUSTOMER_DATA")?;
    let engine = Arc::new(InMemoryEngine::new(config));
    engine.create_legacy_table(&car_sales, car_sales_rows(cli.rows))?;
    engine.create_legacy_table(&customer_data, customer_rows(cli.rows / 2))?;

    // Migrating twice shows the second pass is a no-op.
    let orchestrator = MigrationOrchestrator::new(engine.clone());
    for _ in 0..2 {
        for result in orchestrator.migrate_all([&car_sales, &customer_data])? {
            if result.already_migrated {
                println!("{} has already been migrated", result.table);
            } else {
                println!("Migrated {}", result.table);
            }
        }
    }

    let table = Table::new(car_sales, engine.clone() as Arc<dyn TableEngine>);
    print_history(&table.history()?);

    // Store a timestamp strictly between the migration and the appends below.
    thread::sleep(Duration::from_millis(2));
    let pre_insert_ts = SystemClock.now_ms();
    thread::sleep(Duration::from_millis(2));
    println!("Pre-insert timestamp: {pre_insert_ts}");
    println!("Pre-insert count: {}", table.count()?);

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let sample: Vec<Row> = table
        .scan()?
        .filter(|row| row.is_err() || rng.gen_bool(cli.sample_fraction))
        .collect::<HistoryResult<_>>()?;
    info!(num_rows = sample.len(), "sampled rows to re-insert");
    table.append(sample.clone())?;
    table.append(sample)?;

    print_history(&table.history()?);
    println!("Post-insert count: {}", table.count()?);

    let (snapshot, rows) = table.read_as_of(pre_insert_ts)?;
    println!(
        "Time travel to {pre_insert_ts} resolved to snapshot {} with {} rows",
        snapshot.snapshot_id(),
        rows.count()
    );

    let first = table.first_snapshot()?.snapshot_id();
    let last = table.last_snapshot()?.snapshot_id();
    let changes = table.change_set(first, last)?;
    println!(
        "Read between first snapshot {first} and last snapshot {last} ({} commits, {} added records):",
        changes.snapshots.len(),
        changes.added_records()
    );
    for row in table.read_between(first, last)? {
        println!("  {}", row?);
    }
    Ok(())
}

fn print_history(history: &History) {
    println!("History of {}:", history.table());
    println!(
        "{:>20} | {:>20} | {:>15} | {:<9} | {:>8}",
        "snapshot_id", "parent_id", "committed_at_ms", "operation", "records"
    );
    for snapshot in history {
        let parent = snapshot
            .parent_id()
            .map(|id| id.to_string())
            .unwrap_or_default();
        println!(
            "{:>20} | {:>20} | {:>15} | {:<9} | {:>8}",
            snapshot.snapshot_id(),
            parent,
            snapshot.timestamp_ms(),
            snapshot.operation(),
            snapshot.total_records().unwrap_or_default()
        );
    }
}

fn car_sales_rows(n: usize) -> Vec<Row> {
    (0..n as i64)
        .map(|id| {
            Row::new()
                .with("sale_id", id)
                .with("customer_id", id / 2)
                .with("model", MODELS[id as usize % MODELS.len()])
                .with("saleprice", 15_000.0 + 1_250.0 * (id % 17) as f64)
                .with("month", 1 + id % 12)
                .with("year", 2020 + id % 4)
        })
        .collect()
}

fn customer_rows(n: usize) -> Vec<Row> {
    (0..n as i64)
        .map(|id| {
            Row::new()
                .with("customer_id", id)
                .with("username", format!("customer{id}"))
                .with("state", if id % 2 == 0 { "CA" } else { "NY" })
        })
        .collect()
}
