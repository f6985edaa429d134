// civic-ease: maintenance CLI for the registry database

use anyhow::{Context, Result};
use civic_ease::{load_citizens_csv, logging, recalculate_income, Config, Registry, SqliteStore};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "civic-ease", version, about = "CivicEase registry maintenance")]
struct Cli {
    /// Database path (overrides CIVIC_DB_PATH)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the database schema
    Init,
    /// Bulk-load citizens from a CSV file; already imported rows are skipped
    Import {
        #[arg(value_name = "CSV")]
        csv: PathBuf,
    },
    /// Recompute family income totals (one family, or all of them)
    Recompute {
        #[arg(value_name = "FAMILY_ID")]
        family_id: Option<String>,
    },
    /// Print dashboard counts as JSON
    Stats,
}

fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = Config::from_env().with_db_path(cli.db);

    match cli.cmd {
        Cmd::Init => run_init(&config.db_path),
        Cmd::Import { csv } => run_import(&config, &csv),
        Cmd::Recompute { family_id } => run_recompute(&config, family_id.as_deref()),
        Cmd::Stats => run_stats(&config),
    }
}

fn open_registry(config: &Config) -> Result<(Arc<SqliteStore>, Registry)> {
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let registry = Registry::new(store.clone(), config.actor.clone());
    Ok((store, registry))
}

fn run_init(db_path: &Path) -> Result<()> {
    SqliteStore::open(db_path)?;
    println!("✓ Database ready at {}", db_path.display());
    Ok(())
}

fn run_import(config: &Config, csv: &Path) -> Result<()> {
    let rows = load_citizens_csv(csv)
        .with_context(|| format!("Failed to load {}", csv.display()))?;
    info!(rows = rows.len(), path = %csv.display(), "csv loaded");

    let (store, _) = open_registry(config)?;
    let summary = store.import_citizens(rows, &config.actor)?;

    println!("✓ Inserted:   {}", summary.inserted);
    println!("✓ Duplicates: {}", summary.duplicates);
    if summary.rejected > 0 {
        println!("⚠️  Rejected:   {}", summary.rejected);
    }
    Ok(())
}

fn run_recompute(config: &Config, family_id: Option<&str>) -> Result<()> {
    let (store, registry) = open_registry(config)?;

    match family_id {
        Some(id) => {
            let total = recalculate_income(store.as_ref(), id)?;
            println!("{}: {:.2}", id, total);
        }
        None => {
            let totals = registry.recompute_all()?;
            for (id, total) in &totals {
                println!("{}: {:.2}", id, total);
            }
            println!("✓ Recomputed {} families", totals.len());
        }
    }
    Ok(())
}

fn run_stats(config: &Config) -> Result<()> {
    let (_, registry) = open_registry(config)?;
    let stats = registry.stats(chrono::Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
