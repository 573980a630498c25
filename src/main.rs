use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::io;
use std::path::{Path, PathBuf};

use sumo_bouts::{
    get_basho_stats, get_bouts_for_basho, reconstruct_bouts, run, setup_database, BashoSnapshot,
    Config,
};

#[derive(Parser)]
#[command(name = "sumo-bouts")]
#[command(about = "Reconstruct sumo bouts from banzuke roster snapshots", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite store for bouts
    #[arg(long, global = true, env = "SUMO_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process snapshots of the most recent run and store their bouts
    Ingest {
        /// Data root holding YYYYMM run directories
        #[arg(long, env = "SUMO_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Treat the directory as the snapshot folder itself
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Worker threads for reading snapshots
        #[arg(long, env = "SUMO_WORKERS")]
        workers: Option<usize>,
    },

    /// Print the bouts of one snapshot file as JSON without storing them
    Reconstruct {
        /// Snapshot file
        path: PathBuf,
    },

    /// Write the stored bouts of a basho as CSV to stdout
    Export {
        /// Basho id, e.g. 202401
        basho_id: String,
    },

    /// Show stored bout counts per basho
    Stats,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Ingest { data_dir, dir, workers } => {
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            if let Some(dir) = dir {
                config.data_dir = dir;
                config.latest_only = false;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            run_ingest(&config)
        }
        Commands::Reconstruct { path } => run_reconstruct(&path),
        Commands::Export { basho_id } => run_export(&config, &basho_id),
        Commands::Stats => run_stats(&config),
    }
}

fn run_ingest(config: &Config) -> Result<()> {
    println!("🤼 Bout ingest");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let summary = run(config)?;

    println!("✓ Snapshots processed: {}", summary.reports.len());
    println!("✓ Matched bouts: {}", summary.total_matched());
    println!("✓ Unmatched bouts: {}", summary.total_unmatched());
    if summary.total_without_candidate() > 0 {
        println!("⚠️  Records without counterpart: {}", summary.total_without_candidate());
    }
    if summary.total_surplus_candidates() > 0 {
        println!(
            "⚠️  Records with surplus counterparts: {}",
            summary.total_surplus_candidates()
        );
    }
    for report in summary.reports.iter().filter(|r| !r.basho_recorded || r.rikishi_failed > 0) {
        println!("⚠️  {}", report.summary());
    }
    if summary.total_failed() > 0 {
        println!("⚠️  Failed deliveries: {}", summary.total_failed());
    }
    if !summary.skipped.is_empty() {
        println!("⚠️  Skipped (no bashoId): {}", summary.skipped.len());
    }
    for (path, reason) in &summary.rejected {
        println!("❌ Rejected {}: {}", path.display(), reason);
    }

    Ok(())
}

fn run_reconstruct(path: &Path) -> Result<()> {
    let snapshot = BashoSnapshot::from_path(path)
        .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
    let set = reconstruct_bouts(&snapshot);

    let payloads: Vec<_> = set.iter().map(|bout| bout.payload()).collect();
    println!("{}", serde_json::to_string_pretty(&payloads)?);

    log::info!(
        "basho {}: {} matched, {} unmatched",
        set.basho_id,
        set.matched.len(),
        set.unmatched.len()
    );
    Ok(())
}

fn open_store(config: &Config) -> Result<Connection> {
    if !config.db_path.exists() {
        anyhow::bail!(
            "Database not found at {} (run `sumo-bouts ingest` first)",
            config.db_path.display()
        );
    }
    let conn = Connection::open(&config.db_path)?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_export(config: &Config, basho_id: &str) -> Result<()> {
    let conn = open_store(config)?;
    let bouts = get_bouts_for_basho(&conn, basho_id)?;

    let mut writer = csv::Writer::from_writer(io::stdout());
    for bout in &bouts {
        writer.serialize(bout.payload())?;
    }
    writer.flush()?;

    log::info!("Exported {} bouts for basho {}", bouts.len(), basho_id);
    Ok(())
}

fn run_stats(config: &Config) -> Result<()> {
    let conn = open_store(config)?;

    println!("{:<8} {:>7} {:>8} {:>10}", "basho", "bouts", "matched", "unmatched");
    for stat in get_basho_stats(&conn)? {
        println!(
            "{:<8} {:>7} {:>8} {:>10}",
            stat.basho_id, stat.bout_count, stat.matched_count, stat.unmatched_count
        );
    }

    Ok(())
}
