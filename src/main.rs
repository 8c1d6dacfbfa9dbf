use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use parliament_interests::config::PipelineConfig;
use parliament_interests::logging;
use parliament_interests::members::load_members;
use parliament_interests::metrics;
use parliament_interests::pipeline::InterestsPipeline;
use parliament_interests::storage::SqliteStore;

#[derive(Parser)]
#[command(name = "parliament_interests")]
#[command(about = "Extracts and stores UK Parliament registered interests")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a Registered Interests dump
    Import {
        /// File of JSON objects separated by blank lines
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        database: Option<PathBuf>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        error_file: Option<PathBuf>,
        /// Write a Prometheus text snapshot here when the run ends
        #[arg(long)]
        metrics_file: Option<PathBuf>,
        /// Only warn when none of the known abbreviated amounts appear
        #[arg(long)]
        lenient_abbreviations: bool,
    },
    /// Load the member directory from a Members API dump
    LoadMembers {
        file: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        database: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>, database: Option<PathBuf>) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load(path).context("loading configuration")?;
    if let Some(database) = database {
        config.database_path = database;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            file,
            config,
            database,
            batch_size,
            error_file,
            metrics_file,
            lenient_abbreviations,
        } => {
            let mut config = load_config(config.as_deref(), database)?;
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if let Some(error_file) = error_file {
                config.error_file = error_file;
            }
            if metrics_file.is_some() {
                config.metrics_file = metrics_file;
            }
            if lenient_abbreviations {
                config.strict_abbreviations = false;
            }
            config.validate()?;

            let _guard = logging::init_logging(&config.log_dir);
            let prometheus = config.metrics_file.as_ref().and_then(|_| metrics::init_metrics());

            println!("🔄 Importing registered interests from {}...", file.display());
            let mut store = SqliteStore::open(&config.database_path)?;
            let outcome = InterestsPipeline::new(&mut store, config.clone()).run(&file);

            if let (Some(handle), Some(path)) = (&prometheus, &config.metrics_file) {
                if let Err(e) = metrics::write_snapshot(handle, path) {
                    warn!("Failed to write metrics snapshot: {}", e);
                }
            }

            match outcome {
                Ok(result) => {
                    println!("\n📊 Import results (run {}):", result.run_id);
                    println!("   Members read: {}", result.members_read);
                    println!("   Members skipped: {}", result.members_skipped);
                    println!("   Rows flattened: {}", result.rows_flattened);
                    println!("   Rows with amounts: {}", result.rows_with_amounts);
                    println!("   Records created: {}", result.records_created);
                    println!("   Errors: {}", result.errors.len());
                    if !result.errors.is_empty() {
                        println!("\n⚠️  Errors written to {}", config.error_file.display());
                    }
                }
                Err(e) => {
                    error!("Import failed: {}", e);
                    println!("❌ Import failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::LoadMembers {
            file,
            config,
            database,
        } => {
            let config = load_config(config.as_deref(), database)?;
            let _guard = logging::init_logging(&config.log_dir);

            println!("👥 Loading members from {}...", file.display());
            let mut store = SqliteStore::open(&config.database_path)?;
            let report = load_members(&file, &mut store)?;
            println!("   Added: {}", report.added);
            println!("   Updated: {}", report.updated);
            println!("   Errors: {}", report.errors.len());
        }
    }

    Ok(())
}
