use clap::{Parser, ValueEnum};
use event_warehouse::config::Config;
use event_warehouse::db::SqliteStorage;
use event_warehouse::ingest::{generate_sample_csv, ApiIngestor, CsvIngestor};
use event_warehouse::logging;
use event_warehouse::pipeline::{IngestStage, Pipeline};
use event_warehouse::storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "event_warehouse")]
#[command(about = "Event listings ELT pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Data source: api (paginated events API) or csv (local file)
    #[arg(long, value_enum, default_value = "api")]
    source: SourceArg,

    /// Path to CSV file (only used with --source csv)
    #[arg(long, default_value = "sample_events.csv")]
    csv_path: PathBuf,

    /// Generate synthetic CSV data before loading
    #[arg(long)]
    generate_sample: bool,

    /// Skip ingestion and only run transform/load steps
    #[arg(long)]
    skip_ingest: bool,

    /// Country code passed to the events API
    #[arg(long, default_value = "DE")]
    region: String,

    /// Maximum number of API pages to fetch per run
    #[arg(long, default_value_t = 5)]
    max_pages: u32,

    /// Warehouse database file
    #[arg(long, default_value = "data/warehouse.db")]
    db_path: PathBuf,

    /// Directory containing the SQL stage scripts
    #[arg(long, default_value = "scripts")]
    scripts_dir: PathBuf,

    /// Pipeline configuration file (only used with --source api)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Api,
    Csv,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    logging::init_logging();

    let cli = Cli::parse();
    info!("Event warehouse pipeline starting");

    let mut csv_path = cli.csv_path.clone();
    if cli.generate_sample {
        csv_path = generate_sample_csv(&csv_path, 500)?;
    }

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&cli.db_path)?);

    let ingest = if cli.skip_ingest {
        None
    } else {
        Some(match cli.source {
            SourceArg::Csv => IngestStage::Csv(CsvIngestor::new(storage.clone(), csv_path)),
            SourceArg::Api => {
                let config = Config::load(&cli.config)?;
                let api_key = Config::api_key()?;
                IngestStage::Api {
                    ingestor: ApiIngestor::new(storage.clone(), &config.ticketmaster, api_key)?,
                    region_code: cli.region.clone(),
                    max_pages: cli.max_pages,
                }
            }
        })
    };

    let pipeline = Pipeline::new(storage, cli.scripts_dir.clone());
    match pipeline.run(ingest).await {
        Ok(result) => {
            if let Some(records) = result.records_ingested {
                info!("Records ingested: {}", records);
            }
            info!("✅ Pipeline completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Pipeline failed: {}", e);
            Err(e.into())
        }
    }
}
