//! Pipeline orchestrator: sequences ingestion and the downstream SQL stages
//! with fail-fast semantics.
//!
//!   [ingest?] -> transform -> load_facts -> quality_checks
//!             -> reporting_views -> summary
//!
//! A stage error aborts everything after it; nothing is rolled back. The
//! summary is the one exception: its queries are independent and
//! best-effort.

use crate::error::{PipelineError, Result};
use crate::ingest::{ApiIngestor, CsvIngestor};
use crate::storage::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// The mandatory SQL stages, in execution order. Each entry is
/// (stage name, script file under the scripts directory).
const SQL_STAGES: &[(&str, &str)] = &[
    ("transform", "transform_events.sql"),
    ("load_facts", "load_facts.sql"),
    ("quality_checks", "data_quality.sql"),
    ("reporting_views", "reporting_views.sql"),
];

/// Read-only warehouse counts reported after a successful run.
const SUMMARY_QUERIES: &[(&str, &str)] = &[
    ("Total staged events", "SELECT COUNT(*) FROM staging_events"),
    (
        "Unprocessed staged events",
        "SELECT COUNT(*) FROM staging_events WHERE is_processed = 0",
    ),
    ("Fact events loaded", "SELECT COUNT(*) FROM fact_events"),
    ("Unique venues", "SELECT COUNT(*) FROM dim_venue"),
    ("Unique categories", "SELECT COUNT(*) FROM dim_category"),
    ("Quality checks run", "SELECT COUNT(*) FROM quality_log"),
    (
        "Failed quality checks",
        "SELECT COUNT(*) FROM quality_log WHERE status = 'failed'",
    ),
];

/// The optional ingestion stage, pre-built by the caller so credential
/// checks happen before the pipeline starts.
pub enum IngestStage {
    Csv(CsvIngestor),
    Api {
        ingestor: ApiIngestor,
        region_code: String,
        max_pages: u32,
    },
}

#[derive(Debug)]
pub struct PipelineResult {
    pub records_ingested: Option<usize>,
    pub stages_completed: Vec<&'static str>,
}

pub struct Pipeline {
    storage: Arc<dyn Storage>,
    scripts_dir: PathBuf,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn Storage>, scripts_dir: PathBuf) -> Self {
        Self {
            storage,
            scripts_dir,
        }
    }

    /// Run the full stage sequence. `ingest: None` means the ingestion stage
    /// was explicitly skipped; the SQL stages are never optional.
    pub async fn run(&self, ingest: Option<IngestStage>) -> Result<PipelineResult> {
        let mut result = PipelineResult {
            records_ingested: None,
            stages_completed: Vec::new(),
        };

        match ingest {
            Some(IngestStage::Csv(ingestor)) => {
                info!("▶ Stage ingest | source=file");
                result.records_ingested = Some(ingestor.ingest().await?);
            }
            Some(IngestStage::Api {
                ingestor,
                region_code,
                max_pages,
            }) => {
                info!("▶ Stage ingest | source=api region={}", region_code);
                result.records_ingested = Some(ingestor.ingest(&region_code, max_pages).await?);
            }
            None => {
                info!("Skipping ingestion stage");
            }
        }

        for (stage, script_file) in SQL_STAGES.iter().copied() {
            self.run_sql_stage(stage, script_file).await?;
            result.stages_completed.push(stage);
        }

        self.report_summary().await;
        Ok(result)
    }

    /// Execute one opaque SQL script. The orchestrator only interprets
    /// success or failure, never the script's contents.
    async fn run_sql_stage(&self, stage: &str, script_file: &str) -> Result<()> {
        let path = self.scripts_dir.join(script_file);
        info!("▶ Stage {} | script={}", stage, path.display());

        let sql = std::fs::read_to_string(&path).map_err(|e| PipelineError::Stage {
            stage: stage.to_string(),
            message: format!("cannot read script '{}': {}", path.display(), e),
        })?;

        self.storage
            .execute_script(&sql)
            .await
            .map_err(|e| PipelineError::Stage {
                stage: stage.to_string(),
                message: e.to_string(),
            })?;

        info!("Stage {} complete", stage);
        Ok(())
    }

    /// Log warehouse counts. Each query is independent: one failing query is
    /// reported inline and the rest still run.
    pub async fn report_summary(&self) {
        info!("{}", "=".repeat(55));
        info!("  PIPELINE SUMMARY");
        info!("{}", "=".repeat(55));
        for (label, query) in SUMMARY_QUERIES {
            match self.storage.aggregate_count(query).await {
                Ok(count) => info!("  {:<28} {:>10}", label, count),
                Err(e) => warn!("  {:<28} ERROR: {}", label, e),
            }
        }
        info!("{}", "=".repeat(55));
    }
}
