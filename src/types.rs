use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies which ingestor produced a staging row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Api,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::Api => "api",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "file" => Ok(SourceKind::File),
            "api" => Ok(SourceKind::Api),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

/// One normalized event record, pre-transformation.
///
/// `(source, raw_event_id)` is the dedup key: the staging store never holds
/// two rows with the same pair. Prices are carried as strings; coercion to
/// numeric types is deferred to the SQL transform layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRow {
    pub source: SourceKind,
    pub raw_event_id: String,
    pub raw_payload: Option<String>,
    pub event_name: String,
    pub event_date: Option<String>,
    pub event_time: Option<String>,
    pub venue_name: Option<String>,
    pub venue_city: Option<String>,
    pub venue_country: Option<String>,
    pub venue_lat: Option<f64>,
    pub venue_lon: Option<f64>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub currency: Option<String>,
    pub url: Option<String>,
    pub status: Option<String>,
}

/// Lifecycle state of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Audit entry for one ingestion invocation.
///
/// Created in `Running` state before any source I/O, then moved to exactly
/// one terminal state. Terminal records are never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRun {
    pub run_id: Uuid,
    pub source: SourceKind,
    pub records_fetched: usize,
    pub records_loaded: usize,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestionRun {
    pub fn begin(source: SourceKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source,
            records_fetched: 0,
            records_loaded: 0,
            status: RunStatus::Running,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Mark the run successful. A no-op once the run is terminal.
    pub fn succeed(&mut self, records_fetched: usize, records_loaded: usize) {
        if self.is_terminal() {
            return;
        }
        self.records_fetched = records_fetched;
        self.records_loaded = records_loaded;
        self.status = RunStatus::Success;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run failed with the triggering error's message. A no-op once
    /// the run is terminal.
    pub fn fail(&mut self, message: String) {
        if self.is_terminal() {
            return;
        }
        self.status = RunStatus::Failed;
        self.error_message = Some(message);
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_starts_running_with_no_finish_timestamp() {
        let run = IngestionRun::begin(SourceKind::Api);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
        assert!(run.error_message.is_none());
    }

    #[test]
    fn run_success_records_counts_and_finish() {
        let mut run = IngestionRun::begin(SourceKind::File);
        run.succeed(10, 10);
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.records_loaded, 10);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn terminal_run_is_immutable() {
        let mut run = IngestionRun::begin(SourceKind::Api);
        run.fail("page 3 unreachable".to_string());
        let finished = run.finished_at;

        run.succeed(5, 5);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.records_loaded, 0);
        assert_eq!(run.finished_at, finished);
        assert_eq!(run.error_message.as_deref(), Some("page 3 unreachable"));
    }
}
