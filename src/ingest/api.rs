//! API-based ingestor: pulls event pages from the remote discovery endpoint
//! and lands them in staging, one page at a time.
//!
//! Pages are fetched and committed strictly in ascending order, so a failed
//! page leaves everything before it durable in the store.

use crate::config::TicketmasterConfig;
use crate::error::{PipelineError, Result};
use crate::normalize::normalize_api_event;
use crate::storage::Storage;
use crate::types::{IngestionRun, SourceKind};
use metrics::{counter, histogram};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MAX_FETCH_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 2;
const BACKOFF_CAP_SECS: u64 = 10;

pub struct ApiIngestor {
    storage: Arc<dyn Storage>,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl ApiIngestor {
    /// The credential is validated here, once, so a misconfigured deployment
    /// fails before any run record or network traffic exists.
    pub fn new(
        storage: Arc<dyn Storage>,
        config: &TicketmasterConfig,
        api_key: String,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(PipelineError::Config(
                "API credential must not be empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            storage,
            client,
            base_url: config.base_url.clone(),
            api_key,
            page_size: config.page_size,
        })
    }

    /// Full ingestion run: fetch -> normalize -> load, page by page.
    ///
    /// Stops early when a page comes back empty or the server-reported last
    /// page is reached. The reported loaded count equals the number of
    /// normalized records; rows the store skipped as duplicates are not
    /// subtracted.
    pub async fn ingest(&self, region_code: &str, max_pages: u32) -> Result<usize> {
        let mut run = IngestionRun::begin(SourceKind::Api);
        self.storage.create_ingestion_run(&run).await?;

        match self.fetch_all_pages(region_code, max_pages).await {
            Ok(total_loaded) => {
                run.succeed(total_loaded, total_loaded);
                self.storage.update_ingestion_run(&run).await?;
                info!("Ingestion complete. Total records: {}", total_loaded);
                Ok(total_loaded)
            }
            Err(e) => {
                run.fail(e.to_string());
                self.storage.update_ingestion_run(&run).await?;
                Err(e)
            }
        }
    }

    async fn fetch_all_pages(&self, region_code: &str, max_pages: u32) -> Result<usize> {
        let mut total_loaded = 0;

        for page in 0..max_pages {
            info!("Fetching page {} | region={}", page, region_code);
            let body = self.fetch_page(region_code, page).await?;

            let events = match body["_embedded"]["events"].as_array() {
                Some(events) if !events.is_empty() => events.clone(),
                _ => {
                    info!("No more events found, stopping early.");
                    break;
                }
            };

            let rows = events
                .iter()
                .map(normalize_api_event)
                .collect::<Result<Vec<_>>>()?;
            let inserted = self.storage.insert_staging_rows(&rows).await?;
            total_loaded += rows.len();
            counter!("ingest_records_loaded_total").increment(rows.len() as u64);
            info!("Page {}: loaded {} records ({} new)", page, rows.len(), inserted);

            // Stop once we've hit the server-reported last page.
            let total_pages = body["page"]["totalPages"].as_u64().unwrap_or(1);
            if u64::from(page) >= total_pages.saturating_sub(1) {
                break;
            }
        }

        Ok(total_loaded)
    }

    /// Fetch one page, retrying transient failures with exponential backoff.
    async fn fetch_page(&self, region_code: &str, page: u32) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = std::time::Instant::now();
            match self.try_fetch_page(region_code, page).await {
                Ok(body) => {
                    counter!("ingest_pages_fetched_total").increment(1);
                    histogram!("ingest_page_fetch_seconds")
                        .record(started.elapsed().as_secs_f64());
                    return Ok(body);
                }
                Err(e) if attempt < MAX_FETCH_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        "Page {} fetch attempt {}/{} failed: {} (retrying in {}s)",
                        page,
                        attempt,
                        MAX_FETCH_ATTEMPTS,
                        e,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    counter!("ingest_page_fetch_errors_total").increment(1);
                    return Err(PipelineError::SourceUnavailable(format!(
                        "page {} fetch failed after {} attempts: {}",
                        page, MAX_FETCH_ATTEMPTS, e
                    )));
                }
            }
        }
    }

    async fn try_fetch_page(&self, region_code: &str, page: u32) -> Result<Value> {
        let page_size = self.page_size.to_string();
        let page_number = page.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("countryCode", region_code),
                ("size", page_size.as_str()),
                ("page", page_number.as_str()),
                ("sort", "date,asc"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "HTTP {} from events API",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        Ok(body)
    }
}

/// Exponential backoff: 2s, 4s, 8s, ... capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let secs = BACKOFF_BASE_SECS
        .saturating_pow(attempt)
        .clamp(BACKOFF_BASE_SECS, BACKOFF_CAP_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn test_config() -> TicketmasterConfig {
        TicketmasterConfig {
            base_url: "https://api.example.com/events.json".to_string(),
            page_size: 100,
            timeout_seconds: 15,
        }
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(4), Duration::from_secs(10));
        assert_eq!(backoff_delay(10), Duration::from_secs(10));
    }

    #[test]
    fn construction_requires_a_credential() {
        let storage = Arc::new(InMemoryStorage::new());
        assert!(matches!(
            ApiIngestor::new(storage.clone(), &test_config(), "  ".to_string()),
            Err(PipelineError::Config(_))
        ));

        assert!(ApiIngestor::new(storage, &test_config(), "key".to_string()).is_ok());
    }
}
