use anyhow::Result;
use event_warehouse::config::TicketmasterConfig;
use event_warehouse::error::PipelineError;
use event_warehouse::ingest::ApiIngestor;
use event_warehouse::storage::InMemoryStorage;
use event_warehouse::types::{RunStatus, SourceKind};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page_body(ids: &[&str], number: u32, total_pages: u32) -> Value {
    let events: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "name": format!("Event {}", id),
                "dates": { "start": { "localDate": "2026-10-01" } }
            })
        })
        .collect();
    json!({
        "_embedded": { "events": events },
        "page": { "size": ids.len(), "number": number, "totalPages": total_pages }
    })
}

fn empty_body() -> Value {
    json!({ "page": { "size": 0, "number": 1, "totalPages": 1 } })
}

fn config_for(server: &MockServer) -> TicketmasterConfig {
    TicketmasterConfig {
        base_url: format!("{}/events.json", server.uri()),
        page_size: 100,
        timeout_seconds: 5,
    }
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn stops_at_server_reported_last_page() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events.json"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["A1", "A2"], 0, 2)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["B1"], 1, 2)))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let ingestor = ApiIngestor::new(storage.clone(), &config_for(&server), "test-key".into())?;

    let loaded = ingestor.ingest("DE", 5).await?;
    assert_eq!(loaded, 3);
    // totalPages = 2, so pages 2..4 are never requested.
    assert_eq!(request_count(&server).await, 2);

    assert_eq!(storage.staging_rows().len(), 3);
    let runs = storage.ingestion_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].records_loaded, 3);
    Ok(())
}

#[tokio::test]
async fn stops_when_a_page_returns_no_events() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events.json"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["A1"], 0, 10)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(empty_body()))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let ingestor = ApiIngestor::new(storage.clone(), &config_for(&server), "test-key".into())?;

    let loaded = ingestor.ingest("DE", 5).await?;
    assert_eq!(loaded, 1);
    assert_eq!(request_count(&server).await, 2);
    Ok(())
}

#[tokio::test]
async fn never_requests_more_than_max_pages() -> Result<()> {
    let server = MockServer::start().await;
    for page in 0..3u32 {
        Mock::given(method("GET"))
            .and(path("/events.json"))
            .and(query_param("page", page.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(
                &[format!("P{}", page).as_str()],
                page,
                100,
            )))
            .mount(&server)
            .await;
    }

    let storage = Arc::new(InMemoryStorage::new());
    let ingestor = ApiIngestor::new(storage.clone(), &config_for(&server), "test-key".into())?;

    let loaded = ingestor.ingest("DE", 2).await?;
    assert_eq!(loaded, 2);
    assert_eq!(request_count(&server).await, 2);
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_fail_the_run_but_keep_earlier_pages() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events.json"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(&["A1", "A2"], 0, 3)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let ingestor = ApiIngestor::new(storage.clone(), &config_for(&server), "test-key".into())?;

    let err = ingestor.ingest("DE", 3).await.unwrap_err();
    assert!(matches!(err, PipelineError::SourceUnavailable(_)));

    // One request for page 0, three attempts for page 1.
    assert_eq!(request_count(&server).await, 4);

    // Page 0 rows stay committed; the run is terminal and failed.
    let rows = storage.staging_rows();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.source == SourceKind::Api));

    let runs = storage.ingestion_runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error_message.as_deref().unwrap().contains("page 1"));
    assert!(runs[0].finished_at.is_some());
    Ok(())
}

#[tokio::test]
async fn malformed_event_aborts_the_run() -> Result<()> {
    let server = MockServer::start().await;
    let mut body = page_body(&["A1"], 0, 1);
    body["_embedded"]["events"][0]["id"] = json!(null);
    Mock::given(method("GET"))
        .and(path("/events.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let storage = Arc::new(InMemoryStorage::new());
    let ingestor = ApiIngestor::new(storage.clone(), &config_for(&server), "test-key".into())?;

    let err = ingestor.ingest("DE", 1).await.unwrap_err();
    assert!(matches!(err, PipelineError::MalformedRecord(_)));
    assert!(storage.staging_rows().is_empty());
    assert_eq!(storage.ingestion_runs()[0].status, RunStatus::Failed);
    Ok(())
}
