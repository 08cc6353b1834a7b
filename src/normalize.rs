//! Row Normalizer: maps one source-native record (API event object or CSV
//! row) into the canonical `StagingRow` shape.
//!
//! Only the source-native event id and the event name are load-bearing.
//! Every other field degrades to `None` when absent; a field that is present
//! but unparsable is a `MalformedRecord` error, which aborts the batch.

use crate::error::{PipelineError, Result};
use crate::types::{SourceKind, StagingRow};
use serde::Deserialize;
use serde_json::Value;

/// One row of the fixed CSV column set. Empty cells deserialize to `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvEventRecord {
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub event_date: Option<String>,
    pub event_time: Option<String>,
    pub venue_name: Option<String>,
    pub venue_city: Option<String>,
    pub venue_country: Option<String>,
    pub venue_lat: Option<String>,
    pub venue_lon: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub currency: Option<String>,
    pub url: Option<String>,
    pub status: Option<String>,
}

/// Normalize one event object from the paginated API.
///
/// The raw JSON document is preserved verbatim in `raw_payload`.
pub fn normalize_api_event(event: &Value) -> Result<StagingRow> {
    let raw_event_id = event["id"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| PipelineError::MalformedRecord("missing event id".into()))?;
    let event_name = event["name"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| PipelineError::MalformedRecord("missing event name".into()))?;

    let venue = &event["_embedded"]["venues"][0];
    let classification = &event["classifications"][0];
    let price = &event["priceRanges"][0];
    let dates = &event["dates"]["start"];
    let location = &venue["location"];

    Ok(StagingRow {
        source: SourceKind::Api,
        raw_event_id: raw_event_id.to_string(),
        raw_payload: Some(event.to_string()),
        event_name: event_name.to_string(),
        event_date: opt_string(&dates["localDate"]),
        event_time: opt_string(&dates["localTime"]),
        venue_name: opt_string(&venue["name"]),
        venue_city: opt_string(&venue["city"]["name"]),
        venue_country: opt_string(&venue["country"]["name"]),
        venue_lat: opt_coordinate(&location["latitude"], "venue latitude")?,
        venue_lon: opt_coordinate(&location["longitude"], "venue longitude")?,
        category: opt_string(&classification["segment"]["name"]),
        subcategory: opt_string(&classification["genre"]["name"]),
        price_min: opt_price(&price["min"]),
        price_max: opt_price(&price["max"]),
        currency: opt_string(&price["currency"]),
        url: opt_string(&event["url"]),
        status: opt_string(&event["dates"]["status"]["code"]),
    })
}

/// Normalize one CSV row. CSV rows carry no raw payload.
pub fn normalize_csv_record(record: &CsvEventRecord) -> Result<StagingRow> {
    let raw_event_id = non_empty(&record.event_id)
        .ok_or_else(|| PipelineError::MalformedRecord("missing event_id".into()))?;
    let event_name = non_empty(&record.event_name)
        .ok_or_else(|| PipelineError::MalformedRecord("missing event_name".into()))?;

    Ok(StagingRow {
        source: SourceKind::File,
        raw_event_id,
        raw_payload: None,
        event_name,
        event_date: non_empty(&record.event_date),
        event_time: non_empty(&record.event_time),
        venue_name: non_empty(&record.venue_name),
        venue_city: non_empty(&record.venue_city),
        venue_country: non_empty(&record.venue_country),
        venue_lat: parse_coordinate(&record.venue_lat, "venue_lat")?,
        venue_lon: parse_coordinate(&record.venue_lon, "venue_lon")?,
        category: non_empty(&record.category),
        subcategory: non_empty(&record.subcategory),
        price_min: non_empty(&record.price_min),
        price_max: non_empty(&record.price_max),
        currency: non_empty(&record.currency),
        url: non_empty(&record.url),
        status: non_empty(&record.status),
    })
}

fn opt_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Price fields arrive as JSON numbers or strings depending on the source;
/// both are carried forward as strings.
fn opt_price(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Coordinates arrive as JSON strings or numbers. Absent is fine; present
/// but unparsable is not.
fn opt_coordinate(value: &Value, field: &str) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            PipelineError::MalformedRecord(format!("invalid {}: '{}'", field, s))
        }),
        other => Err(PipelineError::MalformedRecord(format!(
            "invalid {}: {}",
            field, other
        ))),
    }
}

fn parse_coordinate(value: &Option<String>, field: &str) -> Result<Option<f64>> {
    match non_empty(value) {
        None => Ok(None),
        Some(s) => s.parse::<f64>().map(Some).map_err(|_| {
            PipelineError::MalformedRecord(format!("invalid {}: '{}'", field, s))
        }),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
