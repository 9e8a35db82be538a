use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use telemetry_core::record::decode_object;

use crate::adapters::object_store::AnalyticsObjectReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectNotification {
    pub bucket: String,
    pub key: String,
}

/// Per-object aggregation output. The real aggregation algorithm is an
/// extension point; the contract here is tolerant decoding plus a summary
/// that is observable through the logs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ObjectSummary {
    pub bucket: String,
    pub key: String,
    pub records: usize,
    pub skipped: usize,
    pub events_by_type: BTreeMap<String, usize>,
    pub records_by_account: BTreeMap<i64, usize>,
}

pub fn is_storage_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:s3")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

pub fn decode_storage_notifications(event: &Value) -> Result<Vec<ObjectNotification>, String> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| "storage event must include Records array".to_string())?;

    let mut notifications = Vec::with_capacity(records.len());
    for record in records {
        let bucket = record
            .pointer("/s3/bucket/name")
            .and_then(Value::as_str)
            .ok_or_else(|| "storage record must carry s3.bucket.name".to_string())?;
        let key = record
            .pointer("/s3/object/key")
            .and_then(Value::as_str)
            .ok_or_else(|| "storage record must carry s3.object.key".to_string())?;
        notifications.push(ObjectNotification {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
    }

    Ok(notifications)
}

/// Invoked once per created object. A failed read or undecodable object is
/// logged and skipped so one bad object never blocks the rest; notifications
/// carry no cross-object ordering.
pub fn handle_storage_event(
    event: &Value,
    reader: &dyn AnalyticsObjectReader,
) -> Result<Vec<ObjectSummary>, String> {
    let notifications = decode_storage_notifications(event)?;

    let mut summaries = Vec::with_capacity(notifications.len());
    for notification in notifications {
        match summarize_object(&notification, reader) {
            Ok(summary) => {
                log_aggregator_info(
                    "object_aggregated",
                    json!({
                        "bucket": summary.bucket,
                        "key": summary.key,
                        "records": summary.records,
                        "skipped": summary.skipped,
                        "eventsByType": summary.events_by_type,
                    }),
                );
                summaries.push(summary);
            }
            Err(error) => {
                log_aggregator_error(
                    "object_failed",
                    json!({
                        "bucket": notification.bucket,
                        "key": notification.key,
                        "error": error,
                    }),
                );
            }
        }
    }

    Ok(summaries)
}

pub fn summarize_object(
    notification: &ObjectNotification,
    reader: &dyn AnalyticsObjectReader,
) -> Result<ObjectSummary, String> {
    let body = reader.read_object(&notification.bucket, &notification.key)?;
    if body.is_empty() {
        return Err("object body is empty".to_string());
    }

    let decoded = decode_object(&body)?;
    for skipped in &decoded.skipped {
        log_aggregator_error(
            "record_skipped",
            json!({
                "key": notification.key,
                "line": skipped.line,
                "error": skipped.error,
            }),
        );
    }

    let mut events_by_type = BTreeMap::new();
    let mut records_by_account = BTreeMap::new();
    for record in &decoded.records {
        *events_by_type
            .entry(record.event_type.clone())
            .or_insert(0) += 1;
        *records_by_account.entry(record.context.account_id).or_insert(0) += 1;
    }

    Ok(ObjectSummary {
        bucket: notification.bucket.clone(),
        key: notification.key.clone(),
        records: decoded.records.len(),
        skipped: decoded.skipped.len(),
        events_by_type,
        records_by_account,
    })
}

fn log_aggregator_info(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "aggregator_handler",
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_aggregator_error(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "aggregator_handler",
            "level": "error",
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
