use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use telemetry_core::envelope::Envelope;

use crate::adapters::queue::LeadQueueClient;
use crate::adapters::stream::AnalyticsStreamClient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiGatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: Value,
    pub body: String,
}

/// Endpoint identifiers echoed in failure responses so callers can tell
/// which sink rejected the fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestTargets<'a> {
    pub lead_queue_url: &'a str,
    pub delivery_stream_name: &'a str,
}

pub fn handle_ingest_event(
    event: Value,
    targets: &IngestTargets<'_>,
    queue: &dyn LeadQueueClient,
    stream: &dyn AnalyticsStreamClient,
) -> ApiGatewayResponse {
    handle_ingest_event_at(event, Utc::now(), targets, queue, stream)
}

/// Gateway contract: parse the envelope, stamp `createdAt`, submit leads to
/// the lead queue keyed by session, and always submit the stripped analytics
/// record to the delivery stream. The two submissions are not transactional;
/// a failure after a successful submission is reported, never rolled back.
pub fn handle_ingest_event_at(
    event: Value,
    received_at: DateTime<Utc>,
    targets: &IngestTargets<'_>,
    queue: &dyn LeadQueueClient,
    stream: &dyn AnalyticsStreamClient,
) -> ApiGatewayResponse {
    let raw_body = match extract_request_body(&event) {
        Ok(value) => value,
        Err(message) => return request_error_response(&message),
    };

    let mut envelope = match serde_json::from_str::<Envelope>(&raw_body) {
        Ok(value) => value,
        Err(error) => {
            return request_error_response(&format!("Malformed event envelope: {error}"))
        }
    };
    if let Err(error) = envelope.validate() {
        return request_error_response(error.message());
    }
    envelope.stamp_created_at(received_at);

    if envelope.is_lead() {
        // The queue gets the body exactly as received; dedup is content
        // addressed downstream.
        if let Err(error) = queue.send_message(envelope.session_id(), &raw_body) {
            log_ingest_error(
                "lead_enqueue_failed",
                json!({
                    "sessionId": envelope.session_id(),
                    "campaignId": envelope.campaign_id(),
                    "error": error.clone(),
                }),
            );
            return sink_error_response("lead_queue", &error, targets);
        }
        log_ingest_info(
            "lead_enqueued",
            json!({
                "sessionId": envelope.session_id(),
                "dedupId": envelope.dedup_identity(),
            }),
        );
    }

    let record = envelope.analytics_record();
    let data = match serde_json::to_vec(&record) {
        Ok(value) => value,
        Err(error) => {
            return error_response(
                500,
                json!({
                    "message": "Internal server error",
                    "error": format!("failed to serialize analytics record: {error}"),
                }),
            );
        }
    };
    if let Err(error) = stream.put_record(&data) {
        log_ingest_error(
            "analytics_put_failed",
            json!({
                "type": envelope.event_type(),
                "accountId": envelope.account_id(),
                "error": error.clone(),
            }),
        );
        return sink_error_response("analytics_stream", &error, targets);
    }

    log_ingest_info(
        "event_saved",
        json!({
            "type": envelope.event_type(),
            "accountId": envelope.account_id(),
            "sessionId": envelope.session_id(),
        }),
    );
    success_response(json!({"message": "Event saved"}))
}

fn extract_request_body(event: &Value) -> Result<String, String> {
    let Some(object) = event.as_object() else {
        return Err("Request payload must be a JSON object".to_string());
    };

    match object.get("body") {
        None | Some(Value::Null) => Err("Missing body".to_string()),
        Some(Value::String(text)) if text.trim().is_empty() => Err("Missing body".to_string()),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(body @ Value::Object(_)) => Ok(body.to_string()),
        Some(_) => Err("Request body must be a JSON object".to_string()),
    }
}

fn request_error_response(message: &str) -> ApiGatewayResponse {
    error_response(400, json!({"message": message}))
}

fn sink_error_response(
    failed_sink: &str,
    error: &str,
    targets: &IngestTargets<'_>,
) -> ApiGatewayResponse {
    error_response(
        500,
        json!({
            "message": "Internal server error",
            "failedSink": failed_sink,
            "error": error,
            "leadQueueUrl": targets.lead_queue_url,
            "deliveryStreamName": targets.delivery_stream_name,
        }),
    )
}

fn success_response(payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code: 200,
        headers: json!({"Content-Type": "application/json"}),
        body: payload.to_string(),
    }
}

fn error_response(status_code: u16, payload: Value) -> ApiGatewayResponse {
    ApiGatewayResponse {
        status_code,
        headers: json!({"Content-Type": "application/json"}),
        body: payload.to_string(),
    }
}

fn log_ingest_info(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "ingest_handler",
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_ingest_error(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "ingest_handler",
            "level": "error",
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
