use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use telemetry_core::envelope::Envelope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub message_id: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LeadReceipt {
    pub session_id: String,
    pub campaign_id: i64,
    pub dedup_identity: String,
    pub form_fields: usize,
}

pub fn is_queue_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

pub fn decode_queue_records(event: &Value) -> Result<Vec<QueueRecord>, String> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| "queue event must include Records array".to_string())?;

    let mut decoded = Vec::with_capacity(records.len());
    for record in records {
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| "queue record body must be a string".to_string())?;
        let message_id = record
            .get("messageId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        decoded.push(QueueRecord {
            message_id: message_id.to_string(),
            body: body.to_string(),
        });
    }

    Ok(decoded)
}

/// Consumes lead queue deliveries (batch size one in deployment). Any error
/// propagates so the message stays unacknowledged and redelivery fires;
/// processing itself is idempotent.
pub fn handle_queue_event(event: &Value) -> Result<Vec<LeadReceipt>, String> {
    let records = decode_queue_records(event)?;
    let mut receipts = Vec::with_capacity(records.len());
    for record in records {
        receipts.push(process_lead_record(&record)?);
    }
    Ok(receipts)
}

/// Acknowledged receipt of one lead message. This is the extension point
/// for downstream lead handling (CRM sync, notification) and must stay
/// idempotent with respect to redelivery.
pub fn process_lead_record(record: &QueueRecord) -> Result<LeadReceipt, String> {
    let envelope: Envelope = serde_json::from_str(&record.body)
        .map_err(|error| format!("invalid lead message body: {error}"))?;

    let Envelope::Lead(lead) = &envelope else {
        return Err(format!(
            "unexpected event type on lead queue: {}",
            envelope.event_type()
        ));
    };

    let receipt = LeadReceipt {
        session_id: lead.context.session_id.clone(),
        campaign_id: lead.campaign_id,
        dedup_identity: envelope
            .dedup_identity()
            .unwrap_or_else(|| lead.context.session_id.clone()),
        form_fields: lead.form_data.len(),
    };
    log_lead_info(
        "lead_received",
        json!({
            "messageId": record.message_id,
            "sessionId": receipt.session_id,
            "campaignId": receipt.campaign_id,
            "dedupId": receipt.dedup_identity,
            "formFields": receipt.form_fields,
        }),
    );
    Ok(receipt)
}

fn log_lead_info(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "lead_handler",
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
