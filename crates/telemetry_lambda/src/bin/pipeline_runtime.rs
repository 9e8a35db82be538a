//! Local in-process rendition of the full pipeline: the ingest handler runs
//! against an in-memory lead queue and batching sink, landed objects are
//! written to a local directory, and both consumers drain afterwards. Reads
//! one JSON envelope per stdin line.

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value};
use telemetry_core::queue::{EnqueueOutcome, LeadQueue, LeadQueueConfig};
use telemetry_core::sink::{AnalyticsSink, LandedObject, SinkConfig};
use telemetry_lambda::adapters::object_store::AnalyticsObjectReader;
use telemetry_lambda::adapters::queue::LeadQueueClient;
use telemetry_lambda::adapters::stream::AnalyticsStreamClient;
use telemetry_lambda::handlers::aggregator::handle_storage_event;
use telemetry_lambda::handlers::ingest::{handle_ingest_event, IngestTargets};
use telemetry_lambda::handlers::lead::{process_lead_record, QueueRecord};

const LOCAL_BUCKET: &str = "local-analytics";

struct InMemoryLeadQueue {
    queue: Mutex<LeadQueue>,
}

impl LeadQueueClient for InMemoryLeadQueue {
    fn send_message(&self, group_key: &str, body: &str) -> Result<(), String> {
        let outcome = self
            .queue
            .lock()
            .map_err(|_| "lead queue lock poisoned".to_string())?
            .enqueue(group_key, body, Utc::now());
        if let EnqueueOutcome::Deduplicated {
            original_message_id,
        } = outcome
        {
            eprintln!(
                "{}",
                json!({
                    "component": "pipeline_runtime",
                    "event": "lead_deduplicated",
                    "timestamp": Utc::now().to_rfc3339(),
                    "details": { "originalMessageId": original_message_id },
                })
            );
        }
        Ok(())
    }
}

struct BufferingStream {
    sink: Mutex<AnalyticsSink>,
}

impl AnalyticsStreamClient for BufferingStream {
    fn put_record(&self, data: &[u8]) -> Result<(), String> {
        self.sink
            .lock()
            .map_err(|_| "analytics sink lock poisoned".to_string())?
            .submit(data, Utc::now());
        Ok(())
    }
}

struct FsObjectReader {
    data_dir: PathBuf,
}

impl AnalyticsObjectReader for FsObjectReader {
    fn read_object(&self, _bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        fs::read(self.data_dir.join(key))
            .map_err(|error| format!("failed to read landed object {key}: {error}"))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir =
        PathBuf::from(std::env::var("PIPELINE_DATA_DIR").unwrap_or_else(|_| "pipeline-data".to_string()));
    fs::create_dir_all(&data_dir)?;

    let queue = InMemoryLeadQueue {
        queue: Mutex::new(LeadQueue::new(LeadQueueConfig::default())),
    };
    let stream = BufferingStream {
        sink: Mutex::new(AnalyticsSink::new(SinkConfig::default())),
    };
    let targets = IngestTargets {
        lead_queue_url: "local://lead-queue",
        delivery_stream_name: "local://analytics-stream",
    };

    let stdin = std::io::stdin();
    let mut submitted = 0usize;
    let mut rejected = 0usize;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_ingest_event(
            json!({ "body": line }),
            &targets,
            &queue,
            &stream,
        );
        if response.status_code == 200 {
            submitted += 1;
        } else {
            rejected += 1;
            eprintln!(
                "{}",
                json!({
                    "component": "pipeline_runtime",
                    "level": "error",
                    "event": "ingest_rejected",
                    "timestamp": Utc::now().to_rfc3339(),
                    "details": { "statusCode": response.status_code, "body": response.body },
                })
            );
        }
    }

    let leads = drain_lead_queue(&queue);
    let landed = stream
        .sink
        .lock()
        .map_err(|_| "analytics sink lock poisoned".to_string())?
        .flush_all()?;
    let objects = land_objects(&data_dir, &landed)?;

    let reader = FsObjectReader {
        data_dir: data_dir.clone(),
    };
    let summaries = handle_storage_event(&storage_event(&objects), &reader)?;

    eprintln!(
        "{}",
        json!({
            "component": "pipeline_runtime",
            "event": "run_completed",
            "timestamp": Utc::now().to_rfc3339(),
            "details": {
                "submitted": submitted,
                "rejected": rejected,
                "leadsProcessed": leads,
                "objectsLanded": objects.len(),
                "objectsAggregated": summaries.len(),
            },
        })
    );
    Ok(())
}

fn drain_lead_queue(queue: &InMemoryLeadQueue) -> usize {
    let mut processed = 0usize;
    loop {
        let Ok(mut guard) = queue.queue.lock() else {
            return processed;
        };
        let Some(delivery) = guard.receive(Utc::now()) else {
            return processed;
        };
        let record = QueueRecord {
            message_id: delivery.message_id.to_string(),
            body: delivery.body,
        };
        drop(guard);

        let handled = process_lead_record(&record).is_ok();
        if let Ok(mut guard) = queue.queue.lock() {
            // The local harness has no second consumer, so a poison message
            // is acknowledged rather than left to spin on redelivery.
            guard.acknowledge(delivery.message_id);
        }
        if handled {
            processed += 1;
        }
    }
}

fn land_objects(data_dir: &Path, landed: &[LandedObject]) -> Result<Vec<String>, String> {
    let mut keys = Vec::with_capacity(landed.len());
    for object in landed {
        let path = data_dir.join(&object.key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|error| format!("failed to create partition directory: {error}"))?;
        }
        fs::write(&path, &object.body)
            .map_err(|error| format!("failed to land object {}: {error}", object.key))?;
        keys.push(object.key.clone());
    }
    Ok(keys)
}

fn storage_event(keys: &[String]) -> Value {
    let records: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "eventSource": "aws:s3",
                "s3": {"bucket": {"name": LOCAL_BUCKET}, "object": {"key": key}}
            })
        })
        .collect();
    json!({ "Records": records })
}
