use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;

use crate::record::{compress_object, RECORD_DELIMITER};
use crate::storage_keys::{error_object_key, record_object_key};

pub const METADATA_ERROR_KIND: &str = "metadata-extraction-failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub max_batch_records: usize,
    pub max_batch_bytes: usize,
    pub max_batch_age: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_batch_records: 500,
            max_batch_bytes: 1024 * 1024,
            max_batch_age: Duration::seconds(60),
        }
    }
}

/// A flushed batch: gzip-compressed newline-delimited JSON records under a
/// partitioned key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandedObject {
    pub key: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct RecordMetadata {
    #[serde(rename = "accountId")]
    account_id: i64,
}

/// Destination of a buffered batch: a record partition, or the error prefix
/// for records whose metadata extraction failed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Partition {
    Record { account_id: i64, date: NaiveDate },
    Failed { kind: String },
}

impl Partition {
    fn object_key(&self, object_name: &str) -> String {
        match self {
            Self::Record { account_id, date } => {
                record_object_key(*account_id, *date, object_name)
            }
            Self::Failed { kind } => error_object_key(kind, object_name),
        }
    }
}

#[derive(Debug)]
struct PartitionBuffer {
    encoded: Vec<u8>,
    records: usize,
    opened_at: DateTime<Utc>,
}

/// Buffered, batching append channel into partitioned object storage.
///
/// Records are grouped by `accountId` and the UTC date of ingestion; records
/// whose metadata extraction fails are redirected to the error prefix
/// instead of being dropped. Flushing is owned by the sink through its
/// size/age thresholds.
#[derive(Debug)]
pub struct AnalyticsSink {
    config: SinkConfig,
    buffers: BTreeMap<Partition, PartitionBuffer>,
    object_sequence: u64,
}

impl AnalyticsSink {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            buffers: BTreeMap::new(),
            object_sequence: 0,
        }
    }

    /// Accepts one raw record for buffered delivery. Acceptance does not
    /// imply durability; the record lands with a later flush.
    pub fn submit(&mut self, record: &[u8], now: DateTime<Utc>) {
        let partition = match serde_json::from_slice::<RecordMetadata>(record) {
            Ok(metadata) => Partition::Record {
                account_id: metadata.account_id,
                date: now.date_naive(),
            },
            Err(_) => Partition::Failed {
                kind: METADATA_ERROR_KIND.to_string(),
            },
        };

        let buffer = self
            .buffers
            .entry(partition)
            .or_insert_with(|| PartitionBuffer {
                encoded: Vec::new(),
                records: 0,
                opened_at: now,
            });
        buffer.encoded.extend_from_slice(record);
        if record.last() != Some(&RECORD_DELIMITER) {
            buffer.encoded.push(RECORD_DELIMITER);
        }
        buffer.records += 1;
    }

    /// Flushes every buffer over one of the configured thresholds.
    pub fn take_ready(&mut self, now: DateTime<Utc>) -> Result<Vec<LandedObject>, String> {
        let ready: Vec<Partition> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| {
                buffer.records >= self.config.max_batch_records
                    || buffer.encoded.len() >= self.config.max_batch_bytes
                    || now.signed_duration_since(buffer.opened_at) >= self.config.max_batch_age
            })
            .map(|(partition, _)| partition.clone())
            .collect();

        self.flush_partitions(&ready)
    }

    /// Drains all buffers regardless of thresholds.
    pub fn flush_all(&mut self) -> Result<Vec<LandedObject>, String> {
        let partitions: Vec<Partition> = self.buffers.keys().cloned().collect();
        self.flush_partitions(&partitions)
    }

    pub fn buffered_records(&self) -> usize {
        self.buffers.values().map(|buffer| buffer.records).sum()
    }

    fn flush_partitions(&mut self, partitions: &[Partition]) -> Result<Vec<LandedObject>, String> {
        let mut landed = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let Some(buffer) = self.buffers.remove(partition) else {
                continue;
            };
            let object_name = format!("part-{}.json.gz", self.object_sequence);
            self.object_sequence += 1;
            landed.push(LandedObject {
                key: partition.object_key(&object_name),
                body: compress_object(&buffer.encoded)?,
            });
        }
        Ok(landed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::record::decode_object;

    use super::*;

    fn sample_record_json(session_id: &str, account_id: i64) -> String {
        format!(
            concat!(
                r#"{{"type":"pageView","sessionId":"{}","accountId":{},"#,
                r#""location":{{"ip":"203.0.113.9","country":"Germany","region":"Berlin","#,
                r#""city":"Berlin","latitude":"52.52","longitude":"13.40","timezone":"Europe/Berlin"}},"#,
                r#""url":"https://shop.example.com","page":"/","userAgent":"Mozilla/5.0","#,
                r#""device":"desktop","resolution":"xl","os":"linux","browser":"firefox","#,
                r#""language":"de","campaigns":[1,2]}}"#
            ),
            session_id, account_id
        )
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 4, 12, 0, 0)
            .single()
            .expect("timestamp should be valid")
    }

    #[test]
    fn partitions_records_by_account_and_utc_date() {
        let mut sink = AnalyticsSink::new(SinkConfig::default());
        let now = fixed_now();
        sink.submit(sample_record_json("s1", 7).as_bytes(), now);
        sink.submit(sample_record_json("s2", 8).as_bytes(), now);

        let mut landed = sink.flush_all().expect("flush should succeed");
        landed.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(landed.len(), 2);
        assert_eq!(
            landed[0].key,
            "records/account=7/year=2026/month=08/day=04/part-0.json.gz"
        );
        assert_eq!(
            landed[1].key,
            "records/account=8/year=2026/month=08/day=04/part-1.json.gz"
        );
    }

    #[test]
    fn landed_object_round_trips_through_codec() {
        let mut sink = AnalyticsSink::new(SinkConfig::default());
        let now = fixed_now();
        sink.submit(sample_record_json("s1", 7).as_bytes(), now);
        sink.submit(sample_record_json("s2", 7).as_bytes(), now);

        let landed = sink.flush_all().expect("flush should succeed");
        assert_eq!(landed.len(), 1);

        let decoded = decode_object(&landed[0].body).expect("object should decode");
        assert_eq!(decoded.records.len(), 2);
        assert!(decoded.skipped.is_empty());
        assert_eq!(decoded.records[0].campaigns, Some(vec![1, 2]));
    }

    #[test]
    fn record_without_account_metadata_lands_under_error_prefix() {
        let mut sink = AnalyticsSink::new(SinkConfig::default());
        let now = fixed_now();
        sink.submit(br#"{"type":"pageView","sessionId":"s1"}"#, now);

        let landed = sink.flush_all().expect("flush should succeed");
        assert_eq!(landed.len(), 1);
        assert_eq!(
            landed[0].key,
            "error/metadata-extraction-failed/part-0.json.gz"
        );
    }

    #[test]
    fn flushes_when_record_threshold_is_reached() {
        let mut sink = AnalyticsSink::new(SinkConfig {
            max_batch_records: 2,
            ..SinkConfig::default()
        });
        let now = fixed_now();

        sink.submit(sample_record_json("s1", 7).as_bytes(), now);
        assert!(sink.take_ready(now).expect("take_ready").is_empty());

        sink.submit(sample_record_json("s2", 7).as_bytes(), now);
        let landed = sink.take_ready(now).expect("take_ready");
        assert_eq!(landed.len(), 1);
        assert_eq!(sink.buffered_records(), 0);
    }

    #[test]
    fn flushes_when_buffer_age_exceeds_threshold() {
        let mut sink = AnalyticsSink::new(SinkConfig::default());
        let now = fixed_now();
        sink.submit(sample_record_json("s1", 7).as_bytes(), now);

        assert!(sink
            .take_ready(now + Duration::seconds(30))
            .expect("take_ready")
            .is_empty());
        let landed = sink
            .take_ready(now + Duration::seconds(61))
            .expect("take_ready");
        assert_eq!(landed.len(), 1);
    }

    #[test]
    fn object_names_are_sequenced_across_flushes() {
        let mut sink = AnalyticsSink::new(SinkConfig::default());
        let now = fixed_now();
        sink.submit(sample_record_json("s1", 7).as_bytes(), now);
        let first = sink.flush_all().expect("flush should succeed");
        sink.submit(sample_record_json("s2", 7).as_bytes(), now);
        let second = sink.flush_all().expect("flush should succeed");

        assert!(first[0].key.ends_with("part-0.json.gz"));
        assert!(second[0].key.ends_with("part-1.json.gz"));
    }
}
