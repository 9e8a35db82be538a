use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::envelope::AnalyticsRecord;

/// Appended to every encoded record before batching so concatenated records
/// stay individually parseable.
pub const RECORD_DELIMITER: u8 = b'\n';

pub fn encode_record(record: &AnalyticsRecord) -> Result<Vec<u8>, String> {
    let mut buffer = serde_json::to_vec(record)
        .map_err(|error| format!("failed to encode analytics record: {error}"))?;
    buffer.push(RECORD_DELIMITER);
    Ok(buffer)
}

pub fn compress_object(body: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(body)
        .map_err(|error| format!("failed to compress analytics object: {error}"))?;
    encoder
        .finish()
        .map_err(|error| format!("failed to finish analytics object compression: {error}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub line: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedObject {
    pub records: Vec<AnalyticsRecord>,
    pub skipped: Vec<SkippedRecord>,
}

/// Decodes a landed analytics object: decompress, split on the record
/// delimiter, parse each line. Malformed or truncated lines are collected
/// as skipped records and never abort the rest of the object.
pub fn decode_object(body: &[u8]) -> Result<DecodedObject, String> {
    let mut decoder = GzDecoder::new(body);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|error| format!("failed to decompress analytics object: {error}"))?;

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for (index, line) in text.split(RECORD_DELIMITER as char).enumerate() {
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<AnalyticsRecord>(line) {
            Ok(record) => records.push(record),
            Err(error) => skipped.push(SkippedRecord {
                line: index + 1,
                error: error.to_string(),
            }),
        }
    }

    Ok(DecodedObject { records, skipped })
}
