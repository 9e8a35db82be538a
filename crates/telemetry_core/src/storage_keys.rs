use chrono::{Datelike, NaiveDate};

/// Partition prefix for landed analytics records. The layout is consumed
/// downstream as-is, so the segment spelling must not change.
pub fn record_partition_prefix(account_id: i64, date: NaiveDate) -> String {
    format!(
        "records/account={account_id}/year={:04}/month={:02}/day={:02}",
        date.year(),
        date.month(),
        date.day()
    )
}

pub fn record_object_key(account_id: i64, date: NaiveDate, object_name: &str) -> String {
    format!(
        "{}/{object_name}",
        record_partition_prefix(account_id, date)
    )
}

/// Records whose metadata extraction failed land here instead of being
/// dropped.
pub fn error_object_key(error_kind: &str, object_name: &str) -> String {
    format!("error/{}/{object_name}", error_kind.trim_matches('/'))
}
