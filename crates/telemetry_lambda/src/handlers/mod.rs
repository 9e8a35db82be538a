pub mod aggregator;
pub mod ingest;
pub mod lead;
