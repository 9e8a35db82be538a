//! AWS-oriented adapters and handlers for the telemetry ingestion pipeline.
//!
//! This crate owns runtime integration details (Lambda handlers, queue and
//! delivery-stream dispatch, storage reads) as pure functions over narrow
//! adapter traits; the binaries under `src/bin` wire the AWS SDK clients and
//! a local in-process runtime against those traits.

pub mod adapters;
pub mod handlers;
