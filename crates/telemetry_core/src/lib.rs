//! Shared telemetry pipeline domain primitives.
//!
//! This crate owns the event envelope contract, the analytics record codec,
//! partitioned storage keys, and the delivery models for the two sinks (the
//! session-ordered lead queue and the batching analytics sink). It
//! intentionally excludes AWS SDK and Lambda runtime concerns.

pub mod envelope;
pub mod queue;
pub mod record;
pub mod sink;
pub mod storage_keys;
