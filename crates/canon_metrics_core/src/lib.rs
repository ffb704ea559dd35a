//! Canonical metrics core — pure domain types, port traits, and the domain
//! service for a versioned, multi-tenant metric catalog with a
//! staging→promotion workflow and a lineage graph between finalized results.
//!
//! This crate has no database dependency; `canon_metrics_postgres`
//! implements the port traits with sqlx, and `canon_metrics_harness`
//! provides in-memory doubles for tests.

// Several enums intentionally use `from_str() -> Option<Self>` instead of
// `FromStr` because they return None for unknown values rather than an error.
#![allow(clippy::should_implement_trait)]

pub mod error;
pub mod grain;
pub mod metadata;
pub mod ports;
pub mod result_value;
pub mod service;
pub mod types;

pub use error::CanonError;
pub use grain::{GrainDimension, GrainKeys};
pub use metadata::MetadataPolicy;
pub use result_value::ResultValue;
pub use service::CanonMetricsService;
