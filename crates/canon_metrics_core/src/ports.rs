//! Storage port traits for the canonical metrics core.
//! Implemented by canon_metrics_postgres — core logic depends only on these
//! traits, so the same service runs against Postgres or the in-memory
//! harness doubles.

use async_trait::async_trait;

use crate::error::CanonError;
use crate::types::*;

pub type Result<T> = std::result::Result<T, CanonError>;

/// Default row cap for "current value" dashboard widgets.
pub const DEFAULT_LATEST_LIMIT: i64 = 10;

/// Catalog entries — named metric definitions.
#[async_trait]
pub trait MetricCatalogStore: Send + Sync {
    /// All catalog entries, no filtering.
    async fn list_metrics(&self) -> Result<Vec<CanonicalMetric>>;

    /// Maybe-read by key.
    async fn get_metric(&self, metric_key: &str) -> Result<Option<CanonicalMetric>>;

    /// Insert a new catalog entry.
    /// Fails with `DuplicateKey` if `metric_key` already exists.
    async fn create_metric(&self, metric: NewMetric) -> Result<CanonicalMetric>;

    /// Partial update of name/description/tags; other fields are immutable.
    /// Fails with `NotFound` for a missing key.
    async fn update_metric(&self, metric_key: &str, patch: UpdateMetric)
        -> Result<CanonicalMetric>;
}

/// Versioned metric specifications.
#[async_trait]
pub trait MetricVersionStore: Send + Sync {
    /// All versions, optionally filtered to one metric; newest-created-first.
    async fn list_versions(&self, metric_key: Option<&str>)
        -> Result<Vec<CanonicalMetricVersion>>;

    /// Maybe-read by key.
    async fn get_version(
        &self,
        metric_version_key: &str,
    ) -> Result<Option<CanonicalMetricVersion>>;

    /// Insert a new version. Fails with `DuplicateKey` on an existing
    /// `metric_version_key` and `ForeignKey` on a missing parent metric.
    /// Version-number monotonicity is the caller's responsibility.
    async fn create_version(&self, version: NewMetricVersion) -> Result<CanonicalMetricVersion>;

    /// Partial update of mutable fields, stamping `updated_at`. Only fields
    /// explicitly provided are applied — no accidental null-outs.
    /// Fails with `NotFound` for a missing key.
    async fn update_version(
        &self,
        metric_version_key: &str,
        patch: UpdateMetricVersion,
    ) -> Result<CanonicalMetricVersion>;

    /// Versions with `is_active = true`, joined with the parent metric's
    /// tags for catalog display; newest-first.
    async fn list_active_versions(&self) -> Result<Vec<ActiveVersion>>;
}

/// Immutable, finalized computed values.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert a finalized result. Fails with `ForeignKey` if
    /// `metric_version_key` does not exist and `DuplicateKey` on an
    /// existing `result_key`.
    async fn insert_result(&self, result: CanonicalResult) -> Result<CanonicalResult>;

    /// Bulk-load path: insert many results in a single transaction —
    /// all rows land or none do.
    async fn insert_results(&self, results: Vec<CanonicalResult>) -> Result<u64>;

    /// Maybe-read by key.
    async fn get_result(&self, result_key: &str) -> Result<Option<CanonicalResult>>;

    /// Rows matching all provided filters (AND semantics), ordered by
    /// `calculated_at` descending. No filter means all rows.
    async fn query_results(&self, filter: &ResultFilter) -> Result<Vec<CanonicalResult>>;

    /// Equality on every supplied grain dimension; extra dimensions on the
    /// stored row are ignored.
    async fn query_by_grain(&self, grain: &GrainFilter) -> Result<Vec<CanonicalResult>>;

    /// Same filter semantics as `query_results`, capped at `limit`,
    /// newest-first.
    async fn latest_results(
        &self,
        metric_version_key: &str,
        org_id: Option<&str>,
        entity_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CanonicalResult>>;
}

/// Append-only holding area for freshly computed values.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Same validation as `ResultStore::insert_result`.
    async fn insert_staging(&self, result: CanonicalStagingResult)
        -> Result<CanonicalStagingResult>;

    async fn list_staging(
        &self,
        metric_version_key: Option<&str>,
    ) -> Result<Vec<CanonicalStagingResult>>;

    /// Move all staged rows for a version into the result store and delete
    /// them, as one atomic unit — a failure partway must leave staging
    /// untouched. Promotion of the same version is serialized; concurrent
    /// callers get at-most-once semantics. Returns the number of rows
    /// promoted; an empty staging set is a no-op returning 0.
    async fn promote(&self, metric_version_key: &str) -> Result<u64>;

    /// Discard staged rows (scoped to a version, or all of them) without
    /// promoting. Returns the number deleted.
    async fn clear_staging(&self, metric_version_key: Option<&str>) -> Result<u64>;
}

/// Derivation edges between finalized results.
#[async_trait]
pub trait LineageStore: Send + Sync {
    /// Record a derivation edge. Fails with `ForeignKey` when either key
    /// does not reference a finalized result (staging rows do not count)
    /// and `DuplicateKey` on an existing (parent, child) pair.
    async fn create_lineage(
        &self,
        parent_result_key: &str,
        child_result_key: &str,
        contribution_weight: Option<rust_decimal::Decimal>,
    ) -> Result<MetricLineage>;

    /// Filter by either or both sides; no filter returns all edges.
    async fn query_lineage(
        &self,
        parent_result_key: Option<&str>,
        child_result_key: Option<&str>,
    ) -> Result<Vec<MetricLineage>>;

    /// Every edge touching any of the given result keys, as parent or
    /// child. Used by hierarchy expansion.
    async fn lineage_for_results(&self, result_keys: &[String]) -> Result<Vec<MetricLineage>>;
}
