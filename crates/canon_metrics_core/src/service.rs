//! CanonMetricsService — the domain service over the storage ports.
//!
//! Takes port traits via `Arc<dyn PortTrait>` so the same logic works
//! against Postgres or the harness test doubles. Constructed once at
//! startup and handed to callers by reference — no ambient singletons.
//!
//! All write paths validate before any mutation is attempted: grain
//! completeness, result-type/value compatibility, and the metadata policy.
//! The one-of value invariant is structural in `ResultValue` and re-checked
//! as a column CHECK at the storage boundary.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::CanonError;
use crate::metadata::{self, MetadataPolicy};
use crate::ports::{
    LineageStore, MetricCatalogStore, MetricVersionStore, Result, ResultStore, StagingStore,
    DEFAULT_LATEST_LIMIT,
};
use crate::types::*;

pub struct CanonMetricsService {
    pub metrics: Arc<dyn MetricCatalogStore>,
    pub versions: Arc<dyn MetricVersionStore>,
    pub results: Arc<dyn ResultStore>,
    pub staging: Arc<dyn StagingStore>,
    pub lineage: Arc<dyn LineageStore>,
    metadata_policy: MetadataPolicy,
}

impl CanonMetricsService {
    pub fn new(
        metrics: Arc<dyn MetricCatalogStore>,
        versions: Arc<dyn MetricVersionStore>,
        results: Arc<dyn ResultStore>,
        staging: Arc<dyn StagingStore>,
        lineage: Arc<dyn LineageStore>,
        metadata_policy: MetadataPolicy,
    ) -> Self {
        Self {
            metrics,
            versions,
            results,
            staging,
            lineage,
            metadata_policy,
        }
    }

    // ── Catalog ────────────────────────────────────────────────

    pub async fn list_metrics(&self) -> Result<Vec<CanonicalMetric>> {
        self.metrics.list_metrics().await
    }

    pub async fn create_metric(&self, metric: NewMetric) -> Result<CanonicalMetric> {
        let created = self.metrics.create_metric(metric).await?;
        tracing::info!(metric_key = %created.metric_key, "created canonical metric");
        Ok(created)
    }

    pub async fn update_metric(
        &self,
        metric_key: &str,
        patch: UpdateMetric,
    ) -> Result<CanonicalMetric> {
        self.metrics.update_metric(metric_key, patch).await
    }

    // ── Versions ───────────────────────────────────────────────

    pub async fn list_versions(
        &self,
        metric_key: Option<&str>,
    ) -> Result<Vec<CanonicalMetricVersion>> {
        self.versions.list_versions(metric_key).await
    }

    pub async fn create_version(
        &self,
        version: NewMetricVersion,
    ) -> Result<CanonicalMetricVersion> {
        let created = self.versions.create_version(version).await?;
        tracing::info!(
            metric_version_key = %created.metric_version_key,
            metric_key = %created.metric_key,
            version_number = %created.version_number,
            "created metric version"
        );
        Ok(created)
    }

    pub async fn update_version(
        &self,
        metric_version_key: &str,
        patch: UpdateMetricVersion,
    ) -> Result<CanonicalMetricVersion> {
        self.versions.update_version(metric_version_key, patch).await
    }

    pub async fn list_active_versions(&self) -> Result<Vec<ActiveVersion>> {
        self.versions.list_active_versions().await
    }

    // ── Validation ─────────────────────────────────────────────

    /// Fail-fast checks shared by the result and staging write paths.
    /// Returns the version so callers don't re-fetch it.
    async fn validate_result(&self, result: &CanonicalResult) -> Result<CanonicalMetricVersion> {
        result.grain_keys.validate()?;

        let version = self
            .versions
            .get_version(&result.metric_version_key)
            .await?
            .ok_or_else(|| {
                CanonError::ForeignKey(format!(
                    "metric_version_key '{}' does not exist",
                    result.metric_version_key
                ))
            })?;

        if !result.value.compatible_with(version.result_type) {
            return Err(CanonError::Validation(format!(
                "result value arm '{}' is not compatible with result_type '{}' of version '{}'",
                result.value.kind(),
                version.result_type,
                version.metric_version_key
            )));
        }

        // Grain dimensions outside the version's declared grain spec are
        // tolerated but worth surfacing.
        let declared: HashSet<&str> = version.grain.iter().map(|d| d.name.as_str()).collect();
        for dim in result.grain_keys.0.keys() {
            if !declared.is_empty() && !declared.contains(dim.as_str()) {
                tracing::warn!(
                    result_key = %result.result_key,
                    dimension = %dim,
                    metric_version_key = %version.metric_version_key,
                    "grain dimension not declared in version grain spec"
                );
            }
        }

        metadata::enforce(self.metadata_policy, &version, result.result_metadata.as_ref())?;
        Ok(version)
    }

    // ── Results ────────────────────────────────────────────────

    pub async fn insert_result(&self, result: CanonicalResult) -> Result<CanonicalResult> {
        self.validate_result(&result).await?;
        self.results.insert_result(result).await
    }

    /// Bulk-load path: every row is validated before any row is written.
    pub async fn insert_results(&self, results: Vec<CanonicalResult>) -> Result<u64> {
        for result in &results {
            self.validate_result(result).await?;
        }
        let count = self.results.insert_results(results).await?;
        tracing::info!(count, "bulk-inserted canonical results");
        Ok(count)
    }

    pub async fn query_results(&self, filter: &ResultFilter) -> Result<Vec<CanonicalResult>> {
        self.results.query_results(filter).await
    }

    pub async fn query_by_grain(&self, grain: &GrainFilter) -> Result<Vec<CanonicalResult>> {
        self.results.query_by_grain(grain).await
    }

    pub async fn latest_results(
        &self,
        metric_version_key: &str,
        org_id: Option<&str>,
        entity_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<CanonicalResult>> {
        self.results
            .latest_results(
                metric_version_key,
                org_id,
                entity_id,
                limit.unwrap_or(DEFAULT_LATEST_LIMIT),
            )
            .await
    }

    // ── Staging & promotion ────────────────────────────────────

    pub async fn insert_staging(
        &self,
        result: CanonicalStagingResult,
    ) -> Result<CanonicalStagingResult> {
        self.validate_result(&result).await?;
        self.staging.insert_staging(result).await
    }

    pub async fn list_staging(
        &self,
        metric_version_key: Option<&str>,
    ) -> Result<Vec<CanonicalStagingResult>> {
        self.staging.list_staging(metric_version_key).await
    }

    pub async fn promote(&self, metric_version_key: &str) -> Result<u64> {
        let count = self.staging.promote(metric_version_key).await?;
        tracing::info!(%metric_version_key, count, "promoted staging results");
        Ok(count)
    }

    pub async fn clear_staging(&self, metric_version_key: Option<&str>) -> Result<u64> {
        let count = self.staging.clear_staging(metric_version_key).await?;
        tracing::info!(
            metric_version_key = metric_version_key.unwrap_or("<all>"),
            count,
            "cleared staging results"
        );
        Ok(count)
    }

    // ── Lineage & hierarchy ────────────────────────────────────

    pub async fn create_lineage(
        &self,
        parent_result_key: &str,
        child_result_key: &str,
        contribution_weight: Option<rust_decimal::Decimal>,
    ) -> Result<MetricLineage> {
        self.lineage
            .create_lineage(parent_result_key, child_result_key, contribution_weight)
            .await
    }

    pub async fn query_lineage(
        &self,
        parent_result_key: Option<&str>,
        child_result_key: Option<&str>,
    ) -> Result<Vec<MetricLineage>> {
        self.lineage
            .query_lineage(parent_result_key, child_result_key)
            .await
    }

    /// Base results for a version plus every result one lineage hop away
    /// (as parent or child). One hop only — further transitive neighbors
    /// are not expanded; see [`Self::hierarchy_deep`] for the recursive
    /// variant.
    pub async fn hierarchy(&self, metric_version_key: &str) -> Result<Vec<CanonicalResult>> {
        self.expand_hierarchy(metric_version_key, 1).await
    }

    /// Recursive hierarchy expansion, bounded by `max_depth` hops and
    /// cycle-safe via a visited set.
    pub async fn hierarchy_deep(
        &self,
        metric_version_key: &str,
        max_depth: usize,
    ) -> Result<Vec<CanonicalResult>> {
        self.expand_hierarchy(metric_version_key, max_depth).await
    }

    async fn expand_hierarchy(
        &self,
        metric_version_key: &str,
        max_depth: usize,
    ) -> Result<Vec<CanonicalResult>> {
        let base = self
            .results
            .query_results(&ResultFilter::for_version(metric_version_key))
            .await?;

        let mut seen: HashSet<String> = base.iter().map(|r| r.result_key.clone()).collect();
        let mut out = base.clone();
        let mut frontier: Vec<String> = seen.iter().cloned().collect();

        for _ in 0..max_depth {
            if frontier.is_empty() {
                break;
            }
            let edges = self.lineage.lineage_for_results(&frontier).await?;
            let mut next = Vec::new();
            for edge in &edges {
                for key in [&edge.parent_result_key, &edge.child_result_key] {
                    if seen.insert(key.clone()) {
                        next.push(key.clone());
                    }
                }
            }
            for key in &next {
                if let Some(result) = self.results.get_result(key).await? {
                    out.push(result);
                }
            }
            frontier = next;
        }

        Ok(out)
    }
}
