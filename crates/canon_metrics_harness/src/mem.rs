//! In-memory implementations of the storage ports.
//!
//! One `MemStore` implements all five traits over a shared
//! `RwLock`-protected state, the same way the Postgres adapters share one
//! pool. Promotion takes an additional mutex so concurrent promotions of
//! the same version serialize, mirroring the advisory lock in the Postgres
//! adapter.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use canon_metrics_core::error::CanonError;
use canon_metrics_core::metadata::MetadataPolicy;
use canon_metrics_core::ports::{
    LineageStore, MetricCatalogStore, MetricVersionStore, Result, ResultStore, StagingStore,
};
use canon_metrics_core::service::CanonMetricsService;
use canon_metrics_core::types::*;

#[derive(Default)]
struct State {
    metrics: BTreeMap<String, CanonicalMetric>,
    versions: BTreeMap<String, CanonicalMetricVersion>,
    /// Insertion order of version keys, for newest-created-first listings.
    version_order: Vec<String>,
    results: BTreeMap<String, CanonicalResult>,
    staging: Vec<CanonicalStagingResult>,
    lineage: Vec<MetricLineage>,
}

#[derive(Default)]
pub struct MemStore {
    state: RwLock<State>,
    promote_lock: Mutex<()>,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wire a service over a fresh in-memory store.
    pub fn service(policy: MetadataPolicy) -> (Arc<Self>, CanonMetricsService) {
        let store = Self::new();
        let service = CanonMetricsService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            policy,
        );
        (store, service)
    }

    fn check_result_row(state: &State, result: &CanonicalResult) -> Result<()> {
        result.grain_keys.validate()?;
        if !state.versions.contains_key(&result.metric_version_key) {
            return Err(CanonError::ForeignKey(format!(
                "metric_version_key '{}' does not exist",
                result.metric_version_key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricCatalogStore for MemStore {
    async fn list_metrics(&self) -> Result<Vec<CanonicalMetric>> {
        let state = self.state.read().await;
        Ok(state.metrics.values().cloned().collect())
    }

    async fn get_metric(&self, metric_key: &str) -> Result<Option<CanonicalMetric>> {
        let state = self.state.read().await;
        Ok(state.metrics.get(metric_key).cloned())
    }

    async fn create_metric(&self, metric: NewMetric) -> Result<CanonicalMetric> {
        let mut state = self.state.write().await;
        if state.metrics.contains_key(&metric.metric_key) {
            return Err(CanonError::DuplicateKey(format!(
                "metric_key '{}' already exists",
                metric.metric_key
            )));
        }
        let now = Utc::now();
        let created = CanonicalMetric {
            metric_key: metric.metric_key.clone(),
            name: metric.name,
            description: metric.description,
            tags: metric.tags,
            created_at: now,
            updated_at: now,
        };
        state.metrics.insert(metric.metric_key, created.clone());
        Ok(created)
    }

    async fn update_metric(
        &self,
        metric_key: &str,
        patch: UpdateMetric,
    ) -> Result<CanonicalMetric> {
        let mut state = self.state.write().await;
        let metric = state
            .metrics
            .get_mut(metric_key)
            .ok_or_else(|| CanonError::NotFound(format!("metric '{metric_key}' not found")))?;
        if let Some(name) = patch.name {
            metric.name = name;
        }
        if let Some(description) = patch.description {
            metric.description = Some(description);
        }
        if let Some(tags) = patch.tags {
            metric.tags = tags;
        }
        metric.updated_at = Utc::now();
        Ok(metric.clone())
    }
}

#[async_trait]
impl MetricVersionStore for MemStore {
    async fn list_versions(
        &self,
        metric_key: Option<&str>,
    ) -> Result<Vec<CanonicalMetricVersion>> {
        let state = self.state.read().await;
        Ok(state
            .version_order
            .iter()
            .rev()
            .filter_map(|key| state.versions.get(key))
            .filter(|v| metric_key.is_none_or(|m| v.metric_key == m))
            .cloned()
            .collect())
    }

    async fn get_version(
        &self,
        metric_version_key: &str,
    ) -> Result<Option<CanonicalMetricVersion>> {
        let state = self.state.read().await;
        Ok(state.versions.get(metric_version_key).cloned())
    }

    async fn create_version(&self, version: NewMetricVersion) -> Result<CanonicalMetricVersion> {
        let mut state = self.state.write().await;
        if !state.metrics.contains_key(&version.metric_key) {
            return Err(CanonError::ForeignKey(format!(
                "metric_key '{}' does not exist",
                version.metric_key
            )));
        }
        if state.versions.contains_key(&version.metric_version_key) {
            return Err(CanonError::DuplicateKey(format!(
                "metric_version_key '{}' already exists",
                version.metric_version_key
            )));
        }
        let now = Utc::now();
        let created = CanonicalMetricVersion {
            metric_version_key: version.metric_version_key.clone(),
            metric_key: version.metric_key,
            version_number: version.version_number,
            valid_from: version.valid_from,
            valid_to: version.valid_to,
            name: version.name,
            description: version.description,
            grain: version.grain,
            domain: version.domain,
            result_type: version.result_type,
            result_unit: version.result_unit,
            frequency: version.frequency,
            source_category: version.source_category,
            is_regulatory: version.is_regulatory,
            regulatory_program: version.regulatory_program,
            steward: version.steward,
            developer: version.developer,
            is_active: version.is_active,
            metadata_schema: version.metadata_schema,
            required_metadata_fields: version.required_metadata_fields,
            created_at: now,
            updated_at: now,
        };
        state
            .versions
            .insert(created.metric_version_key.clone(), created.clone());
        state.version_order.push(created.metric_version_key.clone());
        Ok(created)
    }

    async fn update_version(
        &self,
        metric_version_key: &str,
        patch: UpdateMetricVersion,
    ) -> Result<CanonicalMetricVersion> {
        let mut state = self.state.write().await;
        let version = state.versions.get_mut(metric_version_key).ok_or_else(|| {
            CanonError::NotFound(format!("metric version '{metric_version_key}' not found"))
        })?;
        if let Some(version_number) = patch.version_number {
            version.version_number = version_number;
        }
        if let Some(valid_from) = patch.valid_from {
            version.valid_from = valid_from;
        }
        if let Some(valid_to) = patch.valid_to {
            version.valid_to = Some(valid_to);
        }
        if let Some(name) = patch.name {
            version.name = name;
        }
        if let Some(description) = patch.description {
            version.description = Some(description);
        }
        if let Some(result_unit) = patch.result_unit {
            version.result_unit = Some(result_unit);
        }
        if let Some(frequency) = patch.frequency {
            version.frequency = Some(frequency);
        }
        if let Some(source_category) = patch.source_category {
            version.source_category = Some(source_category);
        }
        if let Some(is_regulatory) = patch.is_regulatory {
            version.is_regulatory = is_regulatory;
        }
        if let Some(regulatory_program) = patch.regulatory_program {
            version.regulatory_program = Some(regulatory_program);
        }
        if let Some(steward) = patch.steward {
            version.steward = Some(steward);
        }
        if let Some(developer) = patch.developer {
            version.developer = Some(developer);
        }
        if let Some(is_active) = patch.is_active {
            version.is_active = is_active;
        }
        if let Some(metadata_schema) = patch.metadata_schema {
            version.metadata_schema = Some(metadata_schema);
        }
        if let Some(required) = patch.required_metadata_fields {
            version.required_metadata_fields = required;
        }
        version.updated_at = Utc::now();
        Ok(version.clone())
    }

    async fn list_active_versions(&self) -> Result<Vec<ActiveVersion>> {
        let state = self.state.read().await;
        Ok(state
            .version_order
            .iter()
            .rev()
            .filter_map(|key| state.versions.get(key))
            .filter(|v| v.is_active)
            .map(|v| ActiveVersion {
                version: v.clone(),
                metric_tags: state
                    .metrics
                    .get(&v.metric_key)
                    .map(|m| m.tags.clone())
                    .unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl ResultStore for MemStore {
    async fn insert_result(&self, result: CanonicalResult) -> Result<CanonicalResult> {
        let mut state = self.state.write().await;
        Self::check_result_row(&state, &result)?;
        if state.results.contains_key(&result.result_key) {
            return Err(CanonError::DuplicateKey(format!(
                "result_key '{}' already exists",
                result.result_key
            )));
        }
        state
            .results
            .insert(result.result_key.clone(), result.clone());
        Ok(result)
    }

    async fn insert_results(&self, results: Vec<CanonicalResult>) -> Result<u64> {
        let mut state = self.state.write().await;
        // All rows are checked before any row lands — all-or-none.
        for (i, result) in results.iter().enumerate() {
            Self::check_result_row(&state, result)?;
            let dup_in_store = state.results.contains_key(&result.result_key);
            let dup_in_batch = results[..i]
                .iter()
                .any(|other| other.result_key == result.result_key);
            if dup_in_store || dup_in_batch {
                return Err(CanonError::DuplicateKey(format!(
                    "result_key '{}' already exists",
                    result.result_key
                )));
            }
        }
        let count = results.len() as u64;
        for result in results {
            state.results.insert(result.result_key.clone(), result);
        }
        Ok(count)
    }

    async fn get_result(&self, result_key: &str) -> Result<Option<CanonicalResult>> {
        let state = self.state.read().await;
        Ok(state.results.get(result_key).cloned())
    }

    async fn query_results(&self, filter: &ResultFilter) -> Result<Vec<CanonicalResult>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .results
            .values()
            .filter(|r| {
                filter
                    .org_id
                    .as_deref()
                    .is_none_or(|org| r.grain_keys.org_id() == Some(org))
                    && filter
                        .entity_id
                        .as_deref()
                        .is_none_or(|e| r.grain_keys.entity_id() == Some(e))
                    && filter
                        .metric_version_key
                        .as_deref()
                        .is_none_or(|v| r.metric_version_key == v)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.calculated_at.cmp(&a.calculated_at));
        Ok(rows)
    }

    async fn query_by_grain(&self, grain: &GrainFilter) -> Result<Vec<CanonicalResult>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .results
            .values()
            .filter(|r| r.grain_keys.matches(grain))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.calculated_at.cmp(&a.calculated_at));
        Ok(rows)
    }

    async fn latest_results(
        &self,
        metric_version_key: &str,
        org_id: Option<&str>,
        entity_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CanonicalResult>> {
        let filter = ResultFilter {
            org_id: org_id.map(Into::into),
            entity_id: entity_id.map(Into::into),
            metric_version_key: Some(metric_version_key.into()),
        };
        let mut rows = self.query_results(&filter).await?;
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[async_trait]
impl StagingStore for MemStore {
    async fn insert_staging(
        &self,
        result: CanonicalStagingResult,
    ) -> Result<CanonicalStagingResult> {
        let mut state = self.state.write().await;
        Self::check_result_row(&state, &result)?;
        if state.staging.iter().any(|s| s.result_key == result.result_key) {
            return Err(CanonError::DuplicateKey(format!(
                "staging result_key '{}' already exists",
                result.result_key
            )));
        }
        state.staging.push(result.clone());
        Ok(result)
    }

    async fn list_staging(
        &self,
        metric_version_key: Option<&str>,
    ) -> Result<Vec<CanonicalStagingResult>> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .staging
            .iter()
            .filter(|s| metric_version_key.is_none_or(|v| s.metric_version_key == v))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.calculated_at.cmp(&a.calculated_at));
        Ok(rows)
    }

    async fn promote(&self, metric_version_key: &str) -> Result<u64> {
        // Serialize promotions per store; concurrent callers for the same
        // version cannot double-promote.
        let _guard = self.promote_lock.lock().await;
        let mut state = self.state.write().await;

        let staged: Vec<_> = state
            .staging
            .iter()
            .filter(|s| s.metric_version_key == metric_version_key)
            .cloned()
            .collect();
        if staged.is_empty() {
            return Ok(0);
        }
        // Validate the whole batch before touching either store.
        for row in &staged {
            if state.results.contains_key(&row.result_key) {
                return Err(CanonError::DuplicateKey(format!(
                    "result_key '{}' already finalized",
                    row.result_key
                )));
            }
        }

        let count = staged.len() as u64;
        for row in staged {
            state.results.insert(row.result_key.clone(), row);
        }
        state
            .staging
            .retain(|s| s.metric_version_key != metric_version_key);
        Ok(count)
    }

    async fn clear_staging(&self, metric_version_key: Option<&str>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.staging.len();
        state
            .staging
            .retain(|s| metric_version_key.is_some_and(|v| s.metric_version_key != v));
        Ok((before - state.staging.len()) as u64)
    }
}

#[async_trait]
impl LineageStore for MemStore {
    async fn create_lineage(
        &self,
        parent_result_key: &str,
        child_result_key: &str,
        contribution_weight: Option<rust_decimal::Decimal>,
    ) -> Result<MetricLineage> {
        let mut state = self.state.write().await;
        for key in [parent_result_key, child_result_key] {
            if !state.results.contains_key(key) {
                return Err(CanonError::ForeignKey(format!(
                    "result_key '{key}' does not reference a finalized result"
                )));
            }
        }
        if state.lineage.iter().any(|l| {
            l.parent_result_key == parent_result_key && l.child_result_key == child_result_key
        }) {
            return Err(CanonError::DuplicateKey(format!(
                "lineage edge ({parent_result_key}, {child_result_key}) already exists"
            )));
        }
        let edge = MetricLineage {
            parent_result_key: parent_result_key.into(),
            child_result_key: child_result_key.into(),
            contribution_weight,
            created_at: Utc::now(),
        };
        state.lineage.push(edge.clone());
        Ok(edge)
    }

    async fn query_lineage(
        &self,
        parent_result_key: Option<&str>,
        child_result_key: Option<&str>,
    ) -> Result<Vec<MetricLineage>> {
        let state = self.state.read().await;
        Ok(state
            .lineage
            .iter()
            .filter(|l| {
                parent_result_key.is_none_or(|p| l.parent_result_key == p)
                    && child_result_key.is_none_or(|c| l.child_result_key == c)
            })
            .cloned()
            .collect())
    }

    async fn lineage_for_results(&self, result_keys: &[String]) -> Result<Vec<MetricLineage>> {
        let state = self.state.read().await;
        Ok(state
            .lineage
            .iter()
            .filter(|l| {
                result_keys.contains(&l.parent_result_key)
                    || result_keys.contains(&l.child_result_key)
            })
            .cloned()
            .collect())
    }
}
