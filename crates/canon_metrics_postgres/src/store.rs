//! Postgres implementations of all canon_metrics_core port traits.
//!
//! Each adapter is a newtype wrapping PgPool. All SQL is runtime-checked
//! (sqlx::query, not sqlx::query!) to avoid compile-time DB requirement.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;

use canon_metrics_core::error::CanonError;
use canon_metrics_core::ports::{
    LineageStore, MetricCatalogStore, MetricVersionStore, Result, ResultStore, StagingStore,
};
use canon_metrics_core::types::*;

use crate::sqlx_types::{
    classify, PgActiveVersionRow, PgLineageRow, PgMetricRow, PgResultRow, PgVersionRow,
};

// ── PgMetricCatalogStore ──────────────────────────────────────

/// Postgres-backed metric catalog.
pub struct PgMetricCatalogStore {
    pool: PgPool,
}

impl PgMetricCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricCatalogStore for PgMetricCatalogStore {
    async fn list_metrics(&self) -> Result<Vec<CanonicalMetric>> {
        let rows = sqlx::query_as::<_, PgMetricRow>(
            r#"
            SELECT metric_key, metric, metric_description, tags,
                   created_datetime, updated_datetime
            FROM canonical_metric
            ORDER BY metric_key
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_metric(&self, metric_key: &str) -> Result<Option<CanonicalMetric>> {
        let row = sqlx::query_as::<_, PgMetricRow>(
            r#"
            SELECT metric_key, metric, metric_description, tags,
                   created_datetime, updated_datetime
            FROM canonical_metric
            WHERE metric_key = $1
            "#,
        )
        .bind(metric_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create_metric(&self, metric: NewMetric) -> Result<CanonicalMetric> {
        let tags = serde_json::to_value(&metric.tags).map_err(|e| anyhow!(e))?;
        let row = sqlx::query_as::<_, PgMetricRow>(
            r#"
            INSERT INTO canonical_metric (metric_key, metric, metric_description, tags)
            VALUES ($1, $2, $3, $4)
            RETURNING metric_key, metric, metric_description, tags,
                      created_datetime, updated_datetime
            "#,
        )
        .bind(&metric.metric_key)
        .bind(&metric.name)
        .bind(&metric.description)
        .bind(&tags)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        row.try_into()
    }

    async fn update_metric(
        &self,
        metric_key: &str,
        patch: UpdateMetric,
    ) -> Result<CanonicalMetric> {
        let tags = patch
            .tags
            .map(|t| serde_json::to_value(&t))
            .transpose()
            .map_err(|e| anyhow!(e))?;
        let row = sqlx::query_as::<_, PgMetricRow>(
            r#"
            UPDATE canonical_metric
            SET metric = COALESCE($2, metric),
                metric_description = COALESCE($3, metric_description),
                tags = COALESCE($4::jsonb, tags),
                updated_datetime = now()
            WHERE metric_key = $1
            RETURNING metric_key, metric, metric_description, tags,
                      created_datetime, updated_datetime
            "#,
        )
        .bind(metric_key)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(&tags)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or_else(|| CanonError::NotFound(format!("metric '{metric_key}' not found")))?;
        row.try_into()
    }
}

// ── PgMetricVersionStore ──────────────────────────────────────

pub struct PgMetricVersionStore {
    pool: PgPool,
}

impl PgMetricVersionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricVersionStore for PgMetricVersionStore {
    async fn list_versions(
        &self,
        metric_key: Option<&str>,
    ) -> Result<Vec<CanonicalMetricVersion>> {
        let rows = sqlx::query_as::<_, PgVersionRow>(
            r#"
            SELECT metric_version_key, metric_key, version_number,
                   valid_from_datetime, valid_to_datetime,
                   metric_version_name, metric_version_description,
                   grain, domain, result_type, result_unit, frequency,
                   source_category, is_regulatory, regulatory_program,
                   steward, developer, is_active,
                   metadata_schema, required_metadata_fields,
                   created_datetime, updated_datetime
            FROM canonical_metric_version
            WHERE ($1::text IS NULL OR metric_key = $1)
            ORDER BY created_datetime DESC
            "#,
        )
        .bind(metric_key)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_version(
        &self,
        metric_version_key: &str,
    ) -> Result<Option<CanonicalMetricVersion>> {
        let row = sqlx::query_as::<_, PgVersionRow>(
            r#"
            SELECT metric_version_key, metric_key, version_number,
                   valid_from_datetime, valid_to_datetime,
                   metric_version_name, metric_version_description,
                   grain, domain, result_type, result_unit, frequency,
                   source_category, is_regulatory, regulatory_program,
                   steward, developer, is_active,
                   metadata_schema, required_metadata_fields,
                   created_datetime, updated_datetime
            FROM canonical_metric_version
            WHERE metric_version_key = $1
            "#,
        )
        .bind(metric_version_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn create_version(&self, version: NewMetricVersion) -> Result<CanonicalMetricVersion> {
        let grain = serde_json::to_value(&version.grain).map_err(|e| anyhow!(e))?;
        let required_fields =
            serde_json::to_value(&version.required_metadata_fields).map_err(|e| anyhow!(e))?;
        let row = sqlx::query_as::<_, PgVersionRow>(
            r#"
            INSERT INTO canonical_metric_version (
                metric_version_key, metric_key, version_number,
                valid_from_datetime, valid_to_datetime,
                metric_version_name, metric_version_description,
                grain, domain, result_type, result_unit, frequency,
                source_category, is_regulatory, regulatory_program,
                steward, developer, is_active,
                metadata_schema, required_metadata_fields
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20
            )
            RETURNING metric_version_key, metric_key, version_number,
                      valid_from_datetime, valid_to_datetime,
                      metric_version_name, metric_version_description,
                      grain, domain, result_type, result_unit, frequency,
                      source_category, is_regulatory, regulatory_program,
                      steward, developer, is_active,
                      metadata_schema, required_metadata_fields,
                      created_datetime, updated_datetime
            "#,
        )
        .bind(&version.metric_version_key)
        .bind(&version.metric_key)
        .bind(&version.version_number)
        .bind(version.valid_from)
        .bind(version.valid_to)
        .bind(&version.name)
        .bind(&version.description)
        .bind(&grain)
        .bind(version.domain.as_str())
        .bind(version.result_type.as_str())
        .bind(&version.result_unit)
        .bind(&version.frequency)
        .bind(&version.source_category)
        .bind(version.is_regulatory)
        .bind(&version.regulatory_program)
        .bind(&version.steward)
        .bind(&version.developer)
        .bind(version.is_active)
        .bind(&version.metadata_schema)
        .bind(&required_fields)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        row.try_into()
    }

    async fn update_version(
        &self,
        metric_version_key: &str,
        patch: UpdateMetricVersion,
    ) -> Result<CanonicalMetricVersion> {
        let required_fields = patch
            .required_metadata_fields
            .map(|f| serde_json::to_value(&f))
            .transpose()
            .map_err(|e| anyhow!(e))?;
        // Grain, domain, and result_type are deliberately absent: semantic
        // changes require a new version, not a mutation.
        let row = sqlx::query_as::<_, PgVersionRow>(
            r#"
            UPDATE canonical_metric_version
            SET version_number = COALESCE($2, version_number),
                valid_from_datetime = COALESCE($3, valid_from_datetime),
                valid_to_datetime = COALESCE($4, valid_to_datetime),
                metric_version_name = COALESCE($5, metric_version_name),
                metric_version_description = COALESCE($6, metric_version_description),
                result_unit = COALESCE($7, result_unit),
                frequency = COALESCE($8, frequency),
                source_category = COALESCE($9, source_category),
                is_regulatory = COALESCE($10, is_regulatory),
                regulatory_program = COALESCE($11, regulatory_program),
                steward = COALESCE($12, steward),
                developer = COALESCE($13, developer),
                is_active = COALESCE($14, is_active),
                metadata_schema = COALESCE($15, metadata_schema),
                required_metadata_fields = COALESCE($16::jsonb, required_metadata_fields),
                updated_datetime = now()
            WHERE metric_version_key = $1
            RETURNING metric_version_key, metric_key, version_number,
                      valid_from_datetime, valid_to_datetime,
                      metric_version_name, metric_version_description,
                      grain, domain, result_type, result_unit, frequency,
                      source_category, is_regulatory, regulatory_program,
                      steward, developer, is_active,
                      metadata_schema, required_metadata_fields,
                      created_datetime, updated_datetime
            "#,
        )
        .bind(metric_version_key)
        .bind(&patch.version_number)
        .bind(patch.valid_from)
        .bind(patch.valid_to)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(&patch.result_unit)
        .bind(&patch.frequency)
        .bind(&patch.source_category)
        .bind(patch.is_regulatory)
        .bind(&patch.regulatory_program)
        .bind(&patch.steward)
        .bind(&patch.developer)
        .bind(patch.is_active)
        .bind(&patch.metadata_schema)
        .bind(&required_fields)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or_else(|| {
            CanonError::NotFound(format!("metric version '{metric_version_key}' not found"))
        })?;
        row.try_into()
    }

    async fn list_active_versions(&self) -> Result<Vec<ActiveVersion>> {
        let rows = sqlx::query_as::<_, PgActiveVersionRow>(
            r#"
            SELECT v.metric_version_key, v.metric_key, v.version_number,
                   v.valid_from_datetime, v.valid_to_datetime,
                   v.metric_version_name, v.metric_version_description,
                   v.grain, v.domain, v.result_type, v.result_unit, v.frequency,
                   v.source_category, v.is_regulatory, v.regulatory_program,
                   v.steward, v.developer, v.is_active,
                   v.metadata_schema, v.required_metadata_fields,
                   v.created_datetime, v.updated_datetime,
                   m.tags AS metric_tags
            FROM canonical_metric_version v
            JOIN canonical_metric m ON m.metric_key = v.metric_key
            WHERE v.is_active
            ORDER BY v.created_datetime DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// ── PgResultStore ─────────────────────────────────────────────

pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_into<'e, E>(executor: E, table: &str, result: &CanonicalResult) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let grain_keys = serde_json::to_value(&result.grain_keys).map_err(|e| anyhow!(e))?;
        let (numeric, datetime, text, boolean, json) = result.value.clone().into_columns();
        let sql = format!(
            r#"
            INSERT INTO {table} (
                result_key, grain_keys, metric_version_key,
                result_value_numeric, result_value_datetime, result_value_text,
                result_value_boolean, result_value_json,
                measurement_period_start_datetime, measurement_period_end_datetime,
                as_of_datetime, result_metadata, calculated_at, calculation_version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        );
        sqlx::query(&sql)
            .bind(&result.result_key)
            .bind(&grain_keys)
            .bind(&result.metric_version_key)
            .bind(numeric)
            .bind(datetime)
            .bind(text)
            .bind(boolean)
            .bind(json)
            .bind(result.measurement_period_start)
            .bind(result.measurement_period_end)
            .bind(result.as_of)
            .bind(&result.result_metadata)
            .bind(result.calculated_at)
            .bind(&result.calculation_version)
            .execute(executor)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn insert_result(&self, result: CanonicalResult) -> Result<CanonicalResult> {
        Self::insert_into(&self.pool, "canonical_result", &result).await?;
        Ok(result)
    }

    async fn insert_results(&self, results: Vec<CanonicalResult>) -> Result<u64> {
        if results.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(classify)?;
        for result in &results {
            Self::insert_into(&mut *tx, "canonical_result", result).await?;
        }
        tx.commit().await.map_err(classify)?;
        Ok(results.len() as u64)
    }

    async fn get_result(&self, result_key: &str) -> Result<Option<CanonicalResult>> {
        let row = sqlx::query_as::<_, PgResultRow>(
            r#"
            SELECT result_key, grain_keys, metric_version_key,
                   result_value_numeric, result_value_datetime, result_value_text,
                   result_value_boolean, result_value_json,
                   measurement_period_start_datetime, measurement_period_end_datetime,
                   as_of_datetime, result_metadata, calculated_at, calculation_version
            FROM canonical_result
            WHERE result_key = $1
            "#,
        )
        .bind(result_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.map(TryInto::try_into).transpose()
    }

    async fn query_results(&self, filter: &ResultFilter) -> Result<Vec<CanonicalResult>> {
        let rows = sqlx::query_as::<_, PgResultRow>(
            r#"
            SELECT result_key, grain_keys, metric_version_key,
                   result_value_numeric, result_value_datetime, result_value_text,
                   result_value_boolean, result_value_json,
                   measurement_period_start_datetime, measurement_period_end_datetime,
                   as_of_datetime, result_metadata, calculated_at, calculation_version
            FROM canonical_result
            WHERE ($1::text IS NULL OR grain_keys->>'org_id' = $1)
              AND ($2::text IS NULL OR grain_keys->>'entity_id' = $2)
              AND ($3::text IS NULL OR metric_version_key = $3)
            ORDER BY calculated_at DESC
            "#,
        )
        .bind(&filter.org_id)
        .bind(&filter.entity_id)
        .bind(&filter.metric_version_key)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn query_by_grain(&self, grain: &GrainFilter) -> Result<Vec<CanonicalResult>> {
        let filter = serde_json::to_value(grain).map_err(|e| anyhow!(e))?;
        // JSONB containment: every filter entry must equal the stored
        // entry; extra stored dimensions are ignored.
        let rows = sqlx::query_as::<_, PgResultRow>(
            r#"
            SELECT result_key, grain_keys, metric_version_key,
                   result_value_numeric, result_value_datetime, result_value_text,
                   result_value_boolean, result_value_json,
                   measurement_period_start_datetime, measurement_period_end_datetime,
                   as_of_datetime, result_metadata, calculated_at, calculation_version
            FROM canonical_result
            WHERE grain_keys @> $1::jsonb
            ORDER BY calculated_at DESC
            "#,
        )
        .bind(&filter)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn latest_results(
        &self,
        metric_version_key: &str,
        org_id: Option<&str>,
        entity_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CanonicalResult>> {
        let rows = sqlx::query_as::<_, PgResultRow>(
            r#"
            SELECT result_key, grain_keys, metric_version_key,
                   result_value_numeric, result_value_datetime, result_value_text,
                   result_value_boolean, result_value_json,
                   measurement_period_start_datetime, measurement_period_end_datetime,
                   as_of_datetime, result_metadata, calculated_at, calculation_version
            FROM canonical_result
            WHERE metric_version_key = $1
              AND ($2::text IS NULL OR grain_keys->>'org_id' = $2)
              AND ($3::text IS NULL OR grain_keys->>'entity_id' = $3)
            ORDER BY calculated_at DESC
            LIMIT $4
            "#,
        )
        .bind(metric_version_key)
        .bind(org_id)
        .bind(entity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// ── PgStagingStore ────────────────────────────────────────────

pub struct PgStagingStore {
    pool: PgPool,
}

impl PgStagingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StagingStore for PgStagingStore {
    async fn insert_staging(
        &self,
        result: CanonicalStagingResult,
    ) -> Result<CanonicalStagingResult> {
        PgResultStore::insert_into(&self.pool, "canonical_staging_result", &result).await?;
        Ok(result)
    }

    async fn list_staging(
        &self,
        metric_version_key: Option<&str>,
    ) -> Result<Vec<CanonicalStagingResult>> {
        let rows = sqlx::query_as::<_, PgResultRow>(
            r#"
            SELECT result_key, grain_keys, metric_version_key,
                   result_value_numeric, result_value_datetime, result_value_text,
                   result_value_boolean, result_value_json,
                   measurement_period_start_datetime, measurement_period_end_datetime,
                   as_of_datetime, result_metadata, calculated_at, calculation_version
            FROM canonical_staging_result
            WHERE ($1::text IS NULL OR metric_version_key = $1)
            ORDER BY calculated_at DESC
            "#,
        )
        .bind(metric_version_key)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn promote(&self, metric_version_key: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        // Serialize promotion per metric-version key. The lock is released
        // when the transaction commits or rolls back.
        sqlx::query(
            r#"SELECT pg_advisory_xact_lock(hashtext('canonical_promote'), hashtext($1))"#,
        )
        .bind(metric_version_key)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        // Copy and delete as one statement: a failure anywhere rolls back
        // the whole move, so staging rows are never lost for un-promoted
        // data.
        let promoted = sqlx::query_scalar::<_, i64>(
            r#"
            WITH moved AS (
                DELETE FROM canonical_staging_result
                WHERE metric_version_key = $1
                RETURNING
                    result_key, grain_keys, metric_version_key,
                    result_value_numeric, result_value_datetime, result_value_text,
                    result_value_boolean, result_value_json,
                    measurement_period_start_datetime, measurement_period_end_datetime,
                    as_of_datetime, result_metadata, calculated_at, calculation_version
            ),
            promoted AS (
                INSERT INTO canonical_result (
                    result_key, grain_keys, metric_version_key,
                    result_value_numeric, result_value_datetime, result_value_text,
                    result_value_boolean, result_value_json,
                    measurement_period_start_datetime, measurement_period_end_datetime,
                    as_of_datetime, result_metadata, calculated_at, calculation_version
                )
                SELECT
                    result_key, grain_keys, metric_version_key,
                    result_value_numeric, result_value_datetime, result_value_text,
                    result_value_boolean, result_value_json,
                    measurement_period_start_datetime, measurement_period_end_datetime,
                    as_of_datetime, result_metadata, calculated_at, calculation_version
                FROM moved
                RETURNING result_key
            )
            SELECT count(*) FROM promoted
            "#,
        )
        .bind(metric_version_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        tracing::debug!(%metric_version_key, promoted, "promotion committed");
        Ok(promoted as u64)
    }

    async fn clear_staging(&self, metric_version_key: Option<&str>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM canonical_staging_result
            WHERE ($1::text IS NULL OR metric_version_key = $1)
            "#,
        )
        .bind(metric_version_key)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected())
    }
}

// ── PgLineageStore ────────────────────────────────────────────

pub struct PgLineageStore {
    pool: PgPool,
}

impl PgLineageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LineageStore for PgLineageStore {
    async fn create_lineage(
        &self,
        parent_result_key: &str,
        child_result_key: &str,
        contribution_weight: Option<rust_decimal::Decimal>,
    ) -> Result<MetricLineage> {
        let row = sqlx::query_as::<_, PgLineageRow>(
            r#"
            INSERT INTO canonical_metric_lineage
                (parent_result_key, child_result_key, contribution_weight)
            VALUES ($1, $2, $3)
            RETURNING parent_result_key, child_result_key,
                      contribution_weight, created_datetime
            "#,
        )
        .bind(parent_result_key)
        .bind(child_result_key)
        .bind(contribution_weight)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.into())
    }

    async fn query_lineage(
        &self,
        parent_result_key: Option<&str>,
        child_result_key: Option<&str>,
    ) -> Result<Vec<MetricLineage>> {
        let rows = sqlx::query_as::<_, PgLineageRow>(
            r#"
            SELECT parent_result_key, child_result_key,
                   contribution_weight, created_datetime
            FROM canonical_metric_lineage
            WHERE ($1::text IS NULL OR parent_result_key = $1)
              AND ($2::text IS NULL OR child_result_key = $2)
            ORDER BY created_datetime
            "#,
        )
        .bind(parent_result_key)
        .bind(child_result_key)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn lineage_for_results(&self, result_keys: &[String]) -> Result<Vec<MetricLineage>> {
        if result_keys.is_empty() {
            return Ok(vec![]);
        }
        let rows = sqlx::query_as::<_, PgLineageRow>(
            r#"
            SELECT parent_result_key, child_result_key,
                   contribution_weight, created_datetime
            FROM canonical_metric_lineage
            WHERE parent_result_key = ANY($1)
               OR child_result_key = ANY($1)
            ORDER BY created_datetime
            "#,
        )
        .bind(result_keys)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
