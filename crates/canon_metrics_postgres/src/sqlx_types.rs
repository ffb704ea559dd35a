//! Row types with sqlx derives and their conversions into the pure domain
//! types, plus SQLSTATE classification into the core error taxonomy.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use canon_metrics_core::error::CanonError;
use canon_metrics_core::grain::{GrainDimension, GrainKeys};
use canon_metrics_core::result_value::ResultValue;
use canon_metrics_core::types::{
    ActiveVersion, CanonicalMetric, CanonicalMetricVersion, CanonicalResult, MetricDomain,
    MetricLineage, ResultType,
};

/// Classify a sqlx error into the domain taxonomy.
///
/// Constraint violations surface as caller errors (duplicate/foreign-key/
/// validation); connectivity problems surface as `Transient` so the caller
/// can retry with backoff.
pub(crate) fn classify(e: sqlx::Error) -> CanonError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            // unique_violation
            Some("23505") => return CanonError::DuplicateKey(db.message().to_string()),
            // foreign_key_violation
            Some("23503") => return CanonError::ForeignKey(db.message().to_string()),
            // check_violation — one-of value columns or org_id scoping
            Some("23514") => return CanonError::Validation(db.message().to_string()),
            _ => {}
        }
    }
    match e {
        e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)) => {
            CanonError::Transient(e.to_string())
        }
        other => CanonError::Internal(anyhow!(other)),
    }
}

// ── canonical_metric ──────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub struct PgMetricRow {
    pub metric_key: String,
    pub metric: String,
    pub metric_description: Option<String>,
    pub tags: Value,
    pub created_datetime: DateTime<Utc>,
    pub updated_datetime: DateTime<Utc>,
}

impl TryFrom<PgMetricRow> for CanonicalMetric {
    type Error = CanonError;

    fn try_from(row: PgMetricRow) -> Result<Self, CanonError> {
        let tags: Vec<String> = serde_json::from_value(row.tags)
            .map_err(|e| anyhow!("metric '{}' has malformed tags: {}", row.metric_key, e))?;
        Ok(Self {
            metric_key: row.metric_key,
            name: row.metric,
            description: row.metric_description,
            tags,
            created_at: row.created_datetime,
            updated_at: row.updated_datetime,
        })
    }
}

// ── canonical_metric_version ──────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub struct PgVersionRow {
    pub metric_version_key: String,
    pub metric_key: String,
    pub version_number: String,
    pub valid_from_datetime: DateTime<Utc>,
    pub valid_to_datetime: Option<DateTime<Utc>>,
    pub metric_version_name: String,
    pub metric_version_description: Option<String>,
    pub grain: Value,
    pub domain: String,
    pub result_type: String,
    pub result_unit: Option<String>,
    pub frequency: Option<String>,
    pub source_category: Option<String>,
    pub is_regulatory: bool,
    pub regulatory_program: Option<String>,
    pub steward: Option<String>,
    pub developer: Option<String>,
    pub is_active: bool,
    pub metadata_schema: Option<Value>,
    pub required_metadata_fields: Value,
    pub created_datetime: DateTime<Utc>,
    pub updated_datetime: DateTime<Utc>,
}

impl TryFrom<PgVersionRow> for CanonicalMetricVersion {
    type Error = CanonError;

    fn try_from(row: PgVersionRow) -> Result<Self, CanonError> {
        let key = row.metric_version_key.clone();
        let domain = MetricDomain::from_str(&row.domain)
            .ok_or_else(|| anyhow!("version '{}' has unknown domain '{}'", key, row.domain))?;
        let result_type = ResultType::from_str(&row.result_type).ok_or_else(|| {
            anyhow!("version '{}' has unknown result_type '{}'", key, row.result_type)
        })?;
        let grain: Vec<GrainDimension> = serde_json::from_value(row.grain)
            .map_err(|e| anyhow!("version '{}' has malformed grain spec: {}", key, e))?;
        let required_metadata_fields: Vec<String> =
            serde_json::from_value(row.required_metadata_fields).map_err(|e| {
                anyhow!("version '{}' has malformed required_metadata_fields: {}", key, e)
            })?;
        Ok(Self {
            metric_version_key: row.metric_version_key,
            metric_key: row.metric_key,
            version_number: row.version_number,
            valid_from: row.valid_from_datetime,
            valid_to: row.valid_to_datetime,
            name: row.metric_version_name,
            description: row.metric_version_description,
            grain,
            domain,
            result_type,
            result_unit: row.result_unit,
            frequency: row.frequency,
            source_category: row.source_category,
            is_regulatory: row.is_regulatory,
            regulatory_program: row.regulatory_program,
            steward: row.steward,
            developer: row.developer,
            is_active: row.is_active,
            metadata_schema: row.metadata_schema,
            required_metadata_fields,
            created_at: row.created_datetime,
            updated_at: row.updated_datetime,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PgActiveVersionRow {
    #[sqlx(flatten)]
    pub version: PgVersionRow,
    pub metric_tags: Value,
}

impl TryFrom<PgActiveVersionRow> for ActiveVersion {
    type Error = CanonError;

    fn try_from(row: PgActiveVersionRow) -> Result<Self, CanonError> {
        let metric_tags: Vec<String> = serde_json::from_value(row.metric_tags).map_err(|e| {
            anyhow!(
                "metric tags for version '{}' are malformed: {}",
                row.version.metric_version_key,
                e
            )
        })?;
        Ok(Self {
            version: row.version.try_into()?,
            metric_tags,
        })
    }
}

// ── canonical_result / canonical_staging_result ───────────────

#[derive(Debug, sqlx::FromRow)]
pub struct PgResultRow {
    pub result_key: String,
    pub grain_keys: Value,
    pub metric_version_key: String,
    pub result_value_numeric: Option<Decimal>,
    pub result_value_datetime: Option<DateTime<Utc>>,
    pub result_value_text: Option<String>,
    pub result_value_boolean: Option<bool>,
    pub result_value_json: Option<Value>,
    pub measurement_period_start_datetime: Option<DateTime<Utc>>,
    pub measurement_period_end_datetime: Option<DateTime<Utc>>,
    pub as_of_datetime: Option<DateTime<Utc>>,
    pub result_metadata: Option<Value>,
    pub calculated_at: DateTime<Utc>,
    pub calculation_version: Option<String>,
}

impl TryFrom<PgResultRow> for CanonicalResult {
    type Error = CanonError;

    fn try_from(row: PgResultRow) -> Result<Self, CanonError> {
        // A stored row violating the one-of invariant is data corruption,
        // not caller error — surface as Internal, never Validation.
        let value = ResultValue::from_columns(
            row.result_value_numeric,
            row.result_value_datetime,
            row.result_value_text,
            row.result_value_boolean,
            row.result_value_json,
        )
        .map_err(|e| anyhow!("corrupt result row '{}': {}", row.result_key, e))?;
        let grain_keys: GrainKeys = serde_json::from_value(row.grain_keys).map_err(|e| {
            anyhow!("result row '{}' has malformed grain_keys: {}", row.result_key, e)
        })?;
        Ok(Self {
            result_key: row.result_key,
            grain_keys,
            metric_version_key: row.metric_version_key,
            value,
            measurement_period_start: row.measurement_period_start_datetime,
            measurement_period_end: row.measurement_period_end_datetime,
            as_of: row.as_of_datetime,
            result_metadata: row.result_metadata,
            calculated_at: row.calculated_at,
            calculation_version: row.calculation_version,
        })
    }
}

// ── canonical_metric_lineage ──────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
pub struct PgLineageRow {
    pub parent_result_key: String,
    pub child_result_key: String,
    pub contribution_weight: Option<Decimal>,
    pub created_datetime: DateTime<Utc>,
}

impl From<PgLineageRow> for MetricLineage {
    fn from(row: PgLineageRow) -> Self {
        Self {
            parent_result_key: row.parent_result_key,
            child_result_key: row.child_result_key,
            contribution_weight: row.contribution_weight,
            created_at: row.created_datetime,
        }
    }
}
