//! Core domain types for the canonical metrics catalog.
//! These are pure value types — no sqlx, no DB dependencies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::grain::{GrainDimension, GrainKeys};
use crate::result_value::ResultValue;

// ── Enums (pure — no sqlx::Type) ─────────────────────────────

/// Reporting domain of a metric version. Frozen for the life of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDomain {
    Clinical,
    Financial,
    Operational,
    Regulatory,
    Quality,
}

impl MetricDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clinical => "clinical",
            Self::Financial => "financial",
            Self::Operational => "operational",
            Self::Regulatory => "regulatory",
            Self::Quality => "quality",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "clinical" => Some(Self::Clinical),
            "financial" => Some(Self::Financial),
            "operational" => Some(Self::Operational),
            "regulatory" => Some(Self::Regulatory),
            "quality" => Some(Self::Quality),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetricDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared result type of a metric version. Frozen for the life of a
/// version — the numeric family (numeric/percentage/currency/count/ratio)
/// all bind through the numeric value column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Numeric,
    Percentage,
    Currency,
    Count,
    Ratio,
    Text,
    Boolean,
    Datetime,
    Json,
}

impl ResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Percentage => "percentage",
            Self::Currency => "currency",
            Self::Count => "count",
            Self::Ratio => "ratio",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "numeric" => Some(Self::Numeric),
            "percentage" => Some(Self::Percentage),
            "currency" => Some(Self::Currency),
            "count" => Some(Self::Count),
            "ratio" => Some(Self::Ratio),
            "text" => Some(Self::Text),
            "boolean" => Some(Self::Boolean),
            "datetime" => Some(Self::Datetime),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Metric catalog ────────────────────────────────────────────

/// A catalog entry: a named metric definition.
/// Immutable once created except for name/description/tag edits;
/// never hard-deleted in normal operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMetric {
    pub metric_key: String,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMetric {
    pub metric_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update of a catalog entry. Only name/description/tags are
/// mutable; unspecified fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMetric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

// ── Metric version ────────────────────────────────────────────

/// A versioned, time-bounded specification of how a metric is computed and
/// reported. Grain, domain, and result type are fixed for the life of a
/// version — changing calculation semantics requires a new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMetricVersion {
    pub metric_version_key: String,
    pub metric_key: String,
    pub version_number: String,
    pub valid_from: DateTime<Utc>,
    /// Open-ended validity when None.
    pub valid_to: Option<DateTime<Utc>>,
    pub name: String,
    pub description: Option<String>,
    /// Ordered grain specification.
    pub grain: Vec<GrainDimension>,
    pub domain: MetricDomain,
    pub result_type: ResultType,
    pub result_unit: Option<String>,
    pub frequency: Option<String>,
    pub source_category: Option<String>,
    pub is_regulatory: bool,
    pub regulatory_program: Option<String>,
    pub steward: Option<String>,
    pub developer: Option<String>,
    pub is_active: bool,
    /// JSON Schema used to validate `result_metadata` on results,
    /// subject to the configured metadata policy.
    pub metadata_schema: Option<Value>,
    pub required_metadata_fields: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for authoring a new metric version. The caller is responsible for
/// choosing a version number higher than prior versions of the same metric;
/// the store does not validate ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMetricVersion {
    pub metric_version_key: String,
    pub metric_key: String,
    pub version_number: String,
    pub valid_from: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub grain: Vec<GrainDimension>,
    pub domain: MetricDomain,
    pub result_type: ResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_category: Option<String>,
    #[serde(default)]
    pub is_regulatory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulatory_program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steward: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_schema: Option<Value>,
    #[serde(default)]
    pub required_metadata_fields: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Partial update of a version's mutable fields. Grain, domain, and result
/// type have no entry here — semantic changes require a new version.
/// Unspecified fields are never nulled out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMetricVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_regulatory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulatory_program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steward: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_metadata_fields: Option<Vec<String>>,
}

/// An active version joined with its parent metric's tags, for catalog
/// display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveVersion {
    #[serde(flatten)]
    pub version: CanonicalMetricVersion,
    pub metric_tags: Vec<String>,
}

// ── Results ───────────────────────────────────────────────────

/// A finalized computed value. Write-once: corrections are made by inserting
/// a new result with a new `calculation_version` tag, never by mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
    pub result_key: String,
    pub grain_keys: GrainKeys,
    pub metric_version_key: String,
    pub value: ResultValue,
    pub measurement_period_start: Option<DateTime<Utc>>,
    pub measurement_period_end: Option<DateTime<Utc>>,
    pub as_of: Option<DateTime<Utc>>,
    pub result_metadata: Option<Value>,
    pub calculated_at: DateTime<Utc>,
    /// Distinguishes reruns of the same calculation logic.
    pub calculation_version: Option<String>,
}

/// Staged results share the exact shape of finalized results; they live in a
/// separate transient table until promoted or discarded.
pub type CanonicalStagingResult = CanonicalResult;

impl CanonicalResult {
    pub fn new(
        metric_version_key: impl Into<String>,
        grain_keys: GrainKeys,
        value: ResultValue,
    ) -> Self {
        Self {
            result_key: Uuid::new_v4().to_string(),
            grain_keys,
            metric_version_key: metric_version_key.into(),
            value,
            measurement_period_start: None,
            measurement_period_end: None,
            as_of: None,
            result_metadata: None,
            calculated_at: Utc::now(),
            calculation_version: None,
        }
    }

    pub fn with_result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = key.into();
        self
    }

    pub fn with_period(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.measurement_period_start = Some(start);
        self.measurement_period_end = Some(end);
        self
    }

    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.result_metadata = Some(metadata);
        self
    }

    pub fn with_calculation_version(mut self, tag: impl Into<String>) -> Self {
        self.calculation_version = Some(tag.into());
        self
    }
}

// ── Lineage ───────────────────────────────────────────────────

/// A directed derivation edge between two finalized results.
/// Identity is the (parent, child) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricLineage {
    pub parent_result_key: String,
    pub child_result_key: String,
    /// How much the child contributes to the parent rollup, when known.
    pub contribution_weight: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

// ── Query filters ─────────────────────────────────────────────

/// AND-combined result filter; a field left as None does not constrain.
/// No filter at all means "all rows" — callers must guard against unbounded
/// scans in production use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_version_key: Option<String>,
}

impl ResultFilter {
    pub fn for_version(metric_version_key: impl Into<String>) -> Self {
        Self {
            metric_version_key: Some(metric_version_key.into()),
            ..Self::default()
        }
    }
}

/// Grain-equality filter: dimension name → required value.
pub type GrainFilter = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn domain_round_trip() {
        for domain in [
            MetricDomain::Clinical,
            MetricDomain::Financial,
            MetricDomain::Operational,
            MetricDomain::Regulatory,
            MetricDomain::Quality,
        ] {
            assert_eq!(MetricDomain::from_str(domain.as_str()), Some(domain));
        }
        assert_eq!(MetricDomain::from_str("fiscal"), None);
    }

    #[test]
    fn result_type_round_trip() {
        for rt in [
            ResultType::Numeric,
            ResultType::Percentage,
            ResultType::Currency,
            ResultType::Count,
            ResultType::Ratio,
            ResultType::Text,
            ResultType::Boolean,
            ResultType::Datetime,
            ResultType::Json,
        ] {
            assert_eq!(ResultType::from_str(rt.as_str()), Some(rt));
        }
        assert_eq!(ResultType::from_str("string"), None);
    }

    #[test]
    fn domain_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_value(MetricDomain::Financial).unwrap(),
            json!("financial")
        );
    }

    #[test]
    fn new_result_generates_key_and_timestamp() {
        let r = CanonicalResult::new(
            "mv1",
            GrainKeys::for_org("HC001"),
            ResultValue::Boolean(true),
        );
        assert!(!r.result_key.is_empty());
        assert_eq!(r.metric_version_key, "mv1");
        assert!(r.result_metadata.is_none());
        assert!(r.calculation_version.is_none());
    }

    #[test]
    fn result_builder_helpers() {
        let now = Utc::now();
        let r = CanonicalResult::new(
            "mv1",
            GrainKeys::for_org("HC001"),
            ResultValue::Text("met".into()),
        )
        .with_result_key("r1")
        .with_period(now, now)
        .with_as_of(now)
        .with_metadata(json!({"source": "claims"}))
        .with_calculation_version("calc-v2");
        assert_eq!(r.result_key, "r1");
        assert_eq!(r.as_of, Some(now));
        assert_eq!(r.calculation_version.as_deref(), Some("calc-v2"));
    }

    #[test]
    fn update_metric_version_deserializes_sparse() {
        let patch: UpdateMetricVersion =
            serde_json::from_value(json!({"is_active": false})).unwrap();
        assert_eq!(patch.is_active, Some(false));
        assert!(patch.name.is_none());
        assert!(patch.steward.is_none());
    }

    #[test]
    fn result_filter_for_version() {
        let f = ResultFilter::for_version("mv1");
        assert_eq!(f.metric_version_key.as_deref(), Some("mv1"));
        assert!(f.org_id.is_none());
        assert!(f.entity_id.is_none());
    }
}
