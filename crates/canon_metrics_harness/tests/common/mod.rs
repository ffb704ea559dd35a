//! Shared seed helpers for the harness tests.
#![allow(dead_code)]

use chrono::Utc;
use rust_decimal::Decimal;

use canon_metrics_core::error::CanonError;
use canon_metrics_core::grain::{GrainDimension, GrainKeys};
use canon_metrics_core::result_value::ResultValue;
use canon_metrics_core::service::CanonMetricsService;
use canon_metrics_core::types::*;

/// Create the parent metric (tolerating re-runs) and a version with the
/// given result type.
pub async fn seed_version(
    service: &CanonMetricsService,
    metric_key: &str,
    metric_version_key: &str,
    domain: MetricDomain,
    result_type: ResultType,
) -> CanonicalMetricVersion {
    match service
        .create_metric(NewMetric {
            metric_key: metric_key.into(),
            name: metric_key.replace('_', " "),
            description: None,
            tags: vec!["revenue-cycle".into()],
        })
        .await
    {
        Ok(_) | Err(CanonError::DuplicateKey(_)) => {}
        Err(e) => panic!("seed metric failed: {e}"),
    }

    service
        .create_version(NewMetricVersion {
            metric_version_key: metric_version_key.into(),
            metric_key: metric_key.into(),
            version_number: "1.0.0".into(),
            valid_from: Utc::now(),
            valid_to: None,
            name: format!("{metric_key} v1"),
            description: None,
            grain: vec![
                GrainDimension::new("org_id"),
                GrainDimension::new("entity_id"),
            ],
            domain,
            result_type,
            result_unit: None,
            frequency: Some("monthly".into()),
            source_category: None,
            is_regulatory: false,
            regulatory_program: None,
            steward: Some("rev-cycle-analytics".into()),
            developer: None,
            is_active: true,
            metadata_schema: None,
            required_metadata_fields: vec![],
        })
        .await
        .expect("seed version failed")
}

/// A currency-valued result row for the given version and tenant.
pub fn currency_result(
    metric_version_key: &str,
    org_id: &str,
    entity_id: &str,
    result_key: &str,
    cents: i64,
) -> CanonicalResult {
    CanonicalResult::new(
        metric_version_key,
        GrainKeys::for_org(org_id).with("entity_id", entity_id),
        ResultValue::Numeric(Decimal::new(cents, 2)),
    )
    .with_result_key(result_key)
}
