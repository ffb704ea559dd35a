//! Staging → promotion workflow over the in-memory stores.

mod common;

use std::sync::Arc;

use rust_decimal::Decimal;

use canon_metrics_core::grain::GrainKeys;
use canon_metrics_core::metadata::MetadataPolicy;
use canon_metrics_core::result_value::ResultValue;
use canon_metrics_core::types::*;
use canon_metrics_harness::mem::MemStore;

use common::{currency_result, seed_version};

#[tokio::test]
async fn promote_moves_all_rows_and_empties_staging() {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv1",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;

    let staged = service
        .insert_staging(currency_result("mv1", "HC001", "E1", "r1", 100_000))
        .await
        .unwrap();
    assert_eq!(
        staged.value,
        ResultValue::Numeric(Decimal::new(100_000, 2))
    );

    let promoted = service.promote("mv1").await.unwrap();
    assert_eq!(promoted, 1);

    // The finalized row carries identical key/value/grain content.
    let results = service
        .query_results(&ResultFilter::for_version("mv1"))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0], staged);

    assert!(service.list_staging(Some("mv1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn promote_on_empty_staging_is_noop() {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv1",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;

    service
        .insert_staging(currency_result("mv1", "HC001", "E1", "r1", 5_000))
        .await
        .unwrap();
    assert_eq!(service.promote("mv1").await.unwrap(), 1);
    // Immediately re-running promotes nothing.
    assert_eq!(service.promote("mv1").await.unwrap(), 0);
    assert_eq!(
        service
            .query_results(&ResultFilter::for_version("mv1"))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn promote_is_scoped_to_the_given_version() {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv1",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;
    seed_version(
        &service,
        "denial_rate",
        "mv2",
        MetricDomain::Operational,
        ResultType::Percentage,
    )
    .await;

    service
        .insert_staging(currency_result("mv1", "HC001", "E1", "r1", 1_000))
        .await
        .unwrap();
    service
        .insert_staging(currency_result("mv2", "HC001", "E1", "r2", 425))
        .await
        .unwrap();

    assert_eq!(service.promote("mv1").await.unwrap(), 1);

    // mv2 rows stay staged.
    assert_eq!(service.list_staging(Some("mv2")).await.unwrap().len(), 1);
    assert!(service
        .query_results(&ResultFilter::for_version("mv2"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn clear_staging_is_idempotent() {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv1",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;

    for i in 0..3 {
        service
            .insert_staging(currency_result("mv1", "HC001", "E1", &format!("r{i}"), 100 + i))
            .await
            .unwrap();
    }

    assert_eq!(service.clear_staging(Some("mv1")).await.unwrap(), 3);
    assert_eq!(service.clear_staging(Some("mv1")).await.unwrap(), 0);
    // Discarded runs never reach the result store.
    assert!(service
        .query_results(&ResultFilter::for_version("mv1"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn clear_staging_unscoped_discards_everything() {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv1",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;
    seed_version(
        &service,
        "denial_rate",
        "mv2",
        MetricDomain::Operational,
        ResultType::Percentage,
    )
    .await;

    service
        .insert_staging(currency_result("mv1", "HC001", "E1", "r1", 1))
        .await
        .unwrap();
    service
        .insert_staging(currency_result("mv2", "HC001", "E1", "r2", 2))
        .await
        .unwrap();

    assert_eq!(service.clear_staging(None).await.unwrap(), 2);
    assert!(service.list_staging(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_promotes_are_at_most_once() {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv1",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;

    for i in 0..5 {
        service
            .insert_staging(currency_result("mv1", "HC001", "E1", &format!("r{i}"), 100 * i))
            .await
            .unwrap();
    }

    let service = Arc::new(service);
    let a = tokio::spawn({
        let service = service.clone();
        async move { service.promote("mv1").await.unwrap() }
    });
    let b = tokio::spawn({
        let service = service.clone();
        async move { service.promote("mv1").await.unwrap() }
    });
    let total = a.await.unwrap() + b.await.unwrap();

    // Exactly one promotion wins each row — no double-inserts.
    assert_eq!(total, 5);
    assert_eq!(
        service
            .query_results(&ResultFilter::for_version("mv1"))
            .await
            .unwrap()
            .len(),
        5
    );
    assert!(service.list_staging(Some("mv1")).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_staging_inserts_are_independent() {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv1",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;

    let service = Arc::new(service);
    let mut handles = Vec::new();
    for i in 0..10 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .insert_staging(currency_result("mv1", "HC001", "E1", &format!("r{i}"), i))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(service.list_staging(Some("mv1")).await.unwrap().len(), 10);
}

#[tokio::test]
async fn promotion_preserves_every_field() {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv1",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;

    let now = chrono::Utc::now();
    let staged = service
        .insert_staging(
            CanonicalResult::new(
                "mv1",
                GrainKeys::for_org("HC001")
                    .with("entity_id", "E1")
                    .with("month", "2026-07"),
                ResultValue::Numeric(Decimal::new(123_456, 2)),
            )
            .with_result_key("r-full")
            .with_period(now, now)
            .with_as_of(now)
            .with_metadata(serde_json::json!({"source": "claims"}))
            .with_calculation_version("calc-v3"),
        )
        .await
        .unwrap();

    assert_eq!(service.promote("mv1").await.unwrap(), 1);

    let finalized = service.query_results(&ResultFilter::for_version("mv1")).await.unwrap();
    assert_eq!(finalized, vec![staged]);
}
