//! Lineage edges and hierarchy expansion over the in-memory stores.

mod common;

use rust_decimal::Decimal;

use canon_metrics_core::error::CanonError;
use canon_metrics_core::metadata::MetadataPolicy;
use canon_metrics_core::types::*;
use canon_metrics_harness::mem::MemStore;

use common::{currency_result, seed_version};

/// Seed an aggregate→mid→leaf chain across three versions and return the
/// service. Edges: agg→mid, mid→leaf.
async fn seed_chain() -> canon_metrics_core::service::CanonMetricsService {
    let (_, service) = MemStore::service(MetadataPolicy::default());
    seed_version(
        &service,
        "net_collections",
        "mv-agg",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;
    seed_version(
        &service,
        "net_collections_by_entity",
        "mv-mid",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;
    seed_version(
        &service,
        "net_collections_by_payer",
        "mv-leaf",
        MetricDomain::Financial,
        ResultType::Currency,
    )
    .await;

    service
        .insert_result(currency_result("mv-agg", "HC001", "ALL", "agg", 300))
        .await
        .unwrap();
    service
        .insert_result(currency_result("mv-mid", "HC001", "E1", "mid", 200))
        .await
        .unwrap();
    service
        .insert_result(currency_result("mv-leaf", "HC001", "E1", "leaf", 100))
        .await
        .unwrap();

    service
        .create_lineage("agg", "mid", Some(Decimal::ONE))
        .await
        .unwrap();
    service.create_lineage("mid", "leaf", None).await.unwrap();
    service
}

#[tokio::test]
async fn lineage_requires_finalized_results() {
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
        .insert_result(currency_result("mv1", "HC001", "E1", "final", 100))
        .await
        .unwrap();
    // Staged rows do not count as lineage endpoints.
    service
        .insert_staging(currency_result("mv1", "HC001", "E1", "staged-only", 200))
        .await
        .unwrap();

    let err = service
        .create_lineage("final", "staged-only", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CanonError::ForeignKey(_)), "got {err}");

    let err = service.create_lineage("ghost", "final", None).await.unwrap_err();
    assert!(matches!(err, CanonError::ForeignKey(_)), "got {err}");
}

#[tokio::test]
async fn duplicate_edge_conflicts() {
    let service = seed_chain().await;
    let err = service
        .create_lineage("agg", "mid", None)
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 409);
}

#[tokio::test]
async fn query_lineage_filters_by_either_side() {
    let service = seed_chain().await;

    let all = service.query_lineage(None, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let from_agg = service.query_lineage(Some("agg"), None).await.unwrap();
    assert_eq!(from_agg.len(), 1);
    assert_eq!(from_agg[0].child_result_key, "mid");
    assert_eq!(from_agg[0].contribution_weight, Some(Decimal::ONE));

    let into_leaf = service.query_lineage(None, Some("leaf")).await.unwrap();
    assert_eq!(into_leaf.len(), 1);
    assert_eq!(into_leaf[0].parent_result_key, "mid");

    let exact = service
        .query_lineage(Some("agg"), Some("leaf"))
        .await
        .unwrap();
    assert!(exact.is_empty());
}

#[tokio::test]
async fn hierarchy_expands_exactly_one_hop() {
    let service = seed_chain().await;

    let mut keys: Vec<String> = service
        .hierarchy("mv-agg")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.result_key)
        .collect();
    keys.sort();

    // Base result plus its one-hop neighbor — the leaf two hops out is
    // deliberately absent.
    assert_eq!(keys, vec!["agg".to_string(), "mid".to_string()]);
}

#[tokio::test]
async fn hierarchy_includes_parent_side_neighbors() {
    let service = seed_chain().await;

    // From the middle version, both the aggregate above and the leaf below
    // are one hop away.
    let mut keys: Vec<String> = service
        .hierarchy("mv-mid")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.result_key)
        .collect();
    keys.sort();
    assert_eq!(
        keys,
        vec!["agg".to_string(), "leaf".to_string(), "mid".to_string()]
    );
}

#[tokio::test]
async fn hierarchy_deep_reaches_transitive_neighbors() {
    let service = seed_chain().await;

    let mut keys: Vec<String> = service
        .hierarchy_deep("mv-agg", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.result_key)
        .collect();
    keys.sort();
    assert_eq!(
        keys,
        vec!["agg".to_string(), "leaf".to_string(), "mid".to_string()]
    );
}

#[tokio::test]
async fn hierarchy_deep_terminates_on_cycles() {
    let service = seed_chain().await;
    // Close the loop: leaf feeds back into the aggregate.
    service.create_lineage("leaf", "agg", None).await.unwrap();

    let results = service.hierarchy_deep("mv-agg", 100).await.unwrap();
    // Every node exactly once, despite the cycle.
    assert_eq!(results.len(), 3);
}

#[tokio::test]
async fn hierarchy_of_version_without_lineage_is_just_its_results() {
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
        .insert_result(currency_result("mv1", "HC001", "E1", "solo", 100))
        .await
        .unwrap();

    let results = service.hierarchy("mv1").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result_key, "solo");
}
