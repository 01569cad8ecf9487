// SPDX-License-Identifier: PMPL-1.0-or-later
//! End-to-end tests for the plan cache commands.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use shapecache_admin::{AdminError, PlanCacheCommands, CLEAR, LIST_PLANS, LIST_SHAPES};
use shapecache_core::{
    pick_best_plan, CandidatePlan, IndexEntry, PlanCache, PlanCacheIndexTree, PlanCacheRegistry,
    PlanStageStats, QuerySolution, SolutionCacheData, StageType, WorkingSet,
};
use shapecache_query::{canonicalize, QueryRequest};

const NS: &str = "test.plan_cache";

/// Route `tracing` output through the test harness; set RUST_LOG to see it.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (PlanCacheCommands, Arc<PlanCache>) {
    init_tracing();
    let registry = Arc::new(PlanCacheRegistry::default());
    let cache = registry.get_or_create(NS);
    (PlanCacheCommands::new(registry), cache)
}

/// Cache a two-candidate ranking (collection scan vs index scan) for a shape.
fn cache_shape(cache: &PlanCache, request: QueryRequest, works: u64) {
    let query = canonicalize(&request).unwrap();
    let ixscan = PlanStageStats::with_counts(StageType::Fetch, works, 3, false)
        .with_child(PlanStageStats::with_counts(StageType::Ixscan, works, 3, false).with_index("a_1"));
    let collscan = PlanStageStats::with_counts(StageType::Collscan, works * 10, 1, false);
    let (mut w1, mut w2) = (WorkingSet::new(), WorkingSet::new());
    let decision = pick_best_plan(&[
        CandidatePlan::new(&ixscan, &mut w1),
        CandidatePlan::new(&collscan, &mut w2),
    ])
    .unwrap();
    let solutions = vec![
        QuerySolution::new(
            "FETCH <- IXSCAN a_1",
            SolutionCacheData::index_tags(PlanCacheIndexTree::leaf("a_1", 0)),
        ),
        QuerySolution::new("COLLSCAN", SolutionCacheData::collection_scan()),
    ];
    let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    cache.set(&query, &solutions, decision, now).unwrap();
}

fn shapes(commands: &PlanCacheCommands) -> Vec<Value> {
    commands
        .list_shapes(NS)
        .shapes
        .into_iter()
        .map(|s| s.query)
        .collect()
}

#[test]
fn test_list_shapes_reports_fields_and_hash() {
    let (commands, cache) = setup();
    cache_shape(
        &cache,
        QueryRequest::new(json!({"a": 1})).with_sort(json!({"b": -1})),
        5,
    );
    let response = serde_json::to_value(commands.list_shapes(NS)).unwrap();
    let shape = &response["shapes"][0];
    assert_eq!(shape["query"], json!({"a": 1}));
    assert_eq!(shape["sort"], json!({"b": -1}));
    assert_eq!(shape["projection"], json!({}));
    assert!(shape.get("collation").is_none());
    assert_eq!(shape["queryHash"].as_str().map(str::len), Some(8));
    assert_eq!(response["ok"], 1.0);
}

#[test]
fn test_clear_all_then_list_is_empty() {
    let (commands, cache) = setup();
    cache_shape(&cache, QueryRequest::new(json!({"a": 1})), 5);
    cache_shape(&cache, QueryRequest::new(json!({"b": 1})), 5);
    commands.clear(NS, &json!({})).unwrap();
    assert!(shapes(&commands).is_empty());
}

#[test]
fn test_clear_one_shape_leaves_other() {
    let (commands, cache) = setup();
    cache_shape(&cache, QueryRequest::new(json!({"a": 1})), 5);
    cache_shape(&cache, QueryRequest::new(json!({"b": 1})), 5);

    // Different literal, same shape.
    commands.clear(NS, &json!({"query": {"a": 99}})).unwrap();
    assert_eq!(shapes(&commands), vec![json!({"b": 1})]);

    // Unknown shape is not an error.
    commands.clear(NS, &json!({"query": {"zzz": 1}})).unwrap();
    assert_eq!(shapes(&commands).len(), 1);
}

#[test]
fn test_collation_shapes_cleared_independently() {
    let (commands, cache) = setup();
    cache.notify_of_index_updates(&[IndexEntry::from_key_pattern("a_1", &json!({"a": 1})).unwrap()]);
    let collation = json!({"locale": "mock_reverse_string"});

    cache_shape(&cache, QueryRequest::new(json!({"a": "foo"})), 5);
    cache_shape(
        &cache,
        QueryRequest::new(json!({"a": "foo"})).with_collation(collation.clone()),
        5,
    );
    let listed = commands.list_shapes(NS).shapes;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].collation, Some(collation.clone()));

    commands
        .clear(NS, &json!({"query": {"a": "foo"}, "collation": collation}))
        .unwrap();
    let remaining = commands.list_shapes(NS).shapes;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].collation, None);
}

#[test]
fn test_list_plans_for_inactive_entry() {
    let (commands, cache) = setup();
    cache_shape(&cache, QueryRequest::new(json!({"a": 1, "b": 1})), 123);

    let response = commands
        .list_plans(NS, &json!({"query": {"b": 7, "a": 8}}))
        .unwrap();
    assert_eq!(response.is_active, Some(false));
    assert_eq!(response.works, Some(123));
    assert_eq!(response.plans.len(), 2);
    assert_eq!(response.time_of_creation.as_deref(), Some("2026-01-02T03:04:05+00:00"));

    let json = serde_json::to_value(&response).unwrap();
    let winner = &json["plans"][0];
    assert!(winner["details"]["solution"]
        .as_str()
        .unwrap()
        .contains("Leaf a_1, pos: 0"));
    assert_eq!(winner["reason"]["stats"]["stage"], "FETCH");
    assert_eq!(winner["feedback"]["nfeedback"], 0);
    assert_eq!(json["plans"][1]["feedback"], json!({}));
    assert_eq!(json["plans"][1]["filterSet"], false);
    assert!(json["isActive"] == false && json["works"] == 123);
}

#[test]
fn test_list_plans_after_promotion() {
    let (commands, cache) = setup();
    cache_shape(&cache, QueryRequest::new(json!({"a": 1})), 333);
    cache_shape(&cache, QueryRequest::new(json!({"a": 1})), 333);
    let response = commands.list_plans(NS, &json!({"query": {"a": 1}})).unwrap();
    assert_eq!(response.is_active, Some(true));
    assert_eq!(response.works, Some(333));
}

#[test]
fn test_list_plans_unknown_shape_is_empty() {
    let (commands, _cache) = setup();
    let response = commands.list_plans(NS, &json!({"query": {"a": 1}})).unwrap();
    assert!(response.plans.is_empty());
    assert_eq!(response.is_active, None);
}

#[test]
fn test_unknown_namespace() {
    let (commands, _cache) = setup();
    assert!(commands.list_shapes("test.missing").shapes.is_empty());
    assert!(commands.clear("test.missing", &json!({})).is_ok());
    assert!(matches!(
        commands.list_plans("test.missing", &json!({"query": {}})),
        Err(AdminError::NamespaceNotFound(_))
    ));
}

#[test]
fn test_invalid_parameters_do_not_mutate() {
    let (commands, cache) = setup();
    cache_shape(&cache, QueryRequest::new(json!({"a": 1})), 5);

    let bad = [
        json!({"query": 12345}),
        json!({"query": {"a": 1}, "sort": 12345}),
        json!({"query": {"a": 1}, "projection": 12345}),
        json!({"query": {"a": 1}, "collation": {}}),
        json!({"sort": {"a": 1}}),
        json!({"projection": {"_id": 0}}),
        json!({"collation": {"locale": "en_US"}}),
        json!({"query": {"a": {"$no_such_op": 1}}}),
    ];
    for cmd in &bad {
        let err = commands.clear(NS, cmd).unwrap_err();
        assert_eq!(err.code_name(), "BadValue", "{}", cmd);
    }
    assert_eq!(shapes(&commands).len(), 1);
}

#[test]
fn test_run_renders_responses() {
    let (commands, cache) = setup();
    cache_shape(&cache, QueryRequest::new(json!({"a": 1})), 5);

    let listed = commands.run(NS, LIST_SHAPES, &json!({}));
    assert_eq!(listed["shapes"].as_array().map(Vec::len), Some(1));

    let plans = commands.run(NS, LIST_PLANS, &json!({"query": {"a": 2}}));
    assert_eq!(plans["ok"], 1.0);
    assert_eq!(plans["plans"].as_array().map(Vec::len), Some(2));

    let error = commands.run(NS, LIST_PLANS, &json!({"query": 12345}));
    assert_eq!(error["ok"], 0.0);
    assert_eq!(error["codeName"], "BadValue");

    let unknown = commands.run(NS, "planCacheExplode", &json!({}));
    assert_eq!(unknown["codeName"], "CommandNotFound");

    let cleared = commands.run(NS, CLEAR, &json!({}));
    assert_eq!(cleared, json!({"ok": 1.0}));
    assert!(cache.is_empty());
}
