// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for shape keys, plan ranking and the plan cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use shapecache_core::{
    compute_key, pick_best_plan, CandidatePlan, IndexEntry, IndexabilityState, PlanCache,
    PlanCacheIndexTree, PlanStageStats, QuerySolution, SolutionCacheData, StageType, WorkingSet,
};
use shapecache_query::{canonicalize, CanonicalQuery, QueryRequest};

fn wide_filter(fields: usize) -> Value {
    let mut obj = Map::new();
    for i in 0..fields {
        obj.insert(format!("field_{}", i), json!({"$gt": i, "$lt": i * 10}));
    }
    Value::Object(obj)
}

fn query(filter: Value) -> CanonicalQuery {
    canonicalize(&QueryRequest::new(filter).with_sort(json!({"field_0": 1}))).unwrap()
}

fn indexes(count: usize) -> Vec<IndexEntry> {
    (0..count)
        .map(|i| {
            let entry = IndexEntry::from_key_pattern(
                format!("field_{}_1", i),
                &json!({ format!("field_{}", i): 1 }),
            )
            .unwrap();
            if i % 2 == 0 {
                entry.sparse()
            } else {
                entry
            }
        })
        .collect()
}

// ============================================================================
// Key Derivation Benchmarks
// ============================================================================

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    for fields in [1usize, 8, 32] {
        let request = QueryRequest::new(wide_filter(fields));
        group.throughput(Throughput::Elements(fields as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &request, |b, request| {
            b.iter(|| black_box(canonicalize(request).unwrap()))
        });
    }
    group.finish();
}

fn bench_compute_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_key");
    for fields in [1usize, 8, 32] {
        let q = query(wide_filter(fields));
        let state = IndexabilityState::new(&indexes(fields));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &q, |b, q| {
            b.iter(|| black_box(compute_key(q, &state)))
        });
    }
    group.finish();
}

// ============================================================================
// Ranking Benchmarks
// ============================================================================

fn bench_pick_best_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranker");
    for candidates in [2usize, 8, 32] {
        let stats: Vec<PlanStageStats> = (0..candidates)
            .map(|i| {
                PlanStageStats::with_counts(StageType::Fetch, 100, i as u64, false).with_child(
                    PlanStageStats::with_counts(StageType::Ixscan, 100, i as u64, false),
                )
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(candidates), &stats, |b, stats| {
            b.iter(|| {
                let mut sets: Vec<WorkingSet> = stats.iter().map(|_| WorkingSet::new()).collect();
                let plans: Vec<CandidatePlan<'_>> = stats
                    .iter()
                    .zip(sets.iter_mut())
                    .map(|(s, ws)| CandidatePlan::new(s, ws))
                    .collect();
                black_box(pick_best_plan(&plans).unwrap())
            })
        });
    }
    group.finish();
}

// ============================================================================
// Cache Benchmarks
// ============================================================================

fn populate(cache: &PlanCache, shapes: usize) -> Vec<CanonicalQuery> {
    let stats = PlanStageStats::with_counts(StageType::Ixscan, 10, 5, false);
    let solutions = vec![QuerySolution::new(
        "IXSCAN",
        SolutionCacheData::index_tags(PlanCacheIndexTree::leaf("field_0_1", 0)),
    )];
    (0..shapes)
        .map(|i| {
            let q = canonicalize(&QueryRequest::new(json!({ format!("f{}", i): 1 }))).unwrap();
            let mut ws = WorkingSet::new();
            let decision = pick_best_plan(&[CandidatePlan::new(&stats, &mut ws)]).unwrap();
            cache.set(&q, &solutions, decision, chrono::Utc::now()).unwrap();
            q
        })
        .collect()
}

fn bench_cache_get(c: &mut Criterion) {
    let cache = Arc::new(PlanCache::default());
    let shapes = populate(&cache, 1000);
    let keys: Vec<_> = shapes.iter().map(|q| cache.compute_key(q)).collect();

    let mut group = c.benchmark_group("plan_cache");
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("get_hit_1000", |b| {
        b.iter(|| {
            for key in &keys {
                black_box(cache.get(key));
            }
        })
    });
    group.finish();
}

fn bench_cache_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_cache");
    group.bench_function("set_1000_shapes", |b| {
        b.iter(|| {
            let cache = PlanCache::default();
            black_box(populate(&cache, 1000).len())
        })
    });
    group.finish();
}

criterion_group!(keys, bench_canonicalize, bench_compute_key);
criterion_group!(ranking, bench_pick_best_plan);
criterion_group!(cache, bench_cache_get, bench_cache_set);
criterion_main!(keys, ranking, cache);
