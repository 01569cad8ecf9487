// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for query canonicalization and shape key derivation

#![no_main]

use libfuzzer_sys::fuzz_target;
use shapecache_core::{compute_key, IndexEntry, IndexabilityState};
use shapecache_query::{canonicalize, QueryRequest};

fuzz_target!(|data: &[u8]| {
    // Arbitrary JSON must never panic the canonicalizer
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let request = match serde_json::from_value::<QueryRequest>(value.clone()) {
        Ok(request) => request,
        Err(_) => QueryRequest::new(value),
    };
    let Ok(query) = canonicalize(&request) else {
        return;
    };

    // Keys are deterministic for the same index view
    let indexes: Vec<IndexEntry> = ["a", "b.c"]
        .iter()
        .filter_map(|path| {
            IndexEntry::from_key_pattern(format!("{}_1", path), &serde_json::json!({ *path: 1 })).ok()
        })
        .map(IndexEntry::sparse)
        .collect();
    let state = IndexabilityState::new(&indexes);
    let first = compute_key(&query, &state);
    let second = compute_key(&query, &state);
    assert_eq!(first, second);
});
