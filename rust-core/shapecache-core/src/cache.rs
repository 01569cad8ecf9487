// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! The per-collection plan cache.
//!
//! Maps shape keys to [`PlanCacheEntry`] records. The cache supports:
//!
//! - **Shape lookup**: [`PlanCache::get`] returns an immutable snapshot after
//!   checking the full key encoding, so a 32-bit hash collision never returns
//!   another shape's plan.
//! - **Promotion**: new entries start inactive and only become active once a
//!   later ranking (or replay) does at least as well as the recorded works.
//! - **Invalidation**: [`PlanCache::notify_of_index_updates`] swaps the
//!   indexability view and drops every entry.
//! - **Bounded growth**: beyond `max_entries`, the least-recently-written
//!   entry is evicted.
//! - **Statistics**: hit/miss/eviction counters are atomics.
//!
//! Readers share the map lock; writers hold it exclusively only for the map
//! mutation itself. Entries are `Arc`s and are copied before modification, so
//! a snapshot held by a reader never changes underneath it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shapecache_query::CanonicalQuery;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::entry::PlanCacheEntry;
use crate::error::PlanCacheError;
use crate::indexability::{IndexEntry, IndexabilityState};
use crate::key::{compute_key, ShapeKey};
use crate::ranker::PlanRankingDecision;
use crate::solution::QuerySolution;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Aggregate statistics about cache behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently cached.
    pub entries: usize,
    /// Lookups that found a matching entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries dropped to honour `max_entries`.
    pub evictions: u64,
    /// Index-change invalidations performed.
    pub invalidations: u64,
    /// Bumped on every clear or invalidation.
    pub generation: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0.0 when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// What a call to [`PlanCache::set`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// No entry existed; a new one was written.
    Created,
    /// An existing entry was replaced; active unless the ranking was tied.
    Replaced,
    /// An inactive entry kept its plan but its works threshold grew.
    WorksGrown,
    /// An active entry was better than the new ranking; nothing changed.
    Unchanged,
}

/// Feedback from replaying a cached plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Active entry performed within bounds.
    Confirmed,
    /// Entry is too slow for this replay; the caller should replan.
    NeedsReplan,
    /// Inactive entry matched its works and is now active.
    Promoted,
    /// Inactive entry missed its works; its threshold grew.
    Retained,
    /// No entry for this key.
    Missing,
}

struct Slot {
    /// Order in which the shape first entered the cache.
    inserted: u64,
    /// Order of the most recent write, used for eviction.
    written: u64,
    entry: Arc<PlanCacheEntry>,
}

// ---------------------------------------------------------------------------
// PlanCache
// ---------------------------------------------------------------------------

/// Shape-keyed cache of winning plans for one collection.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use serde_json::json;
/// use shapecache_core::{
///     pick_best_plan, CandidatePlan, PlanCache, PlanStageStats, QuerySolution,
///     SolutionCacheData, StageType, WorkingSet,
/// };
/// use shapecache_query::{canonicalize, QueryRequest};
///
/// let cache = PlanCache::default();
/// let query = canonicalize(&QueryRequest::new(json!({"a": 1}))).unwrap();
///
/// let stats = PlanStageStats::with_counts(StageType::Collscan, 10, 2, false);
/// let mut ws = WorkingSet::new();
/// let decision = pick_best_plan(&[CandidatePlan::new(&stats, &mut ws)]).unwrap();
/// let solutions = vec![QuerySolution::new("COLLSCAN", SolutionCacheData::collection_scan())];
///
/// cache.set(&query, &solutions, decision, Utc::now()).unwrap();
/// let entry = cache.get(&cache.compute_key(&query)).unwrap();
/// assert!(!entry.is_active);
/// ```
pub struct PlanCache {
    config: CacheConfig,
    /// plan cache key -> slot.
    entries: RwLock<HashMap<String, Slot>>,
    indexability: RwLock<IndexabilityState>,
    /// Source of `Slot::inserted` / `Slot::written`.
    sequence: AtomicU64,
    generation: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    eviction_count: AtomicU64,
    invalidation_count: AtomicU64,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::build(CacheConfig::default())
    }
}

impl PlanCache {
    /// Create a cache, rejecting an invalid configuration.
    pub fn new(config: CacheConfig) -> Result<Self, PlanCacheError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            indexability: RwLock::new(IndexabilityState::default()),
            sequence: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            invalidation_count: AtomicU64::new(0),
        }
    }

    /// The configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Key of `query` under the cache's current index view.
    pub fn compute_key(&self, query: &CanonicalQuery) -> ShapeKey {
        compute_key(query, &self.read_indexability())
    }

    /// Look up the entry for `key`.
    pub fn get(&self, key: &ShapeKey) -> Option<Arc<PlanCacheEntry>> {
        let found = self
            .read_entries()
            .get(key.plan_cache_key())
            .filter(|slot| slot.entry.encoded_key == key.encoded())
            .map(|slot| Arc::clone(&slot.entry));

        if found.is_some() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Whether an entry exists for `key`. Does not touch the hit counters.
    pub fn contains(&self, key: &ShapeKey) -> bool {
        self.read_entries()
            .get(key.plan_cache_key())
            .is_some_and(|slot| slot.entry.encoded_key == key.encoded())
    }

    /// Record the outcome of a ranking for `query`.
    ///
    /// `solutions[i]` must be the solution of the `i`th ranked candidate's
    /// input, so `decision.candidate_order` indexes into it.
    pub fn set(
        &self,
        query: &CanonicalQuery,
        solutions: &[QuerySolution],
        decision: PlanRankingDecision,
        now: DateTime<Utc>,
    ) -> Result<SetOutcome, PlanCacheError> {
        if solutions.is_empty() {
            return Err(PlanCacheError::EmptyCandidateSet);
        }
        if decision.candidate_order.is_empty() {
            return Err(PlanCacheError::NoViablePlan);
        }
        if decision.stats.len() != solutions.len() {
            return Err(PlanCacheError::StatsMismatch {
                stats: decision.stats.len(),
                solutions: solutions.len(),
            });
        }

        let planner_data = decision
            .candidate_order
            .iter()
            .map(|&i| {
                solutions
                    .get(i)
                    .and_then(|s| s.cache_data.clone())
                    .ok_or(PlanCacheError::UncacheableSolution(i))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Key under the entries lock so an index update cannot land between
        // keying and inserting.
        let mut entries = self.write_entries();
        let key = compute_key(query, &self.read_indexability());
        let tied = decision.tie_for_best;
        let mut entry = PlanCacheEntry::new(&key, query, planner_data, decision, now)
            .ok_or(PlanCacheError::NoViablePlan)?;
        let new_works = entry.works;

        let existing = entries
            .get(key.plan_cache_key())
            .filter(|slot| slot.entry.encoded_key == key.encoded())
            .map(|slot| (slot.entry.is_active, slot.entry.works));

        let outcome = match existing {
            None => {
                entry.is_active = self.config.disable_inactive_entries && !tied;
                debug!(
                    query_hash = key.query_hash(),
                    plan_cache_key = key.plan_cache_key(),
                    works = new_works,
                    active = entry.is_active,
                    "Creating plan cache entry"
                );
                self.evict_if_full(&mut entries, key.plan_cache_key());
                SetOutcome::Created
            }
            Some((true, works)) if new_works > works => {
                debug!(
                    query_hash = key.query_hash(),
                    works,
                    new_works,
                    "Active entry outperforms new plan; not replacing"
                );
                return Ok(SetOutcome::Unchanged);
            }
            Some((false, works)) if new_works > works => {
                let grown = self.config.grown_works(works);
                if let Some(slot) = entries.get_mut(key.plan_cache_key()) {
                    Arc::make_mut(&mut slot.entry).works = grown;
                    slot.written = self.next_sequence();
                }
                debug!(
                    query_hash = key.query_hash(),
                    works,
                    grown,
                    new_works,
                    "Inactive entry not beaten; growing works"
                );
                return Ok(SetOutcome::WorksGrown);
            }
            Some((was_active, works)) => {
                entry.is_active = !tied;
                debug!(
                    query_hash = key.query_hash(),
                    works,
                    new_works,
                    was_active,
                    tied,
                    "Replacing plan cache entry"
                );
                SetOutcome::Replaced
            }
        };

        let written = self.next_sequence();
        let inserted = entries
            .get(key.plan_cache_key())
            .filter(|slot| slot.entry.encoded_key == key.encoded())
            .map_or(written, |slot| slot.inserted);
        entries.insert(
            key.plan_cache_key().to_string(),
            Slot {
                inserted,
                written,
                entry: Arc::new(entry),
            },
        );
        Ok(outcome)
    }

    /// Remove the entry for `key`. Returns whether one was removed.
    pub fn remove(&self, key: &ShapeKey) -> bool {
        let mut entries = self.write_entries();
        let matches = entries
            .get(key.plan_cache_key())
            .is_some_and(|slot| slot.entry.encoded_key == key.encoded());
        if matches {
            entries.remove(key.plan_cache_key());
            debug!(query_hash = key.query_hash(), "Removed plan cache entry");
        }
        matches
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let removed = {
            let mut entries = self.write_entries();
            let n = entries.len();
            entries.clear();
            n
        };
        self.generation.fetch_add(1, Ordering::Relaxed);
        info!(removed, "Cleared plan cache");
    }

    /// Replace the index view and drop every entry.
    pub fn notify_of_index_updates(&self, indexes: &[IndexEntry]) {
        let state = IndexabilityState::new(indexes);
        let mut entries = self.write_entries();
        *self
            .indexability
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
        let removed = entries.len();
        entries.clear();
        drop(entries);

        self.invalidation_count.fetch_add(1, Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Relaxed);
        info!(
            index_count = indexes.len(),
            removed, "Index set changed; invalidated plan cache"
        );
    }

    /// Mark an active entry inactive. No-op for absent or inactive entries.
    pub fn deactivate(&self, key: &ShapeKey) {
        let mut entries = self.write_entries();
        if let Some(slot) = entries
            .get_mut(key.plan_cache_key())
            .filter(|slot| slot.entry.encoded_key == key.encoded() && slot.entry.is_active)
        {
            Arc::make_mut(&mut slot.entry).is_active = false;
            debug!(query_hash = key.query_hash(), "Deactivated plan cache entry");
        }
    }

    /// Feed back the works a replay of the cached plan actually took.
    pub fn record_replay(&self, key: &ShapeKey, observed_works: u64) -> ReplayOutcome {
        let mut entries = self.write_entries();
        let Some(slot) = entries
            .get_mut(key.plan_cache_key())
            .filter(|slot| slot.entry.encoded_key == key.encoded())
        else {
            return ReplayOutcome::Missing;
        };

        let works = slot.entry.works;
        let too_slow = self.config.exceeds_eviction_ratio(observed_works, works);
        let entry = Arc::make_mut(&mut slot.entry);
        entry.record_feedback(observed_works);

        let outcome = if entry.is_active {
            if too_slow {
                entry.is_active = false;
                ReplayOutcome::NeedsReplan
            } else {
                ReplayOutcome::Confirmed
            }
        } else if observed_works <= works {
            entry.is_active = true;
            entry.works = observed_works;
            ReplayOutcome::Promoted
        } else if too_slow {
            ReplayOutcome::NeedsReplan
        } else {
            entry.works = self.config.grown_works(works);
            ReplayOutcome::Retained
        };

        debug!(
            query_hash = key.query_hash(),
            works,
            observed_works,
            outcome = ?outcome,
            "Recorded plan replay"
        );
        outcome
    }

    /// Number of cached shapes.
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Whether no shape is cached.
    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// Snapshots of every entry, in the order their shapes were first cached.
    pub fn entries(&self) -> Vec<Arc<PlanCacheEntry>> {
        let entries = self.read_entries();
        let mut slots: Vec<&Slot> = entries.values().collect();
        slots.sort_by_key(|slot| slot.inserted);
        slots.into_iter().map(|slot| Arc::clone(&slot.entry)).collect()
    }

    /// Snapshot of the counters and current size.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            evictions: self.eviction_count.load(Ordering::Relaxed),
            invalidations: self.invalidation_count.load(Ordering::Relaxed),
            generation: self.generation.load(Ordering::Relaxed),
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Make room for a new key by dropping least-recently-written entries.
    fn evict_if_full(&self, entries: &mut HashMap<String, Slot>, incoming: &str) {
        while entries.len() >= self.config.max_entries && !entries.contains_key(incoming) {
            let victim = entries
                .iter()
                .min_by_key(|(_, slot)| slot.written)
                .map(|(k, _)| k.clone());
            let Some(victim) = victim else {
                break;
            };
            entries.remove(&victim);
            self.eviction_count.fetch_add(1, Ordering::Relaxed);
            debug!(plan_cache_key = %victim, "Evicted least recently written entry");
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_indexability(&self) -> RwLockReadGuard<'_, IndexabilityState> {
        self.indexability.read().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
