// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan cache entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shapecache_query::CanonicalQuery;

use crate::key::ShapeKey;
use crate::ranker::PlanRankingDecision;
use crate::solution::SolutionCacheData;

/// Most replay observations kept per entry.
pub const MAX_FEEDBACK: usize = 20;

/// The record stored for one shape.
///
/// Entries are immutable once shared; the cache rewrites `works`,
/// `is_active` and `feedback` on a private copy before publishing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCacheEntry {
    /// Full key encoding, checked on lookup to rule out hash collisions.
    pub encoded_key: String,
    pub query_hash: String,
    pub plan_cache_key: String,
    /// The filter as first submitted for this shape.
    pub query: Value,
    pub sort: Value,
    pub projection: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<Value>,
    /// Skeleton of the winning plan.
    pub cached_solution: SolutionCacheData,
    /// Skeletons of every ranked plan, best first.
    pub planner_data: Vec<SolutionCacheData>,
    /// Ranking that produced this entry.
    pub decision: PlanRankingDecision,
    pub time_of_creation: DateTime<Utc>,
    /// Work budget a replay is measured against.
    pub works: u64,
    pub is_active: bool,
    /// Works observed on recent replays, oldest first.
    #[serde(default)]
    pub feedback: Vec<u64>,
}

impl PlanCacheEntry {
    /// Build an inactive entry. Ranked skeletons must be in decision order.
    pub fn new(
        key: &ShapeKey,
        query: &CanonicalQuery,
        planner_data: Vec<SolutionCacheData>,
        decision: PlanRankingDecision,
        time_of_creation: DateTime<Utc>,
    ) -> Option<Self> {
        let cached_solution = planner_data.first()?.clone();
        let works = decision.winner_stats()?.common.works;
        Some(Self {
            encoded_key: key.encoded().to_string(),
            query_hash: key.query_hash().to_string(),
            plan_cache_key: key.plan_cache_key().to_string(),
            query: query.filter().clone(),
            sort: query.sort_spec().clone(),
            projection: query.projection_spec().clone(),
            collation: query.collation().map(|c| c.to_json()),
            cached_solution,
            planner_data,
            decision,
            time_of_creation,
            works,
            is_active: false,
            feedback: Vec::new(),
        })
    }

    /// Number of candidate plans considered, including failed ones.
    pub fn num_candidates(&self) -> usize {
        self.decision.candidate_count()
    }

    /// Append a replay observation, dropping the oldest past the bound.
    pub(crate) fn record_feedback(&mut self, observed_works: u64) {
        if self.feedback.len() >= MAX_FEEDBACK {
            self.feedback.remove(0);
        }
        self.feedback.push(observed_works);
    }
}
