// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Plan ranking.
//!
//! After a trial run, each candidate plan is scored from its statistics tree:
//!
//! ```text
//! score = 1 + advanced / works + tie_breakers
//! tie_breakers = eps * [no FETCH] + eps * [no SORT] + eps * [no AND_HASH/AND_SORTED]
//! eps = min(1 / (10 * works), 1e-4)
//! ```
//!
//! Plans that hit EOF during the trial receive an extra point when ordering,
//! which is not reported in the stored scores. Ordering is a stable descending
//! sort, so equal scores keep the order in which candidates were supplied.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::PlanCacheError;
use crate::stats::{PlanStageStats, StageType};

/// Scores closer than this are considered a tie.
pub const TIE_EPSILON: f64 = 1e-10;

/// Bonus for plans that finished during the trial.
pub const EOF_BONUS: f64 = 1.0;

/// Upper bound on a single tie-breaker increment.
const MAX_TIE_BREAKER: f64 = 1e-4;

/// Identifier of a working set member.
pub type WorkingSetId = u64;

/// The engine's buffer of intermediate results.
#[derive(Debug, Default)]
pub struct WorkingSet {
    next_id: WorkingSetId,
    members: HashMap<WorkingSetId, Value>,
}

impl WorkingSet {
    /// An empty working set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `doc` and return its id.
    pub fn allocate(&mut self, doc: Value) -> WorkingSetId {
        let id = self.next_id;
        self.next_id += 1;
        self.members.insert(id, doc);
        id
    }

    /// Document stored under `id`, if still allocated.
    pub fn get(&self, id: WorkingSetId) -> Option<&Value> {
        self.members.get(&id)
    }

    /// Release `id`, returning its document.
    pub fn free(&mut self, id: WorkingSetId) -> Option<Value> {
        self.members.remove(&id)
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no document is live.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// One plan under evaluation, borrowing the engine's state for the trial.
#[derive(Debug)]
pub struct CandidatePlan<'a> {
    /// Statistics of the plan's root stage.
    pub root: &'a PlanStageStats,
    pub working_set: &'a mut WorkingSet,
    /// Results produced during the trial, in order.
    pub results: VecDeque<WorkingSetId>,
    /// Whether the plan errored during the trial.
    pub failed: bool,
}

impl<'a> CandidatePlan<'a> {
    /// A candidate that completed its trial with the stats rooted at `root`.
    pub fn new(root: &'a PlanStageStats, working_set: &'a mut WorkingSet) -> Self {
        Self {
            root,
            working_set,
            results: VecDeque::new(),
            failed: false,
        }
    }

    /// Mark the candidate as having failed during its trial.
    pub fn failed(mut self) -> Self {
        self.failed = true;
        self
    }
}

/// Outcome of ranking a set of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRankingDecision {
    /// Stats of ranked plans (best first), followed by stats of failed plans.
    pub stats: Vec<PlanStageStats>,
    /// Scores of ranked plans, best first, without the EOF bonus.
    pub scores: Vec<f64>,
    /// `candidate_order[rank]` is the index of that plan among the inputs.
    pub candidate_order: Vec<usize>,
    /// Input indexes of plans that failed during the trial.
    pub failed_candidates: Vec<usize>,
    /// Whether the two best plans scored the same.
    pub tie_for_best: bool,
}

impl PlanRankingDecision {
    /// Input index of the winning plan.
    pub fn winner(&self) -> Option<usize> {
        self.candidate_order.first().copied()
    }

    /// Stats of the winning plan.
    pub fn winner_stats(&self) -> Option<&PlanStageStats> {
        if self.candidate_order.is_empty() {
            return None;
        }
        self.stats.first()
    }

    /// Total number of plans considered, including failed ones.
    pub fn candidate_count(&self) -> usize {
        self.candidate_order.len() + self.failed_candidates.len()
    }
}

/// Score one plan from its statistics tree.
pub fn score_tree(stats: &PlanStageStats) -> f64 {
    let works = stats.common.works;
    if works == 0 {
        return 1.0;
    }
    let productivity = stats.common.advanced as f64 / works as f64;
    let eps = (1.0 / (10.0 * works as f64)).min(MAX_TIE_BREAKER);

    let no_fetch = if stats.has_stage(StageType::Fetch) { 0.0 } else { eps };
    let no_sort = if stats.has_stage(StageType::Sort) { 0.0 } else { eps };
    let no_intersection = if stats.has_intersection() { 0.0 } else { eps };

    1.0 + productivity + no_fetch + no_sort + no_intersection
}

/// Rank candidates best to worst.
///
/// Fails with [`PlanCacheError::EmptyCandidateSet`] when given nothing to
/// rank and [`PlanCacheError::NoViablePlan`] when every candidate failed.
pub fn pick_best_plan(candidates: &[CandidatePlan<'_>]) -> Result<PlanRankingDecision, PlanCacheError> {
    if candidates.is_empty() {
        return Err(PlanCacheError::EmptyCandidateSet);
    }

    // (ordering score, stored score, input index)
    let mut ranked: Vec<(f64, f64, usize)> = Vec::with_capacity(candidates.len());
    let mut failed_candidates = Vec::new();

    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.failed {
            debug!(candidate = i, "Candidate failed during trial");
            failed_candidates.push(i);
            continue;
        }
        let score = score_tree(candidate.root);
        let bonus = if candidate.root.common.is_eof { EOF_BONUS } else { 0.0 };
        debug!(
            candidate = i,
            score,
            eof_bonus = bonus,
            works = candidate.root.common.works,
            advanced = candidate.root.common.advanced,
            "Scored candidate plan"
        );
        ranked.push((score + bonus, score, i));
    }

    if ranked.is_empty() {
        return Err(PlanCacheError::NoViablePlan);
    }

    // Stable: equal scores keep input order.
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let tie_for_best = ranked.len() > 1 && (ranked[0].0 - ranked[1].0).abs() < TIE_EPSILON;
    if tie_for_best {
        debug!(
            first = ranked[0].2,
            second = ranked[1].2,
            "Best plans are tied"
        );
    }

    let mut stats = Vec::with_capacity(candidates.len());
    let mut scores = Vec::with_capacity(ranked.len());
    let mut candidate_order = Vec::with_capacity(ranked.len());
    for &(_, score, i) in &ranked {
        stats.push(candidates[i].root.clone());
        scores.push(score);
        candidate_order.push(i);
    }
    for &i in &failed_candidates {
        stats.push(candidates[i].root.clone());
    }

    debug_assert_eq!(stats.len(), scores.len() + failed_candidates.len());

    Ok(PlanRankingDecision {
        stats,
        scores,
        candidate_order,
        failed_candidates,
        tie_for_best,
    })
}
