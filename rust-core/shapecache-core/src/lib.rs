// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Shapecache core: a per-collection query plan cache.
//!
//! The pieces, leaves first:
//!
//! - [`key`]: shape keys from canonical queries, sensitive to sort,
//!   projection, collation and index eligibility, insensitive to literal
//!   values and conjunct order.
//! - [`indexability`]: index metadata and the discriminators whose results
//!   are folded into keys.
//! - [`ranker`]: scores candidate plans from trial statistics.
//! - [`cache`]: the shape → entry map with inactive/active promotion,
//!   invalidation on index changes and bounded growth.
//! - [`gate`] and [`registry`]: replan admission and per-namespace caches.

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod gate;
pub mod indexability;
pub mod key;
pub mod ranker;
pub mod registry;
pub mod solution;
pub mod stats;

pub use cache::{CacheStats, PlanCache, ReplayOutcome, SetOutcome};
pub use config::CacheConfig;
pub use entry::PlanCacheEntry;
pub use error::PlanCacheError;
pub use gate::{ReplanGate, ReplanGuard};
pub use indexability::{IndexEntry, IndexType, IndexabilityState, KeyDirection};
pub use key::{compute_key, ShapeKey};
pub use ranker::{pick_best_plan, score_tree, CandidatePlan, PlanRankingDecision, WorkingSet};
pub use registry::PlanCacheRegistry;
pub use solution::{PlanCacheIndexTree, QuerySolution, SolutionCacheData, SolutionType};
pub use stats::{CommonStats, PlanStageStats, StageType};
