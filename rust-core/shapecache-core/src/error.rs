// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan cache error types.

use shapecache_query::QueryError;
use thiserror::Error;

/// Errors that can occur while ranking plans or writing to the plan cache.
#[derive(Error, Debug)]
pub enum PlanCacheError {
    /// Every candidate failed during its trial.
    #[error("no viable plan was found")]
    NoViablePlan,

    /// Ranking or caching was attempted with zero candidates.
    #[error("empty candidate set: no query solutions were supplied")]
    EmptyCandidateSet,

    /// The ranking decision and the solution list disagree in length.
    #[error("stats mismatch: decision has {stats} plan stats but {solutions} solutions were supplied")]
    StatsMismatch { stats: usize, solutions: usize },

    /// A ranked solution has no replayable skeleton.
    #[error("solution {0} has no cacheable skeleton")]
    UncacheableSolution(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid index specification: {0}")]
    InvalidIndexSpec(String),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
