// SPDX-License-Identifier: PMPL-1.0-or-later
//! Execution statistics for plan stage trees.
//!
//! The execution engine produces one [`PlanStageStats`] tree per candidate
//! plan during a trial run. The ranker reads these trees and the cache keeps
//! owned copies for introspection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of an execution stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageType {
    Collscan,
    Ixscan,
    Fetch,
    Sort,
    SortMerge,
    AndHash,
    AndSorted,
    Or,
    Limit,
    Skip,
    Projection,
    Count,
    Text,
    Eof,
}

impl StageType {
    /// Whether this stage intersects the output of several index scans.
    pub fn is_intersection(self) -> bool {
        matches!(self, StageType::AndHash | StageType::AndSorted)
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageType::Collscan => "COLLSCAN",
            StageType::Ixscan => "IXSCAN",
            StageType::Fetch => "FETCH",
            StageType::Sort => "SORT",
            StageType::SortMerge => "SORT_MERGE",
            StageType::AndHash => "AND_HASH",
            StageType::AndSorted => "AND_SORTED",
            StageType::Or => "OR",
            StageType::Limit => "LIMIT",
            StageType::Skip => "SKIP",
            StageType::Projection => "PROJECTION",
            StageType::Count => "COUNT",
            StageType::Text => "TEXT",
            StageType::Eof => "EOF",
        };
        f.write_str(name)
    }
}

/// Counters every stage maintains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonStats {
    /// Units of work performed.
    pub works: u64,
    /// Results returned to the parent.
    pub advanced: u64,
    pub need_time: u64,
    pub need_yield: u64,
    /// Whether the stage ran out of results.
    pub is_eof: bool,
    #[serde(default)]
    pub keys_examined: u64,
    #[serde(default)]
    pub docs_examined: u64,
}

/// Statistics for one stage and its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStageStats {
    pub stage: StageType,
    pub common: CommonStats,
    /// Index used by an `IXSCAN` stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanStageStats>,
}

impl PlanStageStats {
    /// A leaf stage with the given counters.
    pub fn new(stage: StageType, common: CommonStats) -> Self {
        Self {
            stage,
            common,
            index_name: None,
            children: Vec::new(),
        }
    }

    /// Leaf or root with only the counters the ranker reads.
    pub fn with_counts(stage: StageType, works: u64, advanced: u64, is_eof: bool) -> Self {
        Self::new(
            stage,
            CommonStats {
                works,
                advanced,
                is_eof,
                ..CommonStats::default()
            },
        )
    }

    /// Append `child` as an input stage.
    pub fn with_child(mut self, child: PlanStageStats) -> Self {
        self.children.push(child);
        self
    }

    /// Name the index this stage reads.
    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Whether any stage in the tree has the given type.
    pub fn has_stage(&self, stage: StageType) -> bool {
        self.stage == stage || self.children.iter().any(|c| c.has_stage(stage))
    }

    /// Whether any stage in the tree intersects index scans.
    pub fn has_intersection(&self) -> bool {
        self.stage.is_intersection() || self.children.iter().any(PlanStageStats::has_intersection)
    }

    /// Keys examined across the whole tree.
    pub fn total_keys_examined(&self) -> u64 {
        self.common.keys_examined
            + self.children.iter().map(PlanStageStats::total_keys_examined).sum::<u64>()
    }

    /// Documents examined across the whole tree.
    pub fn total_docs_examined(&self) -> u64 {
        self.common.docs_examined
            + self.children.iter().map(PlanStageStats::total_docs_examined).sum::<u64>()
    }

    /// Number of stages in the tree.
    pub fn stage_count(&self) -> usize {
        1 + self.children.iter().map(PlanStageStats::stage_count).sum::<usize>()
    }
}
