// SPDX-License-Identifier: PMPL-1.0-or-later
//! Query solutions and their replayable skeletons.
//!
//! A [`QuerySolution`] is what the planner hands the ranker for each
//! candidate. Only its [`SolutionCacheData`] is stored: the index-tag tree
//! that lets the planner rebuild the same plan for a later query of the same
//! shape without enumerating alternatives again.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Index assignment for one node of the match tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTag {
    /// Name of the index the node is answered from.
    pub index: String,
    /// Position of the node's path within the index key pattern.
    pub position: usize,
    /// Whether the predicate can be evaluated against index keys alone.
    #[serde(default)]
    pub can_combine_bounds: bool,
}

/// Index tags mirrored onto the shape of the normalized match tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCacheIndexTree {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<IndexTag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanCacheIndexTree>,
}

impl PlanCacheIndexTree {
    /// Leaf tagged with `index` at key position `position`.
    pub fn leaf(index: impl Into<String>, position: usize) -> Self {
        Self {
            tag: Some(IndexTag {
                index: index.into(),
                position,
                can_combine_bounds: true,
            }),
            children: Vec::new(),
        }
    }

    /// Interior node with untagged `children`.
    pub fn node(children: Vec<PlanCacheIndexTree>) -> Self {
        Self { tag: None, children }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "---".repeat(depth);
        match &self.tag {
            Some(tag) => writeln!(f, "{}Leaf {}, pos: {}", indent, tag.index, tag.position)?,
            None if self.children.is_empty() => writeln!(f, "{}Leaf (untagged)", indent)?,
            None => writeln!(f, "{}Node", indent)?,
        }
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanCacheIndexTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// How a cached solution is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolutionType {
    /// Re-tag the match tree from the stored index tree.
    UseIndexTags,
    /// Full collection scan.
    CollScan,
    /// Scan a whole index in one direction to provide the sort.
    WholeIndexScan { index: String, direction: i32 },
}

/// The replayable part of a solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionCacheData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<PlanCacheIndexTree>,
    pub solution_type: SolutionType,
    /// Whether an index filter restricted the candidate indexes.
    #[serde(default)]
    pub index_filter_applied: bool,
}

impl SolutionCacheData {
    /// Skeleton that replays the tagged index assignment.
    pub fn index_tags(tree: PlanCacheIndexTree) -> Self {
        Self {
            tree: Some(tree),
            solution_type: SolutionType::UseIndexTags,
            index_filter_applied: false,
        }
    }

    /// Skeleton for a full collection scan.
    pub fn collection_scan() -> Self {
        Self {
            tree: None,
            solution_type: SolutionType::CollScan,
            index_filter_applied: false,
        }
    }

    /// Skeleton for a full scan of `index` in `direction`.
    pub fn whole_index_scan(index: impl Into<String>, direction: i32) -> Self {
        Self {
            tree: None,
            solution_type: SolutionType::WholeIndexScan {
                index: index.into(),
                direction,
            },
            index_filter_applied: false,
        }
    }
}

impl fmt::Display for SolutionCacheData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.solution_type {
            SolutionType::UseIndexTags => {
                write!(f, "(index-tagged expression tree: tree=")?;
                match &self.tree {
                    Some(tree) => write!(f, "{}", tree)?,
                    None => write!(f, "(none)")?,
                }
                write!(f, ")")
            }
            SolutionType::CollScan => write!(f, "(collection scan)"),
            SolutionType::WholeIndexScan { index, direction } => {
                write!(f, "(whole index scan solution: index={}, direction={})", index, direction)
            }
        }
    }
}

/// A candidate solution produced by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySolution {
    /// Human-readable plan summary, e.g. `FETCH <- IXSCAN a_1`.
    pub summary: String,
    /// Skeleton for replay; `None` if the solution cannot be cached.
    pub cache_data: Option<SolutionCacheData>,
}

impl QuerySolution {
    /// A cacheable solution.
    pub fn new(summary: impl Into<String>, cache_data: SolutionCacheData) -> Self {
        Self {
            summary: summary.into(),
            cache_data: Some(cache_data),
        }
    }

    /// A solution with no skeleton; caching it fails.
    pub fn uncacheable(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            cache_data: None,
        }
    }
}
