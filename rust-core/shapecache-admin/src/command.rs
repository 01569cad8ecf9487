// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Plan cache commands.
//!
//! Three commands are supported, each addressed to a collection namespace:
//!
//! - `planCacheListQueryShapes`: every cached shape.
//! - `planCacheListPlans`: the ranked plans cached for one shape.
//! - `planCacheClear`: drop one shape, or the whole cache when no query is given.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shapecache_core::{PlanCacheEntry, PlanCacheRegistry, PlanStageStats};
use tracing::{debug, info};

use crate::descriptor::{parse_clear_target, parse_shape};
use crate::error::AdminError;

pub const LIST_SHAPES: &str = "planCacheListQueryShapes";
pub const LIST_PLANS: &str = "planCacheListPlans";
pub const CLEAR: &str = "planCacheClear";

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// One entry of a `listShapes` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeSummary {
    pub query: Value,
    pub sort: Value,
    pub projection: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<Value>,
    pub query_hash: String,
}

impl From<&PlanCacheEntry> for ShapeSummary {
    fn from(entry: &PlanCacheEntry) -> Self {
        Self {
            query: entry.query.clone(),
            sort: entry.sort.clone(),
            projection: entry.projection.clone(),
            collation: entry.collation.clone(),
            query_hash: entry.query_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListShapesResponse {
    pub shapes: Vec<ShapeSummary>,
    pub ok: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDetails {
    /// Rendered solution skeleton; absent for plans that failed their trial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReason {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<bool>,
    pub stats: PlanStageStats,
}

/// Replay feedback; only reported for the winning plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfeedback: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_works: Option<Vec<u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub details: PlanDetails,
    pub reason: PlanReason,
    pub feedback: PlanFeedback,
    pub filter_set: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPlansResponse {
    pub plans: Vec<PlanSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_creation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_cache_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub works: Option<u64>,
    pub ok: f64,
}

impl ListPlansResponse {
    fn empty() -> Self {
        Self {
            plans: Vec::new(),
            time_of_creation: None,
            query_hash: None,
            plan_cache_key: None,
            is_active: None,
            works: None,
            ok: 1.0,
        }
    }

    fn from_entry(entry: &PlanCacheEntry) -> Self {
        let decision = &entry.decision;
        let ranked = decision.candidate_order.len();
        let filter_set = entry.cached_solution.index_filter_applied;

        let mut plans = Vec::with_capacity(decision.stats.len());
        for (rank, stats) in decision.stats.iter().enumerate() {
            let summary = if rank < ranked {
                let feedback = if rank == 0 {
                    PlanFeedback {
                        nfeedback: Some(entry.feedback.len()),
                        observed_works: Some(entry.feedback.clone()),
                    }
                } else {
                    PlanFeedback::default()
                };
                PlanSummary {
                    details: PlanDetails {
                        solution: entry.planner_data.get(rank).map(|s| s.to_string()),
                    },
                    reason: PlanReason {
                        score: decision.scores.get(rank).copied().unwrap_or(0.0),
                        failed: None,
                        stats: stats.clone(),
                    },
                    feedback,
                    filter_set,
                }
            } else {
                PlanSummary {
                    details: PlanDetails { solution: None },
                    reason: PlanReason {
                        score: 0.0,
                        failed: Some(true),
                        stats: stats.clone(),
                    },
                    feedback: PlanFeedback::default(),
                    filter_set,
                }
            };
            plans.push(summary);
        }

        Self {
            plans,
            time_of_creation: Some(entry.time_of_creation.to_rfc3339()),
            query_hash: Some(entry.query_hash.clone()),
            plan_cache_key: Some(entry.plan_cache_key.clone()),
            is_active: Some(entry.is_active),
            works: Some(entry.works),
            ok: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Administrative entry point over a registry of per-collection caches.
#[derive(Clone)]
pub struct PlanCacheCommands {
    registry: Arc<PlanCacheRegistry>,
}

impl PlanCacheCommands {
    /// Commands served from `registry`.
    pub fn new(registry: Arc<PlanCacheRegistry>) -> Self {
        Self { registry }
    }

    /// The registry the commands operate on.
    pub fn registry(&self) -> &Arc<PlanCacheRegistry> {
        &self.registry
    }

    /// Every cached shape of `namespace`, oldest first. Unknown namespaces
    /// have no shapes.
    pub fn list_shapes(&self, namespace: &str) -> ListShapesResponse {
        let shapes = match self.registry.get(namespace) {
            Some(cache) => cache
                .entries()
                .iter()
                .map(|entry| ShapeSummary::from(entry.as_ref()))
                .collect(),
            None => Vec::new(),
        };
        debug!(namespace, count = shapes.len(), "Listed plan cache shapes");
        ListShapesResponse { shapes, ok: 1.0 }
    }

    /// Plans cached for the shape named by `cmd`.
    pub fn list_plans(&self, namespace: &str, cmd: &Value) -> Result<ListPlansResponse, AdminError> {
        let cache = self
            .registry
            .get(namespace)
            .ok_or_else(|| AdminError::NamespaceNotFound(namespace.to_string()))?;
        let shape = parse_shape(cmd)?;
        let key = cache.compute_key(&shape);

        Ok(match cache.get(&key) {
            Some(entry) => ListPlansResponse::from_entry(&entry),
            None => {
                debug!(namespace, query_hash = key.query_hash(), "No plans cached for shape");
                ListPlansResponse::empty()
            }
        })
    }

    /// Drop the shape named by `cmd`, or every shape when `cmd` has no query.
    pub fn clear(&self, namespace: &str, cmd: &Value) -> Result<(), AdminError> {
        let target = parse_clear_target(cmd)?;
        let Some(cache) = self.registry.get(namespace) else {
            return Ok(());
        };
        match target {
            Some(shape) => {
                let key = cache.compute_key(&shape);
                let removed = cache.remove(&key);
                info!(namespace, query_hash = key.query_hash(), removed, "Cleared plan cache shape");
            }
            None => cache.clear(),
        }
        Ok(())
    }

    /// Run a command by name and render the result, errors included.
    pub fn run(&self, namespace: &str, command: &str, cmd: &Value) -> Value {
        let result = match command {
            LIST_SHAPES => serde_json::to_value(self.list_shapes(namespace)).map_err(AdminError::from),
            LIST_PLANS => self
                .list_plans(namespace, cmd)
                .and_then(|r| serde_json::to_value(r).map_err(AdminError::from)),
            CLEAR => self.clear(namespace, cmd).map(|()| json!({"ok": 1.0})),
            other => Err(AdminError::UnknownCommand(other.to_string())),
        };
        result.unwrap_or_else(|err| {
            debug!(namespace, command, error = %err, "Plan cache command failed");
            serde_json::to_value(err.into_response())
                .unwrap_or_else(|_| json!({"ok": 0.0, "codeName": "InternalError"}))
        })
    }
}
