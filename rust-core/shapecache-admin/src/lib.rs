// SPDX-License-Identifier: PMPL-1.0-or-later
//! Shapecache administrative surface.
//!
//! Introspection and manual invalidation of per-collection plan caches:
//! list cached shapes, list the plans cached for one shape, and clear one
//! shape or all of them. Errors render as `{ok: 0, codeName, errmsg}`.

pub mod command;
pub mod descriptor;
pub mod error;

pub use command::{
    ListPlansResponse, ListShapesResponse, PlanCacheCommands, PlanSummary, ShapeSummary, CLEAR,
    LIST_PLANS, LIST_SHAPES,
};
pub use descriptor::{parse_clear_target, parse_shape};
pub use error::{AdminError, ErrorResponse};
