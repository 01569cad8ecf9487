// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Shapecache query canonicalizer.
//!
//! Turns a JSON query (filter, sort, projection, collation) into a
//! [`CanonicalQuery`]: a normalized match tree plus parsed sort, projection
//! and collation. The plan cache derives shape keys from canonical queries
//! only, so two requests that differ in conjunct order or literal values map
//! to the same shape.

pub mod algo;
pub mod collation;
pub mod error;
pub mod expr;
pub mod projection;
pub mod sort;
pub mod value;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub use algo::is_subset_of;
pub use collation::Collation;
pub use error::QueryError;
pub use expr::{CompareOp, MatchExpr, MatchKind};
pub use projection::{Projection, ProjectionKind};
pub use sort::{SortPart, SortPattern};
pub use value::ValueKind;

/// A query as received from a client, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default = "empty_object")]
    pub filter: Value,
    #[serde(default = "empty_object")]
    pub sort: Value,
    #[serde(default = "empty_object")]
    pub projection: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl QueryRequest {
    /// A request with `filter` and no sort, projection or collation.
    pub fn new(filter: Value) -> Self {
        Self {
            filter,
            sort: empty_object(),
            projection: empty_object(),
            collation: None,
        }
    }

    /// Attach a sort document.
    pub fn with_sort(mut self, sort: Value) -> Self {
        self.sort = sort;
        self
    }

    /// Attach a projection document.
    pub fn with_projection(mut self, projection: Value) -> Self {
        self.projection = projection;
        self
    }

    /// Attach a collation document.
    pub fn with_collation(mut self, collation: Value) -> Self {
        self.collation = Some(collation);
        self
    }
}

/// A validated, normalized query.
///
/// The original sort/projection/collation documents are retained for
/// introspection; the parsed forms drive key derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalQuery {
    filter: Value,
    root: MatchExpr,
    sort_spec: Value,
    sort: SortPattern,
    projection_spec: Value,
    projection: Projection,
    collation: Option<Collation>,
}

impl CanonicalQuery {
    /// Parse and normalize `request`.
    pub fn new(request: &QueryRequest) -> Result<Self, QueryError> {
        let root = MatchExpr::parse(&request.filter)?;
        let sort = SortPattern::parse(&request.sort)?;
        let projection = Projection::parse(&request.projection)?;
        let collation = match &request.collation {
            Some(spec) => Collation::parse(spec)?,
            None => None,
        };

        debug!(
            node_count = root.node_count(),
            sort_parts = sort.parts().len(),
            has_collation = collation.is_some(),
            "Canonicalized query"
        );

        Ok(Self {
            filter: request.filter.clone(),
            root,
            sort_spec: request.sort.clone(),
            sort,
            projection_spec: request.projection.clone(),
            projection,
            collation,
        })
    }

    /// The filter exactly as submitted.
    pub fn filter(&self) -> &Value {
        &self.filter
    }

    /// The normalized match tree.
    pub fn root(&self) -> &MatchExpr {
        &self.root
    }

    /// Parsed sort pattern.
    pub fn sort(&self) -> &SortPattern {
        &self.sort
    }

    /// Sort as the caller wrote it.
    pub fn sort_spec(&self) -> &Value {
        &self.sort_spec
    }

    /// Parsed projection.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Projection as the caller wrote it.
    pub fn projection_spec(&self) -> &Value {
        &self.projection_spec
    }

    /// Collation, or `None` for simple binary comparison.
    pub fn collation(&self) -> Option<&Collation> {
        self.collation.as_ref()
    }
}

/// Convenience wrapper around [`CanonicalQuery::new`].
pub fn canonicalize(request: &QueryRequest) -> Result<CanonicalQuery, QueryError> {
    CanonicalQuery::new(request)
}
