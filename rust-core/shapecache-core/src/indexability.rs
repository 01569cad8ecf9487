// SPDX-License-Identifier: PMPL-1.0-or-later
//! Index metadata and indexability discriminators.
//!
//! Some indexes can only serve a query node if the node has a particular
//! property: a sparse index cannot answer `{a: null}`, a partial index only
//! covers queries implied by its filter, an index with a collation only helps
//! string comparisons made under that collation. The outcome of each check is
//! folded into the shape key, so queries that can use different index sets
//! never share a cache entry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shapecache_query::{is_subset_of, Collation, CompareOp, MatchExpr};
use shapecache_query::value::is_collatable;

use crate::error::PlanCacheError;

// ---------------------------------------------------------------------------
// Index metadata
// ---------------------------------------------------------------------------

/// Direction or special type of one key pattern component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDirection {
    Ascending,
    Descending,
    /// `"hashed"`, `"text"`, `"2d"`, `"2dsphere"`.
    Special(String),
}

impl KeyDirection {
    /// Parse a key pattern direction: `1`, `-1` or an index type string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_f64()? {
                d if d > 0.0 => Some(KeyDirection::Ascending),
                d if d < 0.0 => Some(KeyDirection::Descending),
                _ => None,
            },
            Value::String(s) if !s.is_empty() => Some(KeyDirection::Special(s.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    BTree,
    Hashed,
    Text,
    Geo2d,
    Geo2dSphere,
    Wildcard,
}

impl IndexType {
    /// Infer the access method from a key pattern.
    pub fn infer(key_pattern: &[(String, KeyDirection)]) -> Self {
        if key_pattern
            .iter()
            .any(|(path, _)| path == "$**" || path.ends_with(".$**"))
        {
            return IndexType::Wildcard;
        }
        for (_, direction) in key_pattern {
            if let KeyDirection::Special(kind) = direction {
                return match kind.as_str() {
                    "hashed" => IndexType::Hashed,
                    "text" => IndexType::Text,
                    "2d" => IndexType::Geo2d,
                    "2dsphere" => IndexType::Geo2dSphere,
                    _ => IndexType::BTree,
                };
            }
        }
        IndexType::BTree
    }
}

/// A catalog entry describing one index of the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub key_pattern: Vec<(String, KeyDirection)>,
    pub index_type: IndexType,
    pub sparse: bool,
    pub partial_filter: Option<MatchExpr>,
    pub collation: Option<Collation>,
    /// Field prefixes covered by a `$**` index; `None` covers every path.
    pub wildcard_projection: Option<Vec<String>>,
}

impl IndexEntry {
    /// An index over `key_pattern`, with its type inferred from the directions.
    pub fn new(name: impl Into<String>, key_pattern: Vec<(String, KeyDirection)>) -> Self {
        let index_type = IndexType::infer(&key_pattern);
        Self {
            name: name.into(),
            key_pattern,
            index_type,
            sparse: false,
            partial_filter: None,
            collation: None,
            wildcard_projection: None,
        }
    }

    /// Build an entry from a key pattern document such as `{a: 1, b: -1}`.
    pub fn from_key_pattern(name: impl Into<String>, pattern: &Value) -> Result<Self, PlanCacheError> {
        let obj = pattern
            .as_object()
            .ok_or_else(|| PlanCacheError::InvalidIndexSpec("key pattern must be an object".to_string()))?;
        if obj.is_empty() {
            return Err(PlanCacheError::InvalidIndexSpec("key pattern cannot be empty".to_string()));
        }
        let key_pattern = obj
            .iter()
            .map(|(path, dir)| {
                KeyDirection::from_value(dir)
                    .map(|d| (path.clone(), d))
                    .ok_or_else(|| {
                        PlanCacheError::InvalidIndexSpec(format!("bad direction for {}: {}", path, dir))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, key_pattern))
    }

    /// Mark the index sparse.
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Restrict the index to documents matching `filter`.
    pub fn with_partial_filter(mut self, filter: MatchExpr) -> Self {
        self.partial_filter = Some(filter);
        self
    }

    /// Give the index a collation.
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Limit a wildcard index to the given path prefixes.
    pub fn with_wildcard_projection(mut self, paths: Vec<String>) -> Self {
        self.wildcard_projection = Some(paths);
        self
    }

    /// Indexed paths, in key pattern order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.key_pattern.iter().map(|(p, _)| p.as_str())
    }
}

// ---------------------------------------------------------------------------
// Discriminators
// ---------------------------------------------------------------------------

/// One eligibility check for a query node against an index.
#[derive(Debug, Clone, PartialEq)]
pub enum Discriminator {
    /// Node does not need documents that lack the field.
    Sparse,
    /// Node is implied by this leaf of the index's partial filter.
    PartialFilter(MatchExpr),
    /// String comparisons in the node use the index's collation.
    Collation(Option<Collation>),
    /// Node can be answered from a wildcard index.
    Wildcard,
}

impl Discriminator {
    /// Evaluate against a node. `negated` is true when the node sits beneath
    /// an odd number of `$not`/`$nor`.
    pub fn evaluate(&self, node: &MatchExpr, negated: bool, query_collation: Option<&Collation>) -> bool {
        match self {
            Discriminator::Sparse => supported_by_sparse(node, negated),
            Discriminator::PartialFilter(leaf) => !negated && is_subset_of(node, leaf),
            Discriminator::Collation(index_collation) => {
                collation_compatible(node, index_collation.as_ref(), query_collation)
            }
            Discriminator::Wildcard => supported_by_wildcard(node, negated),
        }
    }
}

fn supported_by_sparse(node: &MatchExpr, negated: bool) -> bool {
    match node {
        MatchExpr::Compare {
            cmp: CompareOp::Eq,
            value,
            ..
        } => !value.is_null(),
        MatchExpr::In { values, .. } => !values.iter().any(Value::is_null),
        MatchExpr::Exists { .. } => !negated,
        _ => true,
    }
}

fn collation_compatible(
    node: &MatchExpr,
    index_collation: Option<&Collation>,
    query_collation: Option<&Collation>,
) -> bool {
    if index_collation == query_collation {
        return true;
    }
    match node {
        MatchExpr::Compare { value, .. } => !is_collatable(value),
        MatchExpr::In { values, .. } => !values.iter().any(is_collatable),
        _ => true,
    }
}

fn supported_by_wildcard(node: &MatchExpr, negated: bool) -> bool {
    match node {
        MatchExpr::Compare {
            cmp: CompareOp::Eq,
            value,
            ..
        } => !(value.is_object() || value.is_array()),
        MatchExpr::In { values, .. } => !values.iter().any(|v| v.is_object() || v.is_array()),
        MatchExpr::Exists { .. } => !negated,
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum WildcardCoverage {
    All,
    Prefixes(Vec<String>),
}

impl WildcardCoverage {
    fn covers(&self, path: &str) -> bool {
        match self {
            WildcardCoverage::All => true,
            WildcardCoverage::Prefixes(prefixes) => prefixes.iter().any(|p| {
                path == p || (path.starts_with(p.as_str()) && path.as_bytes().get(p.len()) == Some(&b'.'))
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct WildcardEntry {
    name: String,
    coverage: WildcardCoverage,
    discriminators: Vec<Discriminator>,
}

/// The cache's view of which index discriminators apply to which paths.
///
/// Rebuilt wholesale by [`IndexabilityState::update`] whenever the index set
/// changes; the plan cache is cleared at the same time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexabilityState {
    /// path -> index name -> discriminators.
    by_path: BTreeMap<String, BTreeMap<String, Vec<Discriminator>>>,
    wildcards: Vec<WildcardEntry>,
    index_count: usize,
}

impl IndexabilityState {
    /// Build the per-path discriminator table for `indexes`.
    pub fn new(indexes: &[IndexEntry]) -> Self {
        let mut state = Self::default();
        state.update(indexes);
        state
    }

    /// Replace the discriminators with those derived from `indexes`.
    pub fn update(&mut self, indexes: &[IndexEntry]) {
        self.by_path.clear();
        self.wildcards.clear();
        self.index_count = indexes.len();

        for index in indexes {
            if index.index_type == IndexType::Wildcard {
                self.add_wildcard(index);
                continue;
            }

            if index.sparse {
                for path in index.paths() {
                    self.push(path, &index.name, Discriminator::Sparse);
                }
            }
            if let Some(filter) = &index.partial_filter {
                for leaf in filter_leaves(filter) {
                    if let Some(path) = leaf.path() {
                        self.push(path, &index.name, Discriminator::PartialFilter(leaf.clone()));
                    }
                }
            }
            for path in index.paths() {
                self.push(path, &index.name, Discriminator::Collation(index.collation.clone()));
            }
        }
    }

    fn add_wildcard(&mut self, index: &IndexEntry) {
        let coverage = match &index.wildcard_projection {
            Some(paths) => WildcardCoverage::Prefixes(paths.clone()),
            None => {
                let prefixes: Vec<String> = index
                    .paths()
                    .filter_map(|p| p.strip_suffix(".$**").map(str::to_string))
                    .collect();
                if prefixes.is_empty() {
                    WildcardCoverage::All
                } else {
                    WildcardCoverage::Prefixes(prefixes)
                }
            }
        };
        let mut discriminators = vec![
            Discriminator::Wildcard,
            Discriminator::Sparse,
            Discriminator::Collation(index.collation.clone()),
        ];
        if let Some(filter) = &index.partial_filter {
            discriminators.extend(filter_leaves(filter).into_iter().cloned().map(Discriminator::PartialFilter));
        }
        self.wildcards.push(WildcardEntry {
            name: index.name.clone(),
            coverage,
            discriminators,
        });
    }

    fn push(&mut self, path: &str, index_name: &str, discriminator: Discriminator) {
        self.by_path
            .entry(path.to_string())
            .or_default()
            .entry(index_name.to_string())
            .or_default()
            .push(discriminator);
    }

    /// Discriminators relevant to `path`, keyed by index name.
    pub fn discriminators_for(&self, path: &str) -> BTreeMap<&str, Vec<&Discriminator>> {
        let mut out: BTreeMap<&str, Vec<&Discriminator>> = BTreeMap::new();
        if let Some(per_index) = self.by_path.get(path) {
            for (name, discs) in per_index {
                out.entry(name.as_str()).or_default().extend(discs.iter());
            }
        }
        for wildcard in &self.wildcards {
            if wildcard.coverage.covers(path) {
                out.entry(wildcard.name.as_str())
                    .or_default()
                    .extend(wildcard.discriminators.iter());
            }
        }
        out
    }

    /// One bit per relevant index (in index-name order) for a node, or `None`
    /// when no discriminator applies to the node's path.
    pub fn bits_for(
        &self,
        node: &MatchExpr,
        negated: bool,
        query_collation: Option<&Collation>,
    ) -> Option<IndexabilityBits> {
        let path = node.path().filter(|p| !p.is_empty())?;
        if node.is_logical() {
            return None;
        }
        let per_index = self.discriminators_for(path);
        if per_index.is_empty() {
            return None;
        }
        Some(IndexabilityBits(
            per_index
                .values()
                .map(|discs| discs.iter().all(|d| d.evaluate(node, negated, query_collation)))
                .collect(),
        ))
    }

    /// Number of indexes this state was built from.
    pub fn index_count(&self) -> usize {
        self.index_count
    }
}

/// Outcome of the discriminators for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexabilityBits(pub Vec<bool>);

impl fmt::Display for IndexabilityBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        for bit in &self.0 {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        f.write_str(">")
    }
}

fn filter_leaves(filter: &MatchExpr) -> Vec<&MatchExpr> {
    match filter {
        MatchExpr::And { children } => children.iter().filter(|c| !c.is_logical()).collect(),
        leaf if !leaf.is_logical() => vec![leaf],
        _ => Vec::new(),
    }
}
