// SPDX-License-Identifier: PMPL-1.0-or-later
//! Match expression tree and filter parsing.
//!
//! A filter document is parsed into a [`MatchExpr`] tree and then normalized:
//! nested `$and`/`$or` are flattened, single-child conjunctions collapse, and
//! children of commutative nodes are sorted by a value-independent ordering
//! ([`MatchExpr::shape_cmp`]). Two filters that differ only in conjunct order
//! or literal values therefore normalize to trees with the same shape.

use std::cmp::Ordering;
use std::slice;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::value::{is_truthy, type_name, ValueKind};

/// Comparison operator of a leaf predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn from_operator(op: &str) -> Option<Self> {
        match op {
            "$eq" => Some(CompareOp::Eq),
            "$lt" => Some(CompareOp::Lt),
            "$lte" => Some(CompareOp::Lte),
            "$gt" => Some(CompareOp::Gt),
            "$gte" => Some(CompareOp::Gte),
            _ => None,
        }
    }
}

/// Node kind, ordered. The derived order is the primary sort key of
/// [`MatchExpr::shape_cmp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    And,
    Or,
    Nor,
    Not,
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Exists,
    Regex,
    Type,
    Size,
    ElemMatchObject,
    ElemMatchValue,
}

/// A node of a parsed filter.
///
/// `$ne` and `$nin` are represented as `Not(Compare{Eq})` and `Not(In)`;
/// `$exists: false` as `Not(Exists)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MatchExpr {
    And { children: Vec<MatchExpr> },
    Or { children: Vec<MatchExpr> },
    Nor { children: Vec<MatchExpr> },
    Not { child: Box<MatchExpr> },
    Compare { path: String, cmp: CompareOp, value: Value },
    In { path: String, values: Vec<Value> },
    Exists { path: String },
    Regex { path: String, pattern: String, flags: String },
    Type { path: String, kinds: Vec<ValueKind> },
    Size { path: String, size: u64 },
    ElemMatchObject { path: String, child: Box<MatchExpr> },
    ElemMatchValue { path: String, children: Vec<MatchExpr> },
}

impl MatchExpr {
    /// Parse and normalize a filter document.
    pub fn parse(filter: &Value) -> Result<Self, QueryError> {
        let obj = filter
            .as_object()
            .ok_or_else(|| QueryError::FilterNotObject(type_name(filter).to_string()))?;
        let children = parse_object(obj)?;
        Ok(MatchExpr::And { children }.normalize())
    }

    /// Node kind, ignoring path and operands.
    pub fn kind(&self) -> MatchKind {
        match self {
            MatchExpr::And { .. } => MatchKind::And,
            MatchExpr::Or { .. } => MatchKind::Or,
            MatchExpr::Nor { .. } => MatchKind::Nor,
            MatchExpr::Not { .. } => MatchKind::Not,
            MatchExpr::Compare { cmp, .. } => match cmp {
                CompareOp::Eq => MatchKind::Eq,
                CompareOp::Lt => MatchKind::Lt,
                CompareOp::Lte => MatchKind::Lte,
                CompareOp::Gt => MatchKind::Gt,
                CompareOp::Gte => MatchKind::Gte,
            },
            MatchExpr::In { .. } => MatchKind::In,
            MatchExpr::Exists { .. } => MatchKind::Exists,
            MatchExpr::Regex { .. } => MatchKind::Regex,
            MatchExpr::Type { .. } => MatchKind::Type,
            MatchExpr::Size { .. } => MatchKind::Size,
            MatchExpr::ElemMatchObject { .. } => MatchKind::ElemMatchObject,
            MatchExpr::ElemMatchValue { .. } => MatchKind::ElemMatchValue,
        }
    }

    /// Field path of a leaf or `$elemMatch` node; `None` for logical nodes.
    pub fn path(&self) -> Option<&str> {
        match self {
            MatchExpr::And { .. }
            | MatchExpr::Or { .. }
            | MatchExpr::Nor { .. }
            | MatchExpr::Not { .. } => None,
            MatchExpr::Compare { path, .. }
            | MatchExpr::In { path, .. }
            | MatchExpr::Exists { path }
            | MatchExpr::Regex { path, .. }
            | MatchExpr::Type { path, .. }
            | MatchExpr::Size { path, .. }
            | MatchExpr::ElemMatchObject { path, .. }
            | MatchExpr::ElemMatchValue { path, .. } => Some(path),
        }
    }

    /// Child expressions; empty for leaves.
    pub fn children(&self) -> &[MatchExpr] {
        match self {
            MatchExpr::And { children }
            | MatchExpr::Or { children }
            | MatchExpr::Nor { children }
            | MatchExpr::ElemMatchValue { children, .. } => children,
            MatchExpr::Not { child } | MatchExpr::ElemMatchObject { child, .. } => {
                slice::from_ref(child.as_ref())
            }
            _ => &[],
        }
    }

    /// Whether the node is `$and`, `$or`, `$nor` or `$not`.
    pub fn is_logical(&self) -> bool {
        matches!(
            self,
            MatchExpr::And { .. } | MatchExpr::Or { .. } | MatchExpr::Nor { .. } | MatchExpr::Not { .. }
        )
    }

    /// Value-independent total order over shapes: kind, then path, then
    /// the shape payload (regex flags, type set), then children pairwise,
    /// then child count. `Equal` means the shapes are indistinguishable.
    pub fn shape_cmp(&self, other: &MatchExpr) -> Ordering {
        self.kind()
            .cmp(&other.kind())
            .then_with(|| self.path().unwrap_or("").cmp(other.path().unwrap_or("")))
            .then_with(|| match (self, other) {
                (MatchExpr::Regex { flags: a, .. }, MatchExpr::Regex { flags: b, .. }) => a.cmp(b),
                (MatchExpr::Type { kinds: a, .. }, MatchExpr::Type { kinds: b, .. }) => a.cmp(b),
                _ => Ordering::Equal,
            })
            .then_with(|| {
                let (lhs, rhs) = (self.children(), other.children());
                lhs.iter()
                    .zip(rhs)
                    .map(|(a, b)| a.shape_cmp(b))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or_else(|| lhs.len().cmp(&rhs.len()))
            })
    }

    /// Flatten, collapse, and sort the tree.
    pub fn normalize(self) -> MatchExpr {
        match self {
            MatchExpr::And { children } => {
                let mut children = flatten(children, MatchKind::And);
                if children.len() == 1 {
                    return children.remove(0);
                }
                children.sort_by(|a, b| a.shape_cmp(b));
                MatchExpr::And { children }
            }
            MatchExpr::Or { children } => {
                let mut children = flatten(children, MatchKind::Or);
                if children.len() == 1 {
                    return children.remove(0);
                }
                children.sort_by(|a, b| a.shape_cmp(b));
                MatchExpr::Or { children }
            }
            MatchExpr::Nor { children } => {
                let mut children: Vec<MatchExpr> =
                    children.into_iter().map(MatchExpr::normalize).collect();
                children.sort_by(|a, b| a.shape_cmp(b));
                MatchExpr::Nor { children }
            }
            MatchExpr::Not { child } => MatchExpr::Not {
                child: Box::new(child.normalize()),
            },
            MatchExpr::ElemMatchObject { path, child } => MatchExpr::ElemMatchObject {
                path,
                child: Box::new(child.normalize()),
            },
            MatchExpr::ElemMatchValue { path, children } => {
                let mut children: Vec<MatchExpr> =
                    children.into_iter().map(MatchExpr::normalize).collect();
                children.sort_by(|a, b| a.shape_cmp(b));
                MatchExpr::ElemMatchValue { path, children }
            }
            leaf => leaf,
        }
    }

    /// Number of nodes in the tree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(MatchExpr::node_count).sum::<usize>()
    }
}

fn flatten(children: Vec<MatchExpr>, kind: MatchKind) -> Vec<MatchExpr> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        let child = child.normalize();
        if child.kind() == kind {
            match child {
                MatchExpr::And { children } | MatchExpr::Or { children } => out.extend(children),
                other => out.push(other),
            }
        } else {
            out.push(child);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_object(obj: &Map<String, Value>) -> Result<Vec<MatchExpr>, QueryError> {
    let mut out = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        if key.starts_with('$') {
            out.push(parse_top_level(key, value)?);
        } else {
            out.extend(parse_path(key, value)?);
        }
    }
    Ok(out)
}

fn parse_top_level(key: &str, value: &Value) -> Result<MatchExpr, QueryError> {
    match key {
        "$and" | "$or" | "$nor" => {
            let clauses = value
                .as_array()
                .ok_or_else(|| QueryError::bad_operand(key, "must be an array"))?;
            if clauses.is_empty() {
                return Err(QueryError::bad_operand(key, "must be a nonempty array"));
            }
            let mut children = Vec::with_capacity(clauses.len());
            for clause in clauses {
                let obj = clause
                    .as_object()
                    .ok_or_else(|| QueryError::bad_operand(key, "entries must be objects"))?;
                children.push(MatchExpr::And {
                    children: parse_object(obj)?,
                });
            }
            Ok(match key {
                "$and" => MatchExpr::And { children },
                "$or" => MatchExpr::Or { children },
                _ => MatchExpr::Nor { children },
            })
        }
        other => Err(QueryError::UnknownOperator(other.to_string())),
    }
}

fn parse_path(path: &str, value: &Value) -> Result<Vec<MatchExpr>, QueryError> {
    let obj = match value {
        Value::Object(obj) if obj.keys().next().is_some_and(|k| k.starts_with('$')) => obj,
        _ => {
            return Ok(vec![MatchExpr::Compare {
                path: path.to_string(),
                cmp: CompareOp::Eq,
                value: value.clone(),
            }])
        }
    };

    let mut out = Vec::with_capacity(obj.len());
    for (op, operand) in obj {
        if !op.starts_with('$') {
            return Err(QueryError::UnknownOperator(op.clone()));
        }
        if let Some(expr) = parse_operator(path, op, operand, obj)? {
            out.push(expr);
        }
    }
    Ok(out)
}

fn parse_operator(
    path: &str,
    op: &str,
    operand: &Value,
    siblings: &Map<String, Value>,
) -> Result<Option<MatchExpr>, QueryError> {
    let path_owned = || path.to_string();

    if let Some(cmp) = CompareOp::from_operator(op) {
        return Ok(Some(MatchExpr::Compare {
            path: path_owned(),
            cmp,
            value: operand.clone(),
        }));
    }

    let expr = match op {
        "$ne" => not(MatchExpr::Compare {
            path: path_owned(),
            cmp: CompareOp::Eq,
            value: operand.clone(),
        }),
        "$in" | "$nin" => {
            let values = operand
                .as_array()
                .ok_or_else(|| QueryError::bad_operand(op, "needs an array"))?
                .clone();
            let expr = MatchExpr::In {
                path: path_owned(),
                values,
            };
            if op == "$in" {
                expr
            } else {
                not(expr)
            }
        }
        "$exists" => {
            let expr = MatchExpr::Exists { path: path_owned() };
            if is_truthy(operand) {
                expr
            } else {
                not(expr)
            }
        }
        "$regex" => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| QueryError::bad_operand(op, "needs a string"))?
                .to_string();
            let flags = match siblings.get("$options") {
                Some(Value::String(flags)) => flags.clone(),
                Some(other) => {
                    return Err(QueryError::bad_operand(
                        "$options",
                        format!("needs a string, got {}", type_name(other)),
                    ))
                }
                None => String::new(),
            };
            validate_regex(&pattern, &flags)?;
            MatchExpr::Regex {
                path: path_owned(),
                pattern,
                flags,
            }
        }
        "$options" => {
            if !siblings.contains_key("$regex") {
                return Err(QueryError::bad_operand(op, "needs a $regex"));
            }
            return Ok(None);
        }
        "$type" => {
            let args: Vec<&Value> = match operand {
                Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };
            if args.is_empty() {
                return Err(QueryError::bad_operand(op, "must name at least one type"));
            }
            let mut kinds = args
                .into_iter()
                .map(|arg| {
                    ValueKind::from_type_arg(arg)
                        .ok_or_else(|| QueryError::bad_operand(op, format!("unknown type {}", arg)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            kinds.sort();
            kinds.dedup();
            MatchExpr::Type {
                path: path_owned(),
                kinds,
            }
        }
        "$size" => {
            let size = operand
                .as_u64()
                .or_else(|| operand.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
                .ok_or_else(|| QueryError::bad_operand(op, "needs a non-negative integer"))?;
            MatchExpr::Size {
                path: path_owned(),
                size,
            }
        }
        "$all" => {
            let items = operand
                .as_array()
                .ok_or_else(|| QueryError::bad_operand(op, "needs an array"))?;
            if items.is_empty() {
                return Err(QueryError::bad_operand(op, "needs a nonempty array"));
            }
            MatchExpr::And {
                children: items
                    .iter()
                    .map(|item| MatchExpr::Compare {
                        path: path_owned(),
                        cmp: CompareOp::Eq,
                        value: item.clone(),
                    })
                    .collect(),
            }
        }
        "$elemMatch" => {
            let inner = operand
                .as_object()
                .ok_or_else(|| QueryError::bad_operand(op, "needs an object"))?;
            if is_value_elem_match(inner) {
                let mut children = Vec::with_capacity(inner.len());
                for (inner_op, inner_operand) in inner {
                    if let Some(expr) = parse_operator("", inner_op, inner_operand, inner)? {
                        children.push(expr);
                    }
                }
                MatchExpr::ElemMatchValue {
                    path: path_owned(),
                    children,
                }
            } else {
                MatchExpr::ElemMatchObject {
                    path: path_owned(),
                    child: Box::new(MatchExpr::And {
                        children: parse_object(inner)?,
                    }),
                }
            }
        }
        "$not" => {
            let inner = operand
                .as_object()
                .ok_or_else(|| QueryError::bad_operand(op, "needs an object"))?;
            if inner.is_empty() {
                return Err(QueryError::bad_operand(op, "cannot be empty"));
            }
            let children = parse_path(path, operand)?;
            if children.is_empty() {
                return Err(QueryError::bad_operand(op, "needs at least one operator"));
            }
            not(MatchExpr::And { children })
        }
        other => return Err(QueryError::UnknownOperator(other.to_string())),
    };
    Ok(Some(expr))
}

fn not(expr: MatchExpr) -> MatchExpr {
    MatchExpr::Not {
        child: Box::new(expr),
    }
}

/// `{$elemMatch: {$gt: 1}}` matches array values directly; `{$elemMatch: {b: 1}}`
/// matches embedded documents.
fn is_value_elem_match(inner: &Map<String, Value>) -> bool {
    !inner.is_empty()
        && inner
            .keys()
            .all(|k| k.starts_with('$') && !matches!(k.as_str(), "$and" | "$or" | "$nor"))
}

/// Reject patterns and `$options` the regex engine would not accept.
fn validate_regex(pattern: &str, flags: &str) -> Result<(), QueryError> {
    let mut builder = regex::RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(QueryError::bad_operand(
                    "$options",
                    format!("invalid flag '{}'", other),
                ))
            }
        };
    }
    builder
        .build()
        .map(|_| ())
        .map_err(|e| QueryError::bad_operand("$regex", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_equality_collapses() {
        let expr = MatchExpr::parse(&json!({"a": 1})).unwrap();
        assert_eq!(
            expr,
            MatchExpr::Compare {
                path: "a".to_string(),
                cmp: CompareOp::Eq,
                value: json!(1)
            }
        );
    }

    #[test]
    fn test_empty_filter_is_empty_and() {
        let expr = MatchExpr::parse(&json!({})).unwrap();
        assert_eq!(expr, MatchExpr::And { children: vec![] });
    }

    #[test]
    fn test_conjunct_order_normalizes() {
        let a = MatchExpr::parse(&json!({"a": 1, "b": 1})).unwrap();
        let b = MatchExpr::parse(&json!({"b": 3, "a": 3})).unwrap();
        assert_eq!(a.shape_cmp(&b), Ordering::Equal);
        assert_eq!(a.children()[0].path(), Some("a"));
        assert_eq!(b.children()[0].path(), Some("a"));
    }

    #[test]
    fn test_same_path_payloads_order_deterministically() {
        let a = MatchExpr::parse(&json!({"$or": [
            {"a": {"$regex": "x", "$options": "i"}},
            {"a": {"$type": "string"}},
            {"a": {"$regex": "y"}},
            {"a": {"$type": "int"}}
        ]}))
        .unwrap();
        let b = MatchExpr::parse(&json!({"$or": [
            {"a": {"$type": "int"}},
            {"a": {"$regex": "y"}},
            {"a": {"$type": "string"}},
            {"a": {"$regex": "x", "$options": "i"}}
        ]}))
        .unwrap();
        assert_eq!(a.shape_cmp(&b), Ordering::Equal);
        for (x, y) in a.children().iter().zip(b.children()) {
            assert_eq!(x.shape_cmp(y), Ordering::Equal);
        }
        match &a.children()[0] {
            MatchExpr::Regex { flags, .. } => assert!(flags.is_empty()),
            other => panic!("expected regex first, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_and_is_flattened() {
        let expr =
            MatchExpr::parse(&json!({"$and": [{"a": 1}, {"$and": [{"b": 2}, {"c": 3}]}]})).unwrap();
        assert_eq!(expr.kind(), MatchKind::And);
        assert_eq!(expr.children().len(), 3);
    }

    #[test]
    fn test_operator_object_order_is_irrelevant() {
        let a = MatchExpr::parse(&json!({"a": {"$gt": 1, "$lt": 5}})).unwrap();
        let b = MatchExpr::parse(&json!({"a": {"$lt": 9, "$gt": 0}})).unwrap();
        assert_eq!(a.shape_cmp(&b), Ordering::Equal);
        assert_eq!(a.children()[0].kind(), MatchKind::Lt);
    }

    #[test]
    fn test_ne_and_nin_become_not() {
        let ne = MatchExpr::parse(&json!({"a": {"$ne": 1}})).unwrap();
        assert_eq!(ne.kind(), MatchKind::Not);
        assert_eq!(ne.children()[0].kind(), MatchKind::Eq);

        let nin = MatchExpr::parse(&json!({"a": {"$nin": [1, 2]}})).unwrap();
        assert_eq!(nin.children()[0].kind(), MatchKind::In);
    }

    #[test]
    fn test_exists_false_is_negated() {
        let expr = MatchExpr::parse(&json!({"a": {"$exists": false}})).unwrap();
        assert_eq!(expr.kind(), MatchKind::Not);
        let expr = MatchExpr::parse(&json!({"a": {"$exists": 1}})).unwrap();
        assert_eq!(expr.kind(), MatchKind::Exists);
    }

    #[test]
    fn test_regex_rejects_bad_pattern_and_flags() {
        assert!(MatchExpr::parse(&json!({"a": {"$regex": "("}})).is_err());
        assert!(MatchExpr::parse(&json!({"a": {"$regex": "x", "$options": "q"}})).is_err());
    }

    #[test]
    fn test_regex_with_options() {
        let expr = MatchExpr::parse(&json!({"a": {"$regex": "^x", "$options": "i"}})).unwrap();
        match expr {
            MatchExpr::Regex { flags, pattern, .. } => {
                assert_eq!(flags, "i");
                assert_eq!(pattern, "^x");
            }
            other => panic!("expected regex, got {:?}", other),
        }
        assert!(MatchExpr::parse(&json!({"a": {"$options": "i"}})).is_err());
    }

    #[test]
    fn test_elem_match_forms() {
        let value = MatchExpr::parse(&json!({"a": {"$elemMatch": {"$gt": 1, "$lt": 3}}})).unwrap();
        assert_eq!(value.kind(), MatchKind::ElemMatchValue);
        assert_eq!(value.children().len(), 2);

        let object = MatchExpr::parse(&json!({"a": {"$elemMatch": {"b": 1, "c": 2}}})).unwrap();
        assert_eq!(object.kind(), MatchKind::ElemMatchObject);
        assert_eq!(object.children()[0].kind(), MatchKind::And);
    }

    #[test]
    fn test_literal_object_is_equality() {
        let expr = MatchExpr::parse(&json!({"a": {"b": 1}})).unwrap();
        assert_eq!(expr.kind(), MatchKind::Eq);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            MatchExpr::parse(&json!(12345)),
            Err(QueryError::FilterNotObject(_))
        ));
        assert!(matches!(
            MatchExpr::parse(&json!({"a": {"$no_such_op": 1}})),
            Err(QueryError::UnknownOperator(_))
        ));
        assert!(matches!(
            MatchExpr::parse(&json!({"$where": "1"})),
            Err(QueryError::UnknownOperator(_))
        ));
        assert!(MatchExpr::parse(&json!({"a": {"$in": 5}})).is_err());
        assert!(MatchExpr::parse(&json!({"$or": []})).is_err());
        assert!(MatchExpr::parse(&json!({"a": {"$size": -1}})).is_err());
        assert!(MatchExpr::parse(&json!({"a": {"$gt": 1, "b": 2}})).is_err());
        assert!(MatchExpr::parse(&json!({"a": {"$type": "blob"}})).is_err());
    }

    #[test]
    fn test_single_clause_or_collapses() {
        let expr = MatchExpr::parse(&json!({"$or": [{"a": 1}]})).unwrap();
        assert_eq!(expr.kind(), MatchKind::Eq);
    }

    #[test]
    fn test_node_count() {
        let expr = MatchExpr::parse(&json!({"a": 1, "b": {"$ne": 2}})).unwrap();
        assert_eq!(expr.node_count(), 4);
    }

    #[test]
    fn test_serde_roundtrip() {
        let expr = MatchExpr::parse(&json!({"a": {"$in": [1, 2]}, "b": {"$exists": true}})).unwrap();
        let json = serde_json::to_string(&expr).unwrap();
        let parsed: MatchExpr = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, expr);
    }
}
