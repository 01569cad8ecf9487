// SPDX-License-Identifier: PMPL-1.0-or-later
//! Conservative implication between match expressions.
//!
//! [`is_subset_of`] answers "does every document matching `query` also match
//! `filter`?". It is used to decide whether a partial index (whose filter is
//! `filter`) can serve a query. Returning `false` is always safe.

use std::cmp::Ordering;

use serde_json::Value;

use crate::expr::{CompareOp, MatchExpr};
use crate::value::compare_values;

/// Whether `query` implies `filter`.
pub fn is_subset_of(query: &MatchExpr, filter: &MatchExpr) -> bool {
    if query == filter {
        return true;
    }

    // Every conjunct of the filter must be implied.
    if let MatchExpr::And { children } = filter {
        return children.iter().all(|f| is_subset_of(query, f));
    }

    match query {
        // One conjunct of the query suffices.
        MatchExpr::And { children } => children.iter().any(|q| is_subset_of(q, filter)),
        // Every branch of the query must land inside the filter.
        MatchExpr::Or { children } if !children.is_empty() => {
            children.iter().all(|q| is_subset_of(q, filter))
        }
        _ => match filter {
            MatchExpr::Or { children } => children.iter().any(|f| is_subset_of(query, f)),
            _ => leaf_implies(query, filter),
        },
    }
}

fn leaf_implies(query: &MatchExpr, filter: &MatchExpr) -> bool {
    if query.path().is_none() || query.path() != filter.path() {
        return false;
    }

    match (query, filter) {
        (
            MatchExpr::Compare { cmp: q_op, value: q_val, .. },
            MatchExpr::Compare { cmp: f_op, value: f_val, .. },
        ) => range_implies(*q_op, q_val, *f_op, f_val),
        (MatchExpr::In { values, .. }, MatchExpr::Compare { cmp, value, .. }) => {
            !values.is_empty() && values.iter().all(|v| range_implies(CompareOp::Eq, v, *cmp, value))
        }
        (MatchExpr::Compare { cmp: CompareOp::Eq, value, .. }, MatchExpr::In { values, .. }) => {
            values.contains(value)
        }
        (MatchExpr::In { values: q_vals, .. }, MatchExpr::In { values: f_vals, .. }) => {
            q_vals.iter().all(|v| f_vals.contains(v))
        }
        (_, MatchExpr::Exists { .. }) => implies_exists(query),
        _ => false,
    }
}

/// Whether `path <q_op> q_val` implies `path <f_op> f_val`.
fn range_implies(q_op: CompareOp, q_val: &Value, f_op: CompareOp, f_val: &Value) -> bool {
    let Some(ord) = compare_values(q_val, f_val) else {
        return false;
    };
    use CompareOp::*;
    match (q_op, f_op) {
        (Eq, Eq) => ord == Ordering::Equal,
        (Eq, Lt) => ord == Ordering::Less,
        (Eq, Lte) => ord != Ordering::Greater,
        (Eq, Gt) => ord == Ordering::Greater,
        (Eq, Gte) => ord != Ordering::Less,
        (Lt, Lt) | (Lte, Lte) | (Lt, Lte) => ord != Ordering::Greater,
        (Lte, Lt) => ord == Ordering::Less,
        (Gt, Gt) | (Gte, Gte) | (Gt, Gte) => ord != Ordering::Less,
        (Gte, Gt) => ord == Ordering::Greater,
        _ => false,
    }
}

/// Whether matching `query` requires the field to be present.
fn implies_exists(query: &MatchExpr) -> bool {
    match query {
        MatchExpr::Compare { value, .. } => !value.is_null(),
        MatchExpr::In { values, .. } => !values.is_empty() && values.iter().all(|v| !v.is_null()),
        MatchExpr::Exists { .. }
        | MatchExpr::Regex { .. }
        | MatchExpr::Type { .. }
        | MatchExpr::Size { .. }
        | MatchExpr::ElemMatchObject { .. }
        | MatchExpr::ElemMatchValue { .. } => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> MatchExpr {
        MatchExpr::parse(&v).unwrap()
    }

    #[test]
    fn test_identical_is_subset() {
        assert!(is_subset_of(&parse(json!({"a": 1})), &parse(json!({"a": 1}))));
    }

    #[test]
    fn test_range_implication() {
        let filter = parse(json!({"a": {"$gt": 0}}));
        assert!(is_subset_of(&parse(json!({"a": 5})), &filter));
        assert!(is_subset_of(&parse(json!({"a": {"$gt": 10}})), &filter));
        assert!(is_subset_of(&parse(json!({"a": {"$gte": 1}})), &filter));
        assert!(!is_subset_of(&parse(json!({"a": {"$gte": 0}})), &filter));
        assert!(!is_subset_of(&parse(json!({"a": -1})), &filter));
        assert!(!is_subset_of(&parse(json!({"a": {"$lt": 10}})), &filter));
    }

    #[test]
    fn test_different_path_not_subset() {
        assert!(!is_subset_of(
            &parse(json!({"b": 5})),
            &parse(json!({"a": {"$gt": 0}}))
        ));
    }

    #[test]
    fn test_conjunctions() {
        let filter = parse(json!({"a": {"$gt": 0}, "b": {"$exists": true}}));
        assert!(is_subset_of(&parse(json!({"a": 1, "b": "x", "c": 3})), &filter));
        assert!(!is_subset_of(&parse(json!({"a": 1})), &filter));
    }

    #[test]
    fn test_disjunctions() {
        let filter = parse(json!({"a": {"$lte": 10}}));
        assert!(is_subset_of(&parse(json!({"$or": [{"a": 1}, {"a": 2}]})), &filter));
        assert!(!is_subset_of(&parse(json!({"$or": [{"a": 1}, {"a": 20}]})), &filter));
    }

    #[test]
    fn test_exists_implication() {
        let filter = parse(json!({"a": {"$exists": true}}));
        assert!(is_subset_of(&parse(json!({"a": 1})), &filter));
        assert!(!is_subset_of(&parse(json!({"a": null})), &filter));
        assert!(is_subset_of(&parse(json!({"a": {"$in": [1, 2]}})), &filter));
        assert!(!is_subset_of(&parse(json!({"a": {"$in": [1, null]}})), &filter));
    }

    #[test]
    fn test_in_against_range() {
        let filter = parse(json!({"a": {"$lt": 5}}));
        assert!(is_subset_of(&parse(json!({"a": {"$in": [1, 2, 3]}})), &filter));
        assert!(!is_subset_of(&parse(json!({"a": {"$in": [1, 7]}})), &filter));
    }

    #[test]
    fn test_mixed_types_not_subset() {
        assert!(!is_subset_of(
            &parse(json!({"a": "z"})),
            &parse(json!({"a": {"$gt": 0}}))
        ));
    }
}
