// SPDX-License-Identifier: PMPL-1.0-or-later
//! Sort specifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// One component of a sort pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SortPart {
    Field { path: String, ascending: bool },
    /// `{$meta: "textScore"}` or `{$meta: "randVal"}`.
    Meta { name: String },
}

/// An ordered sort pattern. Empty means "no sort".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortPattern {
    parts: Vec<SortPart>,
}

impl SortPattern {
    /// Parse a sort document such as `{a: 1, b: -1}`.
    ///
    /// Directions must be `1` or `-1`; the only object form accepted is
    /// `{$meta: "textScore" | "randVal"}`.
    pub fn parse(spec: &Value) -> Result<Self, QueryError> {
        let obj = spec
            .as_object()
            .ok_or_else(|| QueryError::InvalidSort("sort must be an object".to_string()))?;

        let mut parts = Vec::with_capacity(obj.len());
        for (path, direction) in obj {
            if path.is_empty() {
                return Err(QueryError::InvalidSort("empty field name".to_string()));
            }
            let part = match direction {
                Value::Number(n) => match n.as_f64() {
                    Some(d) if d == 1.0 => SortPart::Field {
                        path: path.clone(),
                        ascending: true,
                    },
                    Some(d) if d == -1.0 => SortPart::Field {
                        path: path.clone(),
                        ascending: false,
                    },
                    _ => {
                        return Err(QueryError::InvalidSort(format!(
                            "direction for {} must be 1 or -1, got {}",
                            path, n
                        )))
                    }
                },
                Value::Object(meta) => match meta.get("$meta").and_then(Value::as_str) {
                    Some(name @ ("textScore" | "randVal")) if meta.len() == 1 => SortPart::Meta {
                        name: name.to_string(),
                    },
                    _ => {
                        return Err(QueryError::InvalidSort(format!(
                            "unsupported sort object for {}",
                            path
                        )))
                    }
                },
                other => {
                    return Err(QueryError::InvalidSort(format!(
                        "direction for {} must be 1 or -1, got {}",
                        path, other
                    )))
                }
            };
            parts.push(part);
        }
        Ok(Self { parts })
    }

    /// Sort components in priority order.
    pub fn parts(&self) -> &[SortPart] {
        &self.parts
    }

    /// Whether the query is unsorted.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_sort() {
        let sort = SortPattern::parse(&json!({})).unwrap();
        assert!(sort.is_empty());
    }

    #[test]
    fn test_field_order_preserved() {
        let sort = SortPattern::parse(&json!({"b": 1, "a": -1})).unwrap();
        assert_eq!(
            sort.parts(),
            &[
                SortPart::Field { path: "b".to_string(), ascending: true },
                SortPart::Field { path: "a".to_string(), ascending: false },
            ]
        );
    }

    #[test]
    fn test_meta_sort() {
        let sort = SortPattern::parse(&json!({"score": {"$meta": "textScore"}})).unwrap();
        assert_eq!(sort.parts(), &[SortPart::Meta { name: "textScore".to_string() }]);
    }

    #[test]
    fn test_invalid_directions() {
        assert!(SortPattern::parse(&json!({"a": 2})).is_err());
        assert!(SortPattern::parse(&json!({"a": "up"})).is_err());
        assert!(SortPattern::parse(&json!({"a": {"$meta": "nope"}})).is_err());
        assert!(SortPattern::parse(&json!([1])).is_err());
    }
}
