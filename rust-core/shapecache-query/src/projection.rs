// SPDX-License-Identifier: PMPL-1.0-or-later
//! Projection specifications.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;
use crate::value::is_truthy;

/// What a projection does with one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionKind {
    Include,
    Exclude,
    Meta,
    Slice,
    ElemMatch,
}

impl ProjectionKind {
    /// Character used for this kind in shape keys.
    pub fn code(self) -> char {
        match self {
            ProjectionKind::Include => 'i',
            ProjectionKind::Exclude => 'e',
            ProjectionKind::Meta => 'm',
            ProjectionKind::Slice => 's',
            ProjectionKind::ElemMatch => 'l',
        }
    }
}

/// A parsed projection, keyed by field name (sorted).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    fields: BTreeMap<String, ProjectionKind>,
}

impl Projection {
    /// Parse a projection document such as `{a: 1, _id: 0}`.
    ///
    /// Inclusion and exclusion cannot be mixed, except for `_id`.
    pub fn parse(spec: &Value) -> Result<Self, QueryError> {
        let obj = spec
            .as_object()
            .ok_or_else(|| QueryError::InvalidProjection("projection must be an object".to_string()))?;

        let mut fields = BTreeMap::new();
        for (field, value) in obj {
            let kind = match value {
                Value::Object(op) => {
                    let (name, _) = op.iter().next().ok_or_else(|| {
                        QueryError::InvalidProjection(format!("empty object for {}", field))
                    })?;
                    match name.as_str() {
                        "$meta" => ProjectionKind::Meta,
                        "$slice" => ProjectionKind::Slice,
                        "$elemMatch" => ProjectionKind::ElemMatch,
                        other => {
                            return Err(QueryError::InvalidProjection(format!(
                                "unsupported operator {} for {}",
                                other, field
                            )))
                        }
                    }
                }
                Value::Array(_) | Value::String(_) => {
                    return Err(QueryError::InvalidProjection(format!(
                        "unsupported value for {}",
                        field
                    )))
                }
                flag if is_truthy(flag) => ProjectionKind::Include,
                _ => ProjectionKind::Exclude,
            };
            fields.insert(field.clone(), kind);
        }

        let includes = fields
            .iter()
            .any(|(f, k)| *k == ProjectionKind::Include && f != "_id");
        let excludes = fields
            .iter()
            .any(|(f, k)| *k == ProjectionKind::Exclude && f != "_id");
        if includes && excludes {
            return Err(QueryError::InvalidProjection(
                "cannot mix inclusion and exclusion".to_string(),
            ));
        }

        Ok(Self { fields })
    }

    /// Projected fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, ProjectionKind)> {
        self.fields.iter().map(|(f, k)| (f.as_str(), *k))
    }

    /// Whether nothing is projected.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
