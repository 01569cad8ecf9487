// SPDX-License-Identifier: PMPL-1.0-or-later
//! Collation specifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// A string comparison collation. Only the fields that were supplied are kept,
/// so two specs that spell the same options produce the same canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Collation {
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_level: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_first: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_ordering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backwards: Option<bool>,
}

impl Collation {
    /// Parse a collation document. `{locale: "simple"}` means binary
    /// comparison and yields `None`.
    pub fn parse(spec: &Value) -> Result<Option<Self>, QueryError> {
        let obj = spec
            .as_object()
            .ok_or_else(|| QueryError::InvalidCollation("collation must be an object".to_string()))?;
        if obj.is_empty() {
            return Err(QueryError::InvalidCollation("collation cannot be empty".to_string()));
        }
        let collation: Collation = serde_json::from_value(spec.clone())
            .map_err(|e| QueryError::InvalidCollation(e.to_string()))?;
        if let Some(strength) = collation.strength {
            if !(1..=5).contains(&strength) {
                return Err(QueryError::InvalidCollation(format!(
                    "strength must be between 1 and 5, got {}",
                    strength
                )));
            }
        }
        if collation.locale == "simple" {
            return Ok(None);
        }
        Ok(Some(collation))
    }

    /// Compact canonical string, stable for equal collations.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.locale.clone())
    }

    /// The collation as a JSON document with only the supplied fields.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
