// SPDX-License-Identifier: PMPL-1.0-or-later
//! Shape descriptors carried by admin commands.
//!
//! A descriptor names a shape by example:
//! `{query: {a: 1}, sort: {b: -1}, projection: {...}, collation: {...}}`.
//! Only `query` is required; the other fields default to empty.

use serde_json::{Map, Value};
use shapecache_query::{canonicalize, CanonicalQuery, QueryRequest};

use crate::error::AdminError;

/// Canonicalize the shape named by `cmd`. `query` is required.
pub fn parse_shape(cmd: &Value) -> Result<CanonicalQuery, AdminError> {
    let obj = as_command(cmd)?;
    let filter = match obj.get("query") {
        Some(Value::Object(_)) => obj["query"].clone(),
        Some(_) => return Err(invalid("required field query must be an object")),
        None => return Err(invalid("required field query missing")),
    };

    let mut request = QueryRequest::new(filter);
    if let Some(sort) = optional_object(obj, "sort")? {
        request = request.with_sort(sort);
    }
    if let Some(projection) = optional_object(obj, "projection")? {
        request = request.with_projection(projection);
    }
    if let Some(collation) = optional_object(obj, "collation")? {
        if collation.as_object().is_some_and(Map::is_empty) {
            return Err(invalid("collation cannot be an empty object"));
        }
        request = request.with_collation(collation);
    }

    Ok(canonicalize(&request)?)
}

/// Shape for `clear`: `None` means "clear everything".
///
/// Supplying sort, projection or collation without a query is an error.
pub fn parse_clear_target(cmd: &Value) -> Result<Option<CanonicalQuery>, AdminError> {
    let obj = as_command(cmd)?;
    if obj.contains_key("query") {
        return parse_shape(cmd).map(Some);
    }
    for field in ["sort", "projection", "collation"] {
        if obj.contains_key(field) {
            return Err(invalid(&format!("{} specified without a query", field)));
        }
    }
    Ok(None)
}

fn as_command(cmd: &Value) -> Result<&Map<String, Value>, AdminError> {
    cmd.as_object()
        .ok_or_else(|| invalid("command must be an object"))
}

fn optional_object(obj: &Map<String, Value>, field: &str) -> Result<Option<Value>, AdminError> {
    match obj.get(field) {
        None => Ok(None),
        Some(value @ Value::Object(_)) => Ok(Some(value.clone())),
        Some(_) => Err(invalid(&format!("optional field {} must be an object", field))),
    }
}

fn invalid(msg: &str) -> AdminError {
    AdminError::InvalidShapeDescriptor(msg.to_string())
}
