// SPDX-License-Identifier: PMPL-1.0-or-later
//! Administrative command errors and their wire form.

use serde::{Deserialize, Serialize};
use shapecache_core::PlanCacheError;
use shapecache_query::QueryError;
use thiserror::Error;

/// Errors returned by plan cache commands.
#[derive(Error, Debug)]
pub enum AdminError {
    /// The command's shape fields are malformed. Nothing was changed.
    #[error("invalid shape descriptor: {0}")]
    InvalidShapeDescriptor(String),

    /// The collection has no plan cache.
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("plan cache error: {0}")]
    PlanCache(#[from] PlanCacheError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<QueryError> for AdminError {
    fn from(err: QueryError) -> Self {
        AdminError::InvalidShapeDescriptor(err.to_string())
    }
}

impl AdminError {
    /// Symbolic error code for the response body.
    pub fn code_name(&self) -> &'static str {
        match self {
            AdminError::InvalidShapeDescriptor(_) => "BadValue",
            AdminError::NamespaceNotFound(_) => "NamespaceNotFound",
            AdminError::UnknownCommand(_) => "CommandNotFound",
            AdminError::PlanCache(_) | AdminError::Serialization(_) => "InternalError",
        }
    }

    /// Render as a failed command reply.
    pub fn into_response(self) -> ErrorResponse {
        ErrorResponse {
            ok: 0.0,
            code_name: self.code_name().to_string(),
            errmsg: self.to_string(),
        }
    }
}

/// Error response body: `{ok: 0, codeName, errmsg}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub ok: f64,
    pub code_name: String,
    pub errmsg: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_becomes_bad_value() {
        let err: AdminError = QueryError::UnknownOperator("$no_such_op".to_string()).into();
        assert_eq!(err.code_name(), "BadValue");
        assert!(err.to_string().contains("$no_such_op"));
    }

    #[test]
    fn test_error_response_shape() {
        let body = AdminError::NamespaceNotFound("test.none".to_string()).into_response();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["ok"], 0.0);
        assert_eq!(json["codeName"], "NamespaceNotFound");
        assert_eq!(json["errmsg"], "namespace not found: test.none");
    }
}
