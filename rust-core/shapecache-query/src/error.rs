// SPDX-License-Identifier: PMPL-1.0-or-later
//! Canonicalization error types.

use thiserror::Error;

/// Errors raised while turning a wire-level query into a [`CanonicalQuery`](crate::CanonicalQuery).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("filter must be an object, got {0}")]
    FilterNotObject(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("bad operand for {operator}: {reason}")]
    BadOperand {
        /// The operator whose argument was rejected (e.g. `$in`).
        operator: String,
        /// Why the argument was rejected.
        reason: String,
    },

    #[error("invalid sort: {0}")]
    InvalidSort(String),

    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    #[error("invalid collation: {0}")]
    InvalidCollation(String),
}

impl QueryError {
    pub(crate) fn bad_operand(operator: &str, reason: impl Into<String>) -> Self {
        QueryError::BadOperand {
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }
}
