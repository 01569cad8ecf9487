// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Shape key derivation.
//!
//! A canonical query is encoded into an unambiguous string with literal
//! values erased. The encoding has four sections:
//!
//! - match tree: `<code><path>[/payload][<bits>][children]`
//! - sort: `~` followed by `a<field>`, `d<field>`, `t` or `r`, comma separated
//! - projection: `|` followed by `<kind><field>`, comma separated
//! - collation: `#` followed by the collation's canonical form
//!
//! User-supplied strings are escaped so that section and field boundaries can
//! never be forged: sort `{aab: 1}` encodes as `~aaab` while `{a: 1, b: 1}`
//! encodes as `~aa,ab`.
//!
//! Two SHA-256 derived hashes identify a key: the query hash covers the shape
//! alone, the plan cache key also covers the indexability bits.

use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shapecache_query::{CanonicalQuery, Collation, MatchExpr, MatchKind, SortPart};

use crate::indexability::IndexabilityState;

const RESERVED: &[char] = &['<', '>', '[', ']', ',', '~', '|', '#', '/', '\\'];

/// The identity of a cached shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeKey {
    encoded: String,
    query_hash: String,
    plan_cache_key: String,
}

impl ShapeKey {
    /// Full unambiguous encoding, including indexability bits.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Hash of the shape without index information (8 hex digits).
    pub fn query_hash(&self) -> &str {
        &self.query_hash
    }

    /// Hash of the full encoding (8 hex digits); the map key of the cache.
    pub fn plan_cache_key(&self) -> &str {
        &self.plan_cache_key
    }
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.query_hash, self.plan_cache_key)
    }
}

/// Derive the shape key of `query` under the given index view.
pub fn compute_key(query: &CanonicalQuery, indexability: &IndexabilityState) -> ShapeKey {
    let shape = encode(query, None);
    let encoded = encode(query, Some(indexability));
    ShapeKey {
        query_hash: hash32(&shape),
        plan_cache_key: hash32(&encoded),
        encoded,
    }
}

fn encode(query: &CanonicalQuery, indexability: Option<&IndexabilityState>) -> String {
    let mut out = String::with_capacity(64);
    let collation = query.collation();
    encode_match(query.root(), false, indexability, collation, &mut out);
    encode_sort(query, &mut out);
    encode_projection(query, &mut out);
    encode_collation(collation, &mut out);
    out
}

fn encode_match(
    node: &MatchExpr,
    negated: bool,
    indexability: Option<&IndexabilityState>,
    collation: Option<&Collation>,
    out: &mut String,
) {
    out.push_str(type_code(node.kind()));
    if let Some(path) = node.path() {
        escape_into(path, out);
    }

    match node {
        MatchExpr::Regex { flags, .. } if !flags.is_empty() => {
            out.push('/');
            escape_into(flags, out);
        }
        MatchExpr::Type { kinds, .. } => {
            out.push('/');
            out.extend(kinds.iter().map(|k| k.code()));
        }
        _ => {}
    }

    if let Some(bits) = indexability.and_then(|state| state.bits_for(node, negated, collation)) {
        let _ = write!(out, "{}", bits);
    }

    let children = node.children();
    if children.is_empty() {
        return;
    }
    let negated = negated ^ matches!(node.kind(), MatchKind::Not | MatchKind::Nor);
    let mut encoded: Vec<String> = children
        .iter()
        .map(|child| {
            let mut buf = String::new();
            encode_match(child, negated, indexability, collation, &mut buf);
            buf
        })
        .collect();
    // Bits depend on literals, so commutative children are ordered by their
    // final encoding rather than by the value-free canonical order.
    if matches!(
        node.kind(),
        MatchKind::And | MatchKind::Or | MatchKind::Nor | MatchKind::ElemMatchValue
    ) {
        encoded.sort_unstable();
    }
    out.push('[');
    out.push_str(&encoded.join(","));
    out.push(']');
}

fn encode_sort(query: &CanonicalQuery, out: &mut String) {
    let sort = query.sort();
    if sort.is_empty() {
        return;
    }
    out.push('~');
    for (i, part) in sort.parts().iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match part {
            SortPart::Field { path, ascending } => {
                out.push(if *ascending { 'a' } else { 'd' });
                escape_into(path, out);
            }
            SortPart::Meta { name } => out.push(if name == "randVal" { 'r' } else { 't' }),
        }
    }
}

fn encode_projection(query: &CanonicalQuery, out: &mut String) {
    let projection = query.projection();
    if projection.is_empty() {
        return;
    }
    out.push('|');
    for (i, (field, kind)) in projection.fields().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push(kind.code());
        escape_into(field, out);
    }
}

fn encode_collation(collation: Option<&Collation>, out: &mut String) {
    if let Some(collation) = collation {
        out.push('#');
        escape_into(&collation.canonical(), out);
    }
}

fn type_code(kind: MatchKind) -> &'static str {
    match kind {
        MatchKind::Eq => "eq",
        MatchKind::Lt => "lt",
        MatchKind::Lte => "le",
        MatchKind::Gt => "gt",
        MatchKind::Gte => "ge",
        MatchKind::In => "in",
        MatchKind::Exists => "ex",
        MatchKind::Regex => "re",
        MatchKind::Type => "ty",
        MatchKind::Size => "sz",
        MatchKind::ElemMatchObject => "em",
        MatchKind::ElemMatchValue => "ev",
        MatchKind::And => "an",
        MatchKind::Or => "or",
        MatchKind::Nor => "nr",
        MatchKind::Not => "nt",
    }
}

fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// First four bytes of the SHA-256 digest, as 8 uppercase hex digits.
fn hash32(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    digest[..4].iter().map(|b| format!("{:02X}", b)).collect()
}
