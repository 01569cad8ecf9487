// SPDX-License-Identifier: PMPL-1.0-or-later
//! Replan admission.
//!
//! When a cached plan turns out stale, many threads running the same shape
//! would otherwise all replan at once. [`ReplanGate`] admits one replan per
//! shape key at a time; the rest wait until the first one finishes and can
//! then use its fresh entry.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Per-key mutual exclusion for replanning.
#[derive(Debug, Default)]
pub struct ReplanGate {
    in_flight: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Holds a key in the gate; dropping it admits the next waiter.
#[derive(Debug)]
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct ReplanGuard<'a> {
    gate: &'a ReplanGate,
    key: String,
}

impl ReplanGate {
    /// An empty gate with no replans in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other thread is replanning `key`, then claim it.
    pub fn enter(&self, key: &str) -> ReplanGuard<'_> {
        let mut in_flight = self.lock();
        while in_flight.contains(key) {
            debug!(key, "Waiting for in-flight replan");
            in_flight = self
                .released
                .wait(in_flight)
                .unwrap_or_else(PoisonError::into_inner);
        }
        in_flight.insert(key.to_string());
        ReplanGuard {
            gate: self,
            key: key.to_string(),
        }
    }

    /// Claim `key` only if nobody else holds it.
    pub fn try_enter(&self, key: &str) -> Option<ReplanGuard<'_>> {
        let mut in_flight = self.lock();
        if !in_flight.insert(key.to_string()) {
            return None;
        }
        Some(ReplanGuard {
            gate: self,
            key: key.to_string(),
        })
    }

    /// Whether `key` is currently held.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReplanGuard<'_> {
    /// Plan cache key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ReplanGuard<'_> {
    fn drop(&mut self) {
        self.gate.lock().remove(&self.key);
        self.gate.released.notify_all();
    }
}
