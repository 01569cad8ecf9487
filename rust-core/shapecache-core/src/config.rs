// SPDX-License-Identifier: PMPL-1.0-or-later
//! Plan cache configuration.
//!
//! Defaults:
//! - max_entries: 5000 shapes per collection
//! - works_growth_coefficient: 2.0
//! - eviction_ratio: 10.0
//! - disable_inactive_entries: false

use serde::{Deserialize, Serialize};

use crate::error::PlanCacheError;

/// Default bound on the number of cached shapes per collection.
pub const DEFAULT_MAX_ENTRIES: usize = 5000;

/// Default multiplier applied to an inactive entry's works when a candidate
/// fails to beat it.
pub const DEFAULT_WORKS_GROWTH_COEFFICIENT: f64 = 2.0;

/// Default factor by which a replay may exceed the cached works before the
/// entry is considered stale.
pub const DEFAULT_EVICTION_RATIO: f64 = 10.0;

/// Configuration for a [`PlanCache`](crate::PlanCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries before the least-recently-written one is evicted.
    pub max_entries: usize,
    /// Growth factor for an inactive entry's works threshold (> 1.0).
    pub works_growth_coefficient: f64,
    /// Replays costing more than `works * eviction_ratio` trigger a replan (>= 1.0).
    pub eviction_ratio: f64,
    /// Write every new entry as active, skipping the promotion step.
    pub disable_inactive_entries: bool,
}

impl CacheConfig {
    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), PlanCacheError> {
        if self.max_entries == 0 {
            return Err(PlanCacheError::InvalidConfig(
                "max_entries must be at least 1".to_string(),
            ));
        }
        if !self.works_growth_coefficient.is_finite() || self.works_growth_coefficient <= 1.0 {
            return Err(PlanCacheError::InvalidConfig(format!(
                "works_growth_coefficient must be finite and greater than 1.0, got {}",
                self.works_growth_coefficient
            )));
        }
        if !self.eviction_ratio.is_finite() || self.eviction_ratio < 1.0 {
            return Err(PlanCacheError::InvalidConfig(format!(
                "eviction_ratio must be finite and at least 1.0, got {}",
                self.eviction_ratio
            )));
        }
        Ok(())
    }

    /// Next works threshold for an inactive entry that was not beaten.
    pub fn grown_works(&self, works: u64) -> u64 {
        let scaled = (works as f64 * self.works_growth_coefficient).floor() as u64;
        scaled.max(works.saturating_add(1))
    }

    /// Whether a replay costing `observed` works is too slow for `works`.
    pub fn exceeds_eviction_ratio(&self, observed: u64, works: u64) -> bool {
        observed as f64 > works as f64 * self.eviction_ratio
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            works_growth_coefficient: DEFAULT_WORKS_GROWTH_COEFFICIENT,
            eviction_ratio: DEFAULT_EVICTION_RATIO,
            disable_inactive_entries: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.max_entries, 5000);
        assert!((config.works_growth_coefficient - 2.0).abs() < f64::EPSILON);
        assert!((config.eviction_ratio - 10.0).abs() < f64::EPSILON);
        assert!(!config.disable_inactive_entries);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = CacheConfig { max_entries: 0, ..CacheConfig::default() };
        assert!(zero.validate().is_err());

        let flat = CacheConfig { works_growth_coefficient: 1.0, ..CacheConfig::default() };
        assert!(flat.validate().is_err());

        let nan = CacheConfig { eviction_ratio: f64::NAN, ..CacheConfig::default() };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_grown_works() {
        let config = CacheConfig::default();
        assert_eq!(config.grown_works(0), 1);
        assert_eq!(config.grown_works(1), 2);
        assert_eq!(config.grown_works(10), 20);

        let slow = CacheConfig { works_growth_coefficient: 1.1, ..CacheConfig::default() };
        // 5 * 1.1 floors to 5, so the +1 floor applies.
        assert_eq!(slow.grown_works(5), 6);
    }

    #[test]
    fn test_eviction_ratio() {
        let config = CacheConfig::default();
        assert!(!config.exceeds_eviction_ratio(100, 10));
        assert!(config.exceeds_eviction_ratio(101, 10));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"max_entries": 10}"#).unwrap();
        assert_eq!(config.max_entries, 10);
        assert!((config.eviction_ratio - 10.0).abs() < f64::EPSILON);
    }
}
