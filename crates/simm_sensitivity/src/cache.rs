//! Two-tier sensitivity cache.
//!
//! # Tiers
//!
//! - **Bucketed (per-time)**: 12-bucket vectors keyed by `(risk class, curve)`
//!   for the current evaluation time only. Cleared whenever a different
//!   evaluation time is seen.
//! - **Exact (persistent)**: pivot sensitivities keyed by
//!   `(time, risk class, curve, kind)`. Survives evaluation-time changes and
//!   is cleared only on model or scheme changes.
//!
//! Lookups record hits and misses in [`CacheStats`].

use crate::scheme::DeltaKind;
use simm_core::simm::{BucketSensitivities, CurveIndex, RiskClass};
use simm_core::types::{RandomVariable, TimeKey};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of cache invalidations
    pub invalidations: u64,
    /// Number of gradient recomputations behind the cached values
    pub gradient_recomputations: u64,
}

impl CacheStats {
    /// Create new cache statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate the cache hit rate.
    ///
    /// Returns 0.0 if no lookups have occurred.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Sum of two statistics.
    pub fn combined(&self, other: &CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            invalidations: self.invalidations + other.invalidations,
            gradient_recomputations: self.gradient_recomputations + other.gradient_recomputations,
        }
    }

    fn record_hit(&mut self) {
        self.hits += 1;
    }

    fn record_miss(&mut self) {
        self.misses += 1;
    }

    fn record_invalidation(&mut self) {
        self.invalidations += 1;
    }
}

/// Key of the persistent exact-delta table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExactDeltaKey {
    /// Evaluation time the sensitivities were projected to.
    pub time: TimeKey,
    /// Risk class.
    pub risk_class: RiskClass,
    /// Curve the sensitivities refer to.
    pub curve: CurveIndex,
    /// Model or market-rate coordinates.
    pub kind: DeltaKind,
}

impl ExactDeltaKey {
    /// Creates a key.
    pub fn new(time: f64, risk_class: RiskClass, curve: CurveIndex, kind: DeltaKind) -> Self {
        Self {
            time: TimeKey::new(time),
            risk_class,
            curve,
            kind,
        }
    }
}

/// Per-product sensitivity cache.
#[derive(Debug, Default)]
pub struct SensitivityCache {
    evaluation_time: Option<TimeKey>,
    bucketed: HashMap<(RiskClass, CurveIndex), BucketSensitivities>,
    exact: HashMap<ExactDeltaKey, Vec<RandomVariable>>,
    bucketed_stats: CacheStats,
    exact_stats: CacheStats,
}

impl SensitivityCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluation time the bucketed tier currently belongs to.
    pub fn evaluation_time(&self) -> Option<f64> {
        self.evaluation_time.map(|t| t.value())
    }

    /// Moves the bucketed tier to `time`, clearing it if `time` differs from
    /// the last evaluation time. Returns `true` if it was cleared.
    pub fn on_evaluation_time_changed(&mut self, time: f64) -> bool {
        let key = TimeKey::new(time);
        if self.evaluation_time == Some(key) {
            return false;
        }
        let previous = self.evaluation_time.replace(key);
        if !self.bucketed.is_empty() {
            trace!(
                from = ?previous.map(|t| t.value()),
                to = time,
                entries = self.bucketed.len(),
                "evaluation time changed, dropping bucketed sensitivities"
            );
            self.bucketed.clear();
            self.bucketed_stats.record_invalidation();
        }
        true
    }

    /// Clears both tiers.
    pub fn on_model_changed(&mut self) {
        debug!(
            bucketed = self.bucketed.len(),
            exact = self.exact.len(),
            "invalidating sensitivity cache"
        );
        self.evaluation_time = None;
        if !self.bucketed.is_empty() {
            self.bucketed.clear();
            self.bucketed_stats.record_invalidation();
        }
        self.clear_exact();
    }

    /// Clears the persistent tier only.
    pub fn clear_exact(&mut self) {
        if !self.exact.is_empty() {
            self.exact.clear();
            self.exact_stats.record_invalidation();
        }
    }

    /// Bucketed sensitivities for the current evaluation time.
    pub fn bucketed(&mut self, risk_class: RiskClass, curve: &CurveIndex) -> Option<&BucketSensitivities> {
        let entry = self.bucketed.get(&(risk_class, curve.clone()));
        match entry {
            Some(_) => self.bucketed_stats.record_hit(),
            None => self.bucketed_stats.record_miss(),
        }
        entry
    }

    /// Stores bucketed sensitivities for the current evaluation time.
    pub fn insert_bucketed(
        &mut self,
        risk_class: RiskClass,
        curve: CurveIndex,
        sensitivities: BucketSensitivities,
    ) {
        self.bucketed.insert((risk_class, curve), sensitivities);
    }

    /// Returns true if the persistent tier holds `key`. Does not touch the
    /// statistics.
    pub fn contains_exact(&self, key: &ExactDeltaKey) -> bool {
        self.exact.contains_key(key)
    }

    /// Exact sensitivities for `key`.
    pub fn exact(&mut self, key: &ExactDeltaKey) -> Option<&Vec<RandomVariable>> {
        let entry = self.exact.get(key);
        match entry {
            Some(_) => self.exact_stats.record_hit(),
            None => self.exact_stats.record_miss(),
        }
        entry
    }

    /// Exact sensitivities for `key` without touching the statistics.
    pub fn peek_exact(&self, key: &ExactDeltaKey) -> Option<&Vec<RandomVariable>> {
        self.exact.get(key)
    }

    /// Stores exact sensitivities for `key`.
    pub fn insert_exact(&mut self, key: ExactDeltaKey, sensitivities: Vec<RandomVariable>) {
        self.exact.insert(key, sensitivities);
    }

    /// Number of bucketed entries for the current evaluation time.
    pub fn bucketed_len(&self) -> usize {
        self.bucketed.len()
    }

    /// Number of exact entries across all times.
    pub fn exact_len(&self) -> usize {
        self.exact.len()
    }

    /// Statistics of the bucketed tier.
    pub fn bucketed_stats(&self) -> CacheStats {
        self.bucketed_stats
    }

    /// Statistics of the persistent tier.
    pub fn exact_stats(&self) -> CacheStats {
        self.exact_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(time: f64) -> ExactDeltaKey {
        ExactDeltaKey::new(time, RiskClass::InterestRate, CurveIndex::Ois, DeltaKind::Model)
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let mut stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_time_change_clears_bucketed_only() {
        let mut cache = SensitivityCache::new();
        assert!(cache.on_evaluation_time_changed(1.0));
        cache.insert_bucketed(RiskClass::InterestRate, CurveIndex::Ois, BucketSensitivities::zero());
        cache.insert_exact(key(1.0), vec![RandomVariable::one()]);

        assert!(!cache.on_evaluation_time_changed(1.0));
        assert_eq!(cache.bucketed_len(), 1);

        assert!(cache.on_evaluation_time_changed(2.0));
        assert_eq!(cache.bucketed_len(), 0);
        assert_eq!(cache.exact_len(), 1);
        assert_eq!(cache.bucketed_stats().invalidations, 1);
    }

    #[test]
    fn test_model_change_clears_everything() {
        let mut cache = SensitivityCache::new();
        cache.on_evaluation_time_changed(1.0);
        cache.insert_bucketed(RiskClass::InterestRate, CurveIndex::Ois, BucketSensitivities::zero());
        cache.insert_exact(key(1.0), vec![RandomVariable::one()]);

        cache.on_model_changed();

        assert_eq!(cache.bucketed_len(), 0);
        assert_eq!(cache.exact_len(), 0);
        assert_eq!(cache.evaluation_time(), None);
    }

    #[test]
    fn test_lookups_record_hits_and_misses() {
        let mut cache = SensitivityCache::new();
        assert!(cache.exact(&key(0.5)).is_none());
        cache.insert_exact(key(0.5), vec![RandomVariable::one()]);
        assert!(cache.exact(&key(0.5)).is_some());
        assert!(cache.bucketed(RiskClass::InterestRate, &CurveIndex::libor_6m()).is_none());

        assert_eq!(cache.exact_stats().hits, 1);
        assert_eq!(cache.exact_stats().misses, 1);
        assert_eq!(cache.bucketed_stats().misses, 1);
    }

    #[test]
    fn test_negative_zero_time_shares_key() {
        let mut cache = SensitivityCache::new();
        cache.insert_exact(key(0.0), vec![RandomVariable::one()]);
        assert!(cache.contains_exact(&key(-0.0)));
    }
}
