//! Term-structure model seam.
//!
//! A [`TermStructureModel`] is the simulation context a product is valued
//! under. The sensitivity engine never owns a model: it remembers the
//! [`ModelId`] of the last model it was bound to and treats a different id as
//! the signal to drop its gradient and every cached sensitivity.
//!
//! Risk factors (forward rates at a simulation time, numeraire adjustment
//! factors) are identified by opaque [`FactorId`]s. A product's AAD gradient
//! is keyed by these ids.

use crate::regression::ConditionalExpectation;
use simm_core::types::{MarginError, RandomVariable, TimeDiscretization, TimeKey};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a model instance.
///
/// Every constructed model draws a fresh id, so two models compare equal only
/// if they are the same instance (or a clone sharing its id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

impl ModelId {
    /// Allocates a new, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model#{}", self.0)
    }
}

/// Opaque identity of an AAD node (risk factor) within a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactorId(pub u64);

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "factor#{}", self.0)
    }
}

/// A numeraire OIS adjustment factor observed by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct NumeraireAdjustment {
    /// AAD node of the factor.
    pub factor: FactorId,
    /// Path-wise value of the factor.
    pub value: RandomVariable,
}

/// Numeraire adjustment factors keyed by discount time, in increasing time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumeraireAdjustmentMap {
    entries: BTreeMap<TimeKey, NumeraireAdjustment>,
}

impl NumeraireAdjustmentMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts (or replaces) the adjustment at `time`.
    pub fn insert(&mut self, time: f64, adjustment: NumeraireAdjustment) {
        self.entries.insert(TimeKey::new(time), adjustment);
    }

    /// Merges `other` into this map; entries of `other` win on equal times.
    pub fn merge(&mut self, other: &NumeraireAdjustmentMap) {
        for (time, adjustment) in &other.entries {
            self.entries.insert(*time, adjustment.clone());
        }
    }

    /// Adjustment at exactly `time`.
    pub fn get(&self, time: f64) -> Option<&NumeraireAdjustment> {
        self.entries.get(&TimeKey::new(time))
    }

    /// Adjustments observed strictly after `time`, in increasing time order.
    pub fn after(&self, time: f64) -> impl Iterator<Item = (f64, &NumeraireAdjustment)> {
        self.entries
            .iter()
            .filter(move |(t, _)| t.value() > time)
            .map(|(t, adjustment)| (t.value(), adjustment))
    }

    /// All adjustments in increasing time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &NumeraireAdjustment)> {
        self.entries.iter().map(|(t, adjustment)| (t.value(), adjustment))
    }

    /// Number of adjustment times.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no adjustment has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Simulation context consumed by the sensitivity engine.
///
/// Implementations provide the path-wise numeraire, forward (LIBOR) rates on
/// the model's tenor, OIS numeraire adjustment factors, forward bonds, and a
/// constructor for conditional-expectation operators.
pub trait TermStructureModel: Send + Sync {
    /// Identity of this model instance.
    fn id(&self) -> ModelId;

    /// Simulation time grid.
    fn time_discretization(&self) -> &TimeDiscretization;

    /// Forward-rate tenor: rate `i` accrues over `[T_i, T_{i+1}]`.
    fn forward_rate_discretization(&self) -> &TimeDiscretization;

    /// Number of forward rates on the tenor.
    fn number_of_forward_rates(&self) -> usize {
        self.forward_rate_discretization().number_of_time_steps()
    }

    /// Number of simulated paths.
    fn number_of_paths(&self) -> usize;

    /// Numeraire `N(t)`.
    fn numeraire(&self, time: f64) -> Result<RandomVariable, MarginError>;

    /// Forward rate `rate_index` observed at simulation time index `time_index`.
    fn forward_rate(&self, time_index: usize, rate_index: usize)
        -> Result<RandomVariable, MarginError>;

    /// AAD node of the forward rate at (`time_index`, `rate_index`).
    fn forward_rate_factor(&self, time_index: usize, rate_index: usize) -> FactorId;

    /// Numeraire OIS adjustment factors used by the model at its discount times.
    fn numeraire_adjustments(&self) -> NumeraireAdjustmentMap;

    /// Numeraire OIS adjustment factor `A(t)` at an arbitrary time.
    fn ois_adjustment_factor(&self, time: f64) -> Result<RandomVariable, MarginError>;

    /// Forward bond on the LIBOR curve `P_L(maturity; time)`.
    fn forward_bond_libor(&self, maturity: f64, time: f64) -> Result<RandomVariable, MarginError>;

    /// Forward bond on the OIS curve `P_OIS(maturity; time)`.
    fn forward_bond_ois(&self, maturity: f64, time: f64) -> Result<RandomVariable, MarginError>;

    /// Regression operator estimating `E[X | F_time]`.
    fn conditional_expectation_operator(
        &self,
        time: f64,
    ) -> Result<Box<dyn ConditionalExpectation>, MarginError>;
}
