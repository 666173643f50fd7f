//! Deterministic flat-curve model.
//!
//! - LIBOR curve: continuously compounded flat rate `r`
//! - OIS curve: flat rate `r - s` with basis spread `s`, expressed through
//!   the adjustment factors `A(T) = exp(-s T)`
//! - Numeraire: `N(t) = exp(r t) A(t)`
//!
//! All quantities are deterministic, so every conditional expectation is the
//! identity. The model is mainly used to pin down closed-form results.

use crate::model::{FactorId, ModelId, NumeraireAdjustment, NumeraireAdjustmentMap, TermStructureModel};
use crate::regression::{ConditionalExpectation, RegressionEstimator};
use simm_core::types::{MarginError, RandomVariable, TimeDiscretization};

/// First factor id used for numeraire adjustments; forward-rate ids stay below it.
const ADJUSTMENT_FACTOR_OFFSET: u64 = 1 << 32;

/// Deterministic single-rate term-structure model.
#[derive(Debug, Clone)]
pub struct FlatCurveModel {
    id: ModelId,
    rate: f64,
    basis_spread: f64,
    tenor: TimeDiscretization,
}

impl FlatCurveModel {
    /// Creates a model with flat rate `rate` and `number_of_rates` forward
    /// periods of length `period_length`.
    pub fn new(rate: f64, period_length: f64, number_of_rates: usize) -> Result<Self, MarginError> {
        if number_of_rates == 0 {
            return Err(MarginError::InvalidInput(
                "at least one forward rate is required".to_string(),
            ));
        }
        Ok(Self {
            id: ModelId::next(),
            rate,
            basis_spread: 0.0,
            tenor: TimeDiscretization::uniform(0.0, number_of_rates, period_length)?,
        })
    }

    /// Sets the LIBOR-OIS basis spread. The returned model has a new identity.
    pub fn with_basis_spread(mut self, basis_spread: f64) -> Self {
        self.basis_spread = basis_spread;
        self.id = ModelId::next();
        self
    }

    /// Flat continuously compounded LIBOR rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    fn adjustment(&self, time: f64) -> f64 {
        (-self.basis_spread * time).exp()
    }

    fn period_rate(&self, period_length: f64) -> f64 {
        ((self.rate * period_length).exp() - 1.0) / period_length
    }
}

impl TermStructureModel for FlatCurveModel {
    fn id(&self) -> ModelId {
        self.id
    }

    fn time_discretization(&self) -> &TimeDiscretization {
        &self.tenor
    }

    fn forward_rate_discretization(&self) -> &TimeDiscretization {
        &self.tenor
    }

    fn number_of_paths(&self) -> usize {
        1
    }

    fn numeraire(&self, time: f64) -> Result<RandomVariable, MarginError> {
        Ok(RandomVariable::deterministic(
            (self.rate * time).exp() * self.adjustment(time),
        ))
    }

    fn forward_rate(
        &self,
        _time_index: usize,
        rate_index: usize,
    ) -> Result<RandomVariable, MarginError> {
        let period_length = self.tenor.time_step(rate_index).ok_or_else(|| {
            MarginError::InvalidInput(format!("forward rate index {} out of range", rate_index))
        })?;
        Ok(RandomVariable::deterministic(self.period_rate(period_length)))
    }

    fn forward_rate_factor(&self, time_index: usize, rate_index: usize) -> FactorId {
        FactorId((time_index * self.number_of_forward_rates() + rate_index) as u64)
    }

    fn numeraire_adjustments(&self) -> NumeraireAdjustmentMap {
        let mut map = NumeraireAdjustmentMap::new();
        for (i, &t) in self.tenor.times().iter().enumerate().skip(1) {
            map.insert(
                t,
                NumeraireAdjustment {
                    factor: FactorId(ADJUSTMENT_FACTOR_OFFSET + i as u64),
                    value: RandomVariable::deterministic(self.adjustment(t)),
                },
            );
        }
        map
    }

    fn ois_adjustment_factor(&self, time: f64) -> Result<RandomVariable, MarginError> {
        Ok(RandomVariable::deterministic(self.adjustment(time)))
    }

    fn forward_bond_libor(&self, maturity: f64, time: f64) -> Result<RandomVariable, MarginError> {
        Ok(RandomVariable::deterministic(
            (-self.rate * (maturity - time)).exp(),
        ))
    }

    fn forward_bond_ois(&self, maturity: f64, time: f64) -> Result<RandomVariable, MarginError> {
        Ok(RandomVariable::deterministic(
            (-(self.rate - self.basis_spread) * (maturity - time)).exp(),
        ))
    }

    fn conditional_expectation_operator(
        &self,
        time: f64,
    ) -> Result<Box<dyn ConditionalExpectation>, MarginError> {
        Ok(Box::new(RegressionEstimator::unconditional(time)))
    }
}
