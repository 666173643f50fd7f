//! Shared fixtures for the sensitivity integration tests.

#![allow(dead_code)]

use simm_core::simm::{CurveIndex, ProductClass, RiskClass};
use simm_core::types::{Currency, MarginError, RandomVariable};
use simm_models::{
    Gradient, ProductClassification, SimmProduct, TermStructureModel, Valuation,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Receiver-fixed-style stub: unit sensitivity to every forward rate on every
/// simulation step up to its fixing, and a negative sensitivity to every
/// numeraire adjustment up to the final maturity.
pub struct StubSwap {
    classification: ProductClassification,
    maturity: f64,
    valuations: Arc<AtomicUsize>,
}

impl StubSwap {
    pub fn new(maturity: f64) -> Self {
        Self {
            classification: ProductClassification::new(
                ProductClass::RatesFx,
                vec![RiskClass::InterestRate],
                vec![CurveIndex::Ois, CurveIndex::libor_6m()],
                Currency::eur(),
            ),
            maturity,
            valuations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn valuation_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.valuations)
    }
}

impl SimmProduct for StubSwap {
    fn classification(&self) -> &ProductClassification {
        &self.classification
    }

    fn final_maturity(&self) -> f64 {
        self.maturity
    }

    fn value_with_gradient(
        &self,
        _evaluation_time: f64,
        model: &dyn TermStructureModel,
    ) -> Result<Valuation, MarginError> {
        self.valuations.fetch_add(1, Ordering::SeqCst);

        let tenor = model.forward_rate_discretization();
        let times = model.time_discretization();
        let mut gradient = Gradient::new();

        for rate_index in 0..model.number_of_forward_rates() {
            let fixing = match tenor.time(rate_index) {
                Some(t) if t < self.maturity => t,
                _ => break,
            };
            let last_step = times.index_nearest_less_or_equal(fixing).unwrap_or(0);
            for time_index in 0..=last_step {
                let rate = model.forward_rate(time_index, rate_index)?;
                gradient.insert(
                    model.forward_rate_factor(time_index, rate_index),
                    &rate * 50.0 + 1.0,
                );
            }
        }

        for (time, adjustment) in model.numeraire_adjustments().iter() {
            if time <= self.maturity {
                gradient.insert(adjustment.factor, RandomVariable::deterministic(-2.0));
            }
        }

        Ok(Valuation {
            value: RandomVariable::zero(),
            gradient,
        })
    }
}

pub fn valuations(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
