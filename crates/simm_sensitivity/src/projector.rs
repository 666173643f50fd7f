//! Projection of the time-0 gradient onto curve sensitivities at time `t`.
//!
//! # Forward curve
//!
//! For every forward rate still alive at `t`,
//!
//! ```text
//! dV/dL_i (t) = E[ dV(0)/dL_i(t) · N(t) | F_t ]
//! ```
//!
//! If `t` lies strictly inside an accrual period, the rate fixed at the start
//! of that period leads the vector. It is known at `t`, so its entry skips
//! the regression.
//!
//! # Discount curve
//!
//! For every numeraire adjustment `A(T)` with `T > t`,
//!
//! ```text
//! dV/dA(T) = E[ dV(0)/dA(T) | F_t ] · N(t)
//! dV/dP(T) = -dV/dA(T) · A(T)² / ( P_L(T; t) · A(t) )
//! ```
//!
//! and the result is interpolated log-linearly onto the pivot grid
//! `t + iΔ`.

use crate::interpolation::interpolate_onto_pivot_grid;
use simm_core::simm::RiskClass;
use simm_core::types::{MarginError, RandomVariable, TimeKey};
use simm_models::{
    ConditionalExpectation, Gradient, ModelId, NumeraireAdjustmentMap, TermStructureModel,
};
use tracing::trace;

/// Conditional-expectation operator valid for one `(time, model)` pair.
struct BoundOperator {
    time: TimeKey,
    model: ModelId,
    operator: Box<dyn ConditionalExpectation>,
}

/// Turns gradients into forward-rate and discount-bond sensitivities.
///
/// Holds the regression operator of the last evaluation time so repeated
/// projections at the same time reuse it.
#[derive(Default)]
pub struct CurveSensitivityProjector {
    operator: Option<BoundOperator>,
    operator_builds: u64,
}

impl std::fmt::Debug for CurveSensitivityProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurveSensitivityProjector")
            .field("bound_time", &self.operator.as_ref().map(|b| b.time))
            .field("operator_builds", &self.operator_builds)
            .finish()
    }
}

impl CurveSensitivityProjector {
    /// Creates a projector without a bound operator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the bound operator.
    pub fn reset(&mut self) {
        self.operator = None;
    }

    /// Number of regression operators built so far.
    pub fn operator_builds(&self) -> u64 {
        self.operator_builds
    }

    /// Conditional-expectation operator at `time`, rebuilt only when the
    /// time or the model changed.
    pub fn conditional_expectation(
        &mut self,
        time: f64,
        model: &dyn TermStructureModel,
    ) -> Result<&dyn ConditionalExpectation, MarginError> {
        let key = TimeKey::new(time);
        let stale = match &self.operator {
            Some(bound) => bound.time != key || bound.model != model.id(),
            None => true,
        };
        if stale {
            self.operator = None;
            let operator = model.conditional_expectation_operator(time)?;
            self.operator_builds += 1;
            trace!(time, model = %model.id(), "built conditional expectation operator");
            self.operator = Some(BoundOperator {
                time: key,
                model: model.id(),
                operator,
            });
        }
        match &self.operator {
            Some(bound) => Ok(bound.operator.as_ref()),
            None => Err(MarginError::Regression(
                "conditional expectation operator unavailable".to_string(),
            )),
        }
    }

    /// Forward-rate sensitivities `dV/dL` at `evaluation_time`.
    ///
    /// One entry per forward rate not yet fixed at `evaluation_time`, preceded
    /// by the entry of the last fixed rate if `evaluation_time` is not a tenor
    /// point. See [`forward_pivot_maturities`] for the matching maturities.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::InvalidInput` if `evaluation_time` precedes the
    /// model grids or the fixing time of the leading fixed rate is not a
    /// simulation time, and propagates model and regression errors.
    pub fn forward_rate_sensitivities(
        &mut self,
        evaluation_time: f64,
        model: &dyn TermStructureModel,
        gradient: &Gradient,
    ) -> Result<Vec<RandomVariable>, MarginError> {
        let layout = ForwardLayout::new(evaluation_time, model)?;
        let time_index = model
            .time_discretization()
            .index_nearest_less_or_equal(evaluation_time)
            .ok_or_else(|| before_grid(evaluation_time))?;
        let numeraire = model.numeraire(evaluation_time)?;

        let mut result = Vec::with_capacity(layout.len());

        if let Some(fixed_index) = layout.fixed_rate {
            let fixing_time = model
                .forward_rate_discretization()
                .time(fixed_index)
                .ok_or_else(|| before_grid(evaluation_time))?;
            let fixing_time_index = model
                .time_discretization()
                .index_of(fixing_time)
                .ok_or_else(|| {
                    MarginError::InvalidInput(format!(
                        "fixing time {} of forward rate {} is not on the simulation grid",
                        fixing_time, fixed_index
                    ))
                })?;
            let dv_dl = gradient.derivative(model.forward_rate_factor(fixing_time_index, fixed_index));
            result.push(&dv_dl * &numeraire);
        }

        let operator = self.conditional_expectation(evaluation_time, model)?;
        for rate_index in layout.first_open_rate..layout.number_of_rates {
            let dv_dl = gradient.derivative(model.forward_rate_factor(time_index, rate_index));
            result.push(operator.expectation(&(&dv_dl * &numeraire))?);
        }

        trace!(evaluation_time, entries = result.len(), "forward rate sensitivities");
        Ok(result)
    }

    /// Discount-bond sensitivities `dV/dP` at `evaluation_time` on the pivot
    /// grid `evaluation_time + iΔ`, `i = 0..=n` with `n` the number of
    /// remaining forward rates (at least one).
    ///
    /// Adjustments whose projected derivative vanishes on every path belong
    /// to cash flows outside this product and are skipped. If none remain the
    /// result is all zero.
    ///
    /// # Errors
    ///
    /// Propagates model, regression and interpolation errors.
    pub fn discount_bond_sensitivities(
        &mut self,
        evaluation_time: f64,
        risk_class: RiskClass,
        model: &dyn TermStructureModel,
        gradient: &Gradient,
        adjustments: &NumeraireAdjustmentMap,
    ) -> Result<Vec<RandomVariable>, MarginError> {
        let step = pivot_step(model)?;
        let number_of_pivots = remaining_forward_rates(evaluation_time, model);
        let numeraire = model.numeraire(evaluation_time)?;
        let adjustment_at_evaluation = model.ois_adjustment_factor(evaluation_time)?;

        let mut times = Vec::new();
        let mut dv_dp = Vec::new();
        {
            let operator = self.conditional_expectation(evaluation_time, model)?;
            for (time, adjustment) in adjustments.after(evaluation_time) {
                let dv_da = &operator.expectation(&gradient.derivative(adjustment.factor))? * &numeraire;
                if dv_da.is_zero() {
                    continue;
                }
                let bond = model.forward_bond_libor(time, evaluation_time)?;
                let numerator = &dv_da * &adjustment.value.squared();
                let denominator = &bond * &adjustment_at_evaluation;
                dv_dp.push(-(&numerator / &denominator));
                times.push(time);
            }
        }

        trace!(
            evaluation_time,
            %risk_class,
            adjustments = times.len(),
            "discount bond sensitivities"
        );

        if dv_dp.is_empty() {
            return Ok(vec![RandomVariable::zero(); number_of_pivots.max(1) + 1]);
        }

        interpolate_onto_pivot_grid(evaluation_time, &times, &dv_dp, step, number_of_pivots, model)
    }
}

/// Layout of the forward-rate sensitivity vector at one evaluation time.
#[derive(Debug, Clone, Copy)]
struct ForwardLayout {
    /// Rate fixed before the evaluation time whose period is still running.
    fixed_rate: Option<usize>,
    /// First rate fixing at or after the evaluation time.
    first_open_rate: usize,
    number_of_rates: usize,
}

impl ForwardLayout {
    fn new(evaluation_time: f64, model: &dyn TermStructureModel) -> Result<Self, MarginError> {
        let tenor = model.forward_rate_discretization();
        let number_of_rates = model.number_of_forward_rates();
        let last_fixed = tenor
            .index_nearest_less_or_equal(evaluation_time)
            .ok_or_else(|| before_grid(evaluation_time))?;
        let on_tenor = tenor.index_of(evaluation_time).is_some();

        let first_open_rate = next_pivot_index(evaluation_time, model)
            .unwrap_or(number_of_rates)
            .min(number_of_rates);
        let fixed_rate = (!on_tenor && last_fixed < number_of_rates).then_some(last_fixed);

        Ok(Self {
            fixed_rate,
            first_open_rate,
            number_of_rates,
        })
    }

    fn len(&self) -> usize {
        usize::from(self.fixed_rate.is_some()) + (self.number_of_rates - self.first_open_rate)
    }
}

fn before_grid(time: f64) -> MarginError {
    MarginError::InvalidInput(format!("evaluation time {} precedes the model grid", time))
}

fn pivot_step(model: &dyn TermStructureModel) -> Result<f64, MarginError> {
    model
        .forward_rate_discretization()
        .time_step(0)
        .ok_or_else(|| MarginError::InvalidInput("forward rate grid has no periods".to_string()))
}

/// Index of the first tenor point at or after `time`.
pub fn next_pivot_index(time: f64, model: &dyn TermStructureModel) -> Option<usize> {
    model
        .forward_rate_discretization()
        .index_nearest_greater_or_equal(time)
}

/// Tenor time of the first pivot at or after `time`.
pub fn next_pivot_time(time: f64, model: &dyn TermStructureModel) -> Option<f64> {
    next_pivot_index(time, model).and_then(|i| model.forward_rate_discretization().time(i))
}

/// Tenor time of the last pivot at or before `time`.
pub fn previous_pivot_time(time: f64, model: &dyn TermStructureModel) -> Option<f64> {
    let tenor = model.forward_rate_discretization();
    tenor
        .index_nearest_less_or_equal(time)
        .and_then(|i| tenor.time(i))
}

/// Number of forward rates fixing at or after `time`.
pub fn remaining_forward_rates(time: f64, model: &dyn TermStructureModel) -> usize {
    let number_of_rates = model.number_of_forward_rates();
    next_pivot_index(time, model)
        .map(|i| number_of_rates.saturating_sub(i))
        .unwrap_or(0)
}

/// Residual maturities of the entries returned by
/// [`CurveSensitivityProjector::forward_rate_sensitivities`].
///
/// Each forward rate is placed at the end of its accrual period.
pub fn forward_pivot_maturities(
    evaluation_time: f64,
    model: &dyn TermStructureModel,
) -> Result<Vec<f64>, MarginError> {
    let layout = ForwardLayout::new(evaluation_time, model)?;
    let tenor = model.forward_rate_discretization();
    let period_end = |rate_index: usize| {
        tenor
            .time(rate_index + 1)
            .map(|end| end - evaluation_time)
            .ok_or_else(|| {
                MarginError::InvalidInput(format!("forward rate index {} out of range", rate_index))
            })
    };

    let mut maturities = Vec::with_capacity(layout.len());
    if let Some(fixed_index) = layout.fixed_rate {
        maturities.push(period_end(fixed_index)?);
    }
    for rate_index in layout.first_open_rate..layout.number_of_rates {
        maturities.push(period_end(rate_index)?);
    }
    Ok(maturities)
}

/// Residual maturities `iΔ` of the discount pivot grid at `evaluation_time`.
pub fn discount_pivot_maturities(
    evaluation_time: f64,
    model: &dyn TermStructureModel,
) -> Result<Vec<f64>, MarginError> {
    let step = pivot_step(model)?;
    let number_of_pivots = remaining_forward_rates(evaluation_time, model).max(1);
    Ok((0..=number_of_pivots).map(|i| i as f64 * step).collect())
}
