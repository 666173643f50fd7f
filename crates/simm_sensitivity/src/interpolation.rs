//! Log-linear discount-bond interpolation onto a pivot grid.
//!
//! Discount sensitivities arrive on the model's numeraire-adjustment dates,
//! which generally do not coincide with the uniform pivot grid
//! `t, t + Δ, t + 2Δ, ...` anchored at the evaluation time. With
//!
//! ```text
//! ln P(T_cf) = (1 - α) ln P(T_l) + α ln P(T_u),   α = (T_cf - T_l) / Δ
//! ```
//!
//! the chain rule gives the Jacobian entries
//!
//! ```text
//! ∂P(T_cf)/∂P(T_l) = P(T_cf) (1 - α) / P(T_l)
//! ∂P(T_cf)/∂P(T_u) = P(T_cf) α / P(T_u)
//! ```
//!
//! which redistribute `dV/dP(T_cf)` onto the two bracketing pivots.

use simm_core::types::{MarginError, RandomVariable, TimeDiscretization};
use simm_models::TermStructureModel;

/// Bracketing pivots and interpolation weight for one cash-flow time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondInterpolation {
    /// Index of the lower bracketing pivot.
    pub lower_index: usize,
    /// Position between the lower and upper pivot, `0` at the lower pivot.
    ///
    /// Exceeds `1` when the time lies beyond the last pivot.
    pub alpha: f64,
}

impl BondInterpolation {
    /// Index of the upper bracketing pivot.
    pub fn upper_index(&self) -> usize {
        self.lower_index + 1
    }

    /// Jacobian weights `(∂P_cf/∂P_lower, ∂P_cf/∂P_upper)` given the bond
    /// values at the cash-flow time and at both pivots.
    pub fn weights(
        &self,
        bond_at_cash_flow: &RandomVariable,
        bond_lower: &RandomVariable,
        bond_upper: &RandomVariable,
    ) -> (RandomVariable, RandomVariable) {
        let lower = &(bond_at_cash_flow * (1.0 - self.alpha)) / bond_lower;
        let upper = &(bond_at_cash_flow * self.alpha) / bond_upper;
        (lower, upper)
    }
}

/// Locates `time` on `pivots`.
///
/// # Errors
///
/// Returns `MarginError::InvalidInput` if the grid has fewer than two points
/// or `time` precedes the first pivot.
pub fn log_linear_bond_weights(
    time: f64,
    pivots: &TimeDiscretization,
) -> Result<BondInterpolation, MarginError> {
    if pivots.len() < 2 {
        return Err(MarginError::InvalidInput(
            "pivot grid needs at least two points".to_string(),
        ));
    }
    let lower_index = pivots
        .index_nearest_less_or_equal(time)
        .ok_or_else(|| {
            MarginError::InvalidInput(format!(
                "time {} precedes the first pivot {}",
                time,
                pivots.first()
            ))
        })?
        .min(pivots.len() - 2);

    // Both pivots exist: lower_index <= len - 2.
    let lower = pivots.times()[lower_index];
    let upper = pivots.times()[lower_index + 1];

    Ok(BondInterpolation {
        lower_index,
        alpha: (time - lower) / (upper - lower),
    })
}

/// Redistributes discount-bond sensitivities given at `times` onto the
/// uniform pivot grid `evaluation_time + i * step`, `i = 0..=number_of_pivots`.
///
/// Bonds are OIS forward bonds observed at `evaluation_time`; the bond at the
/// first pivot is 1.
///
/// # Errors
///
/// Returns `MarginError::InvalidInput` if `times` and `sensitivities` differ
/// in length or the grid is degenerate, and propagates model errors.
pub fn interpolate_onto_pivot_grid(
    evaluation_time: f64,
    times: &[f64],
    sensitivities: &[RandomVariable],
    step: f64,
    number_of_pivots: usize,
    model: &dyn TermStructureModel,
) -> Result<Vec<RandomVariable>, MarginError> {
    if times.len() != sensitivities.len() {
        return Err(MarginError::InvalidInput(format!(
            "{} times for {} sensitivities",
            times.len(),
            sensitivities.len()
        )));
    }

    let pivots = TimeDiscretization::uniform(evaluation_time, number_of_pivots.max(1), step)?;
    let mut result = vec![RandomVariable::zero(); pivots.len()];

    for (&time, dv_dp) in times.iter().zip(sensitivities) {
        let interpolation = log_linear_bond_weights(time, &pivots)?;
        let lower_time = pivots.times()[interpolation.lower_index];
        let upper_time = pivots.times()[interpolation.upper_index()];

        let bond_at_cash_flow = model.forward_bond_ois(time, evaluation_time)?;
        let bond_lower = if interpolation.lower_index == 0 {
            RandomVariable::one()
        } else {
            model.forward_bond_ois(lower_time, evaluation_time)?
        };
        let bond_upper = model.forward_bond_ois(upper_time, evaluation_time)?;

        let (w_lower, w_upper) =
            interpolation.weights(&bond_at_cash_flow, &bond_lower, &bond_upper);

        let lower = &result[interpolation.lower_index] + &(dv_dp * &w_lower);
        result[interpolation.lower_index] = lower;
        let upper = &result[interpolation.upper_index()] + &(dv_dp * &w_upper);
        result[interpolation.upper_index()] = upper;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use simm_models::FlatCurveModel;

    #[test]
    fn test_weights_locate_bracketing_pivots() {
        let pivots = TimeDiscretization::uniform(1.0, 4, 0.5).unwrap();
        let w = log_linear_bond_weights(1.75, &pivots).unwrap();
        assert_eq!(w.lower_index, 1);
        assert_relative_eq!(w.alpha, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_time_on_pivot_has_zero_alpha() {
        let pivots = TimeDiscretization::uniform(0.0, 4, 0.5).unwrap();
        let w = log_linear_bond_weights(1.0, &pivots).unwrap();
        assert_eq!(w.lower_index, 2);
        assert_relative_eq!(w.alpha, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_last_pivot_clamps_lower_index() {
        let pivots = TimeDiscretization::uniform(0.0, 4, 0.5).unwrap();
        let w = log_linear_bond_weights(2.0, &pivots).unwrap();
        assert_eq!(w.lower_index, 3);
        assert_relative_eq!(w.alpha, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_time_before_grid_is_rejected() {
        let pivots = TimeDiscretization::uniform(1.0, 4, 0.5).unwrap();
        assert!(log_linear_bond_weights(0.5, &pivots).is_err());
    }

    #[test]
    fn test_exact_at_bracketing_pivots() {
        let bond = RandomVariable::deterministic(0.9);
        let other = RandomVariable::deterministic(0.8);

        let at_lower = BondInterpolation { lower_index: 0, alpha: 0.0 };
        let (l, u) = at_lower.weights(&bond, &bond, &other);
        assert_relative_eq!(l.get(0), 1.0);
        assert_relative_eq!(u.get(0), 0.0);

        let at_upper = BondInterpolation { lower_index: 0, alpha: 1.0 };
        let (l, u) = at_upper.weights(&bond, &other, &bond);
        assert_relative_eq!(l.get(0), 0.0);
        assert_relative_eq!(u.get(0), 1.0);
    }

    #[test]
    fn test_sensitivity_on_pivot_is_passed_through() {
        let model = FlatCurveModel::new(0.02, 0.5, 10).unwrap();
        let dv_dp = vec![RandomVariable::deterministic(-3.0)];

        let result = interpolate_onto_pivot_grid(1.0, &[2.0], &dv_dp, 0.5, 8, &model).unwrap();

        assert_eq!(result.len(), 9);
        assert_relative_eq!(result[2].get(0), -3.0, epsilon = 1e-12);
        let others: f64 = result
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 2)
            .map(|(_, v)| v.get(0).abs())
            .sum();
        assert_relative_eq!(others, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        let model = FlatCurveModel::new(0.02, 0.5, 10).unwrap();
        let result = interpolate_onto_pivot_grid(0.0, &[1.0, 2.0], &[RandomVariable::one()], 0.5, 4, &model);
        assert!(result.is_err());
    }

    proptest! {
        // Under a flat curve the log-linear weights reproduce the bond exactly:
        // P_cf = P_l^(1-α) P_u^α, so w_l P_l / (1-α) = w_u P_u / α = P_cf.
        #[test]
        fn prop_weights_reproduce_flat_curve_bond(offset in 0.0f64..4.0) {
            let model = FlatCurveModel::new(0.03, 0.5, 10).unwrap();
            let pivots = TimeDiscretization::uniform(0.0, 8, 0.5).unwrap();
            let w = log_linear_bond_weights(offset, &pivots).unwrap();
            let lower_time = pivots.times()[w.lower_index];
            let upper_time = pivots.times()[w.upper_index()];

            let p_cf = model.forward_bond_ois(offset, 0.0).unwrap().get(0);
            let p_l = model.forward_bond_ois(lower_time, 0.0).unwrap().get(0);
            let p_u = model.forward_bond_ois(upper_time, 0.0).unwrap().get(0);

            let interpolated = p_l.powf(1.0 - w.alpha) * p_u.powf(w.alpha);
            prop_assert!((interpolated - p_cf).abs() < 1e-12);
        }
    }
}
