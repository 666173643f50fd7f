//! Margin Valuation Adjustment (MVA).
//!
//! MVA is the cost of funding the initial margin a trade requires over its
//! life. With the numeraire `N(t)` and a funding spread `s`, the funding
//! bond is `B(t) = 1 / (N(t) e^{s t})`.
//!
//! ## Formulas
//!
//! On the grid `t_i = i Δ`, `i = 0, ..., n - 1` with `n = ⌈T / Δ⌉`:
//!
//! ```text
//! ΔB_i = B(t_{i+1}) - B(t_i)
//! MVA  = -E[ Σ_i ΔB_i · IM(t_i) ]
//! ```
//!
//! In [`MvaMode::Approximation`] the margin is replaced by its expectation
//! `E[IM(t_i)]` before it is multiplied by the bond increment.

use crate::config::{ConfigError, MvaConfig};
use serde::{Deserialize, Serialize};
use simm_core::types::{MarginError, RandomVariable, TIME_TOLERANCE};
use simm_models::TermStructureModel;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info_span};

/// How the margin enters the MVA sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MvaMode {
    /// Path-wise margin.
    #[default]
    Exact,
    /// Expected margin.
    Approximation,
}

impl FromStr for MvaMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(MvaMode::Exact),
            "approximation" | "approx" => Ok(MvaMode::Approximation),
            _ => Err(ConfigError::InvalidValue {
                field: "mva.mode",
                reason: format!("unknown MVA mode: {}", s),
            }),
        }
    }
}

impl fmt::Display for MvaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MvaMode::Exact => write!(f, "exact"),
            MvaMode::Approximation => write!(f, "approximation"),
        }
    }
}

/// Funding bond `1 / (N(t) e^{s t})`.
pub fn funding_bond(
    model: &dyn TermStructureModel,
    time: f64,
    funding_spread: f64,
) -> Result<RandomVariable, MarginError> {
    let numeraire = model.numeraire(time)?;
    Ok((numeraire * (time * funding_spread).exp()).invert())
}

/// Forward funding-bond increment `B(t_{i+1}) - B(t_i)`.
///
/// # Examples
///
/// ```
/// use simm_models::FlatCurveModel;
/// use simm_xva::mva::funding_bond_increment;
///
/// let model = FlatCurveModel::new(0.01, 1.0, 10).unwrap();
/// let increment = funding_bond_increment(&model, 0.0, 1.0, 0.0).unwrap();
/// assert!((increment.average() - ((-0.01f64).exp() - 1.0)).abs() < 1e-12);
/// ```
pub fn funding_bond_increment(
    model: &dyn TermStructureModel,
    time: f64,
    next_time: f64,
    funding_spread: f64,
) -> Result<RandomVariable, MarginError> {
    Ok(funding_bond(model, next_time, funding_spread)? - funding_bond(model, time, funding_spread)?)
}

/// Number of margin dates for a product maturing at `final_maturity`.
///
/// A trailing partial interval counts as a step; its end date is clipped to
/// `final_maturity` in [`margin_valuation_adjustment`]. Maturities within
/// `TIME_TOLERANCE` of a grid point do not add an extra step.
pub fn number_of_steps(final_maturity: f64, time_step: f64) -> usize {
    if final_maturity <= 0.0 {
        return 0;
    }
    (final_maturity / time_step - TIME_TOLERANCE).ceil().max(0.0) as usize
}

/// Computes the MVA of a margin profile.
///
/// `initial_margin` is called once per grid date `t_i` and must return the
/// path-wise margin at that date.
///
/// # Arguments
///
/// * `final_maturity` - Last date on which margin is posted
/// * `config` - Grid spacing, funding spread and mode
/// * `model` - Supplies the numeraire
/// * `initial_margin` - Margin at a given time
///
/// # Returns
///
/// MVA as a positive cost when margin is positive and funding is costly.
pub fn margin_valuation_adjustment<F>(
    final_maturity: f64,
    config: &MvaConfig,
    model: &dyn TermStructureModel,
    mut initial_margin: F,
) -> Result<f64, MarginError>
where
    F: FnMut(f64) -> Result<RandomVariable, MarginError>,
{
    if !(config.time_step.is_finite() && config.time_step > 0.0) {
        return Err(MarginError::InvalidInput(format!(
            "MVA time step must be positive, got {}",
            config.time_step
        )));
    }

    let steps = number_of_steps(final_maturity, config.time_step);
    let span = info_span!("mva", final_maturity, steps, mode = %config.mode);
    let _guard = span.enter();

    let mut sum = RandomVariable::zero();
    for i in 0..steps {
        let time = i as f64 * config.time_step;
        let next_time = ((i + 1) as f64 * config.time_step).min(final_maturity);

        let increment = funding_bond_increment(model, time, next_time, config.funding_spread)?;
        let margin = initial_margin(time)?;
        let margin = match config.mode {
            MvaMode::Exact => margin,
            MvaMode::Approximation => margin.expectation(),
        };
        sum = sum + increment * margin;
    }

    let mva = -sum.average();
    debug!(mva, "computed margin valuation adjustment");
    Ok(mva)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use simm_models::{FlatCurveModel, SimulatedLiborModel};

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Exact".parse::<MvaMode>().unwrap(), MvaMode::Exact);
        assert_eq!("approx".parse::<MvaMode>().unwrap(), MvaMode::Approximation);
        assert!("full".parse::<MvaMode>().is_err());
    }

    #[test]
    fn test_number_of_steps() {
        assert_eq!(number_of_steps(10.0, 1.0), 10);
        assert_eq!(number_of_steps(10.0, 0.3), 34);
        assert_eq!(number_of_steps(0.0, 0.5), 0);
        assert_eq!(number_of_steps(1.5 + 1e-13, 0.5), 3);
    }

    #[test]
    fn test_constant_margin_closed_form() {
        let model = FlatCurveModel::new(0.01, 1.0, 10).unwrap();
        let config = MvaConfig::default().with_time_step(1.0);

        let mva = margin_valuation_adjustment(10.0, &config, &model, |_| {
            Ok(RandomVariable::deterministic(100.0))
        })
        .unwrap();

        let expected: f64 = -(0..10)
            .map(|i| {
                let t = i as f64;
                ((-0.01 * (t + 1.0)).exp() - (-0.01 * t).exp()) * 100.0
            })
            .sum::<f64>();
        assert_relative_eq!(mva, expected, epsilon = 1e-10);
        assert_relative_eq!(mva, 100.0 * (1.0 - (-0.1f64).exp()), epsilon = 1e-10);
    }

    #[test]
    fn test_partial_last_interval_is_clipped_to_maturity() {
        let model = FlatCurveModel::new(0.01, 0.5, 10).unwrap();
        let config = MvaConfig::default().with_time_step(1.0);
        let mut dates = Vec::new();

        let mva = margin_valuation_adjustment(2.5, &config, &model, |t| {
            dates.push(t);
            Ok(RandomVariable::deterministic(100.0))
        })
        .unwrap();

        assert_eq!(number_of_steps(2.5, 1.0), 3);
        assert_eq!(dates, vec![0.0, 1.0, 2.0]);
        assert_relative_eq!(mva, 100.0 * (1.0 - (-0.025f64).exp()), epsilon = 1e-10);
    }

    #[test]
    fn test_funding_spread_increases_cost() {
        let model = FlatCurveModel::new(0.01, 1.0, 10).unwrap();
        let margin = |_: f64| Ok(RandomVariable::deterministic(100.0));

        let base = margin_valuation_adjustment(5.0, &MvaConfig::default(), &model, margin).unwrap();
        let spread = margin_valuation_adjustment(
            5.0,
            &MvaConfig::default().with_funding_spread(0.01),
            &model,
            margin,
        )
        .unwrap();

        assert!(spread > base);
    }

    #[test]
    fn test_modes_agree_under_deterministic_numeraire() {
        let model = FlatCurveModel::new(0.02, 1.0, 5).unwrap();
        let margin = |_: f64| Ok(RandomVariable::from_paths(vec![50.0, 150.0]));
        let config = MvaConfig::default().with_time_step(1.0);

        let exact = margin_valuation_adjustment(3.0, &config, &model, margin).unwrap();
        let approx = margin_valuation_adjustment(
            3.0,
            &config.clone().with_mode(MvaMode::Approximation),
            &model,
            margin,
        )
        .unwrap();

        assert_relative_eq!(exact, approx, epsilon = 1e-12);
    }

    #[test]
    fn test_modes_differ_by_covariance_under_stochastic_numeraire() {
        let model = SimulatedLiborModel::builder()
            .number_of_rates(8)
            .period_length(0.5)
            .volatility(0.3)
            .number_of_paths(500)
            .seed(7)
            .build()
            .unwrap();
        // Margin proportional to the numeraire is correlated with the funding bond
        let margin = |t: f64| -> Result<RandomVariable, MarginError> {
            Ok(model.numeraire(t)? * 100.0)
        };
        let config = MvaConfig::default().with_time_step(0.5).with_funding_spread(0.01);

        let exact = margin_valuation_adjustment(4.0, &config, &model, margin).unwrap();
        let approx = margin_valuation_adjustment(
            4.0,
            &config.clone().with_mode(MvaMode::Approximation),
            &model,
            margin,
        )
        .unwrap();

        let mut covariance = 0.0;
        for i in 0..number_of_steps(4.0, 0.5) {
            let time = i as f64 * 0.5;
            let increment = funding_bond_increment(&model, time, time + 0.5, 0.01).unwrap();
            let im = margin(time).unwrap();
            covariance += (&increment * &im).average() - increment.average() * im.average();
        }

        assert!(covariance.abs() > 1e-8);
        assert_relative_eq!(exact - approx, -covariance, max_relative = 1e-8, epsilon = 1e-12);
    }

    #[test]
    fn test_margin_failure_propagates() {
        let model = FlatCurveModel::new(0.02, 1.0, 5).unwrap();
        let result = margin_valuation_adjustment(2.0, &MvaConfig::default(), &model, |t| {
            if t > 0.0 {
                Err(MarginError::ValuationFailure("no paths".to_string()))
            } else {
                Ok(RandomVariable::one())
            }
        });
        assert!(matches!(result, Err(MarginError::ValuationFailure(_))));
    }
}
