//! Single-factor lognormal forward-rate model.
//!
//! Every forward rate is driven by the same Brownian motion `W`:
//!
//! ```text
//! L_i(t) = L_i(0) exp(σ W(t) - ½ σ² t)     for t ≤ T_i
//! L_i(t) = L_i(T_i)                        for t > T_i (fixed)
//! ```
//!
//! The numeraire is the discretely rolled spot-LIBOR account scaled by the
//! deterministic OIS adjustment `A(t) = exp(-s t)`:
//!
//! ```text
//! N(t) = A(t) (1 + (t - T_k) L_k(T_k)) Π_{j<k} (1 + δ_j L_j(T_j)),   T_k ≤ t < T_{k+1}
//! ```
//!
//! Conditional expectations at `t` regress on `{1, N(t), N(t)²}`.
//! The model is a reference collaborator for tests and benchmarks, not a
//! calibrated LIBOR market model.

use crate::model::{FactorId, ModelId, NumeraireAdjustment, NumeraireAdjustmentMap, TermStructureModel};
use crate::regression::{ConditionalExpectation, RegressionEstimator};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use simm_core::types::{MarginError, RandomVariable, TimeDiscretization, TIME_TOLERANCE};

/// First factor id used for numeraire adjustments; forward-rate ids stay below it.
const ADJUSTMENT_FACTOR_OFFSET: u64 = 1 << 32;

/// Builder for [`SimulatedLiborModel`].
///
/// # Examples
///
/// ```
/// use simm_models::{SimulatedLiborModel, TermStructureModel};
///
/// let model = SimulatedLiborModel::builder()
///     .initial_forward_rate(0.02)
///     .volatility(0.2)
///     .period_length(0.5)
///     .number_of_rates(10)
///     .number_of_paths(500)
///     .seed(7)
///     .build()
///     .unwrap();
///
/// assert_eq!(model.number_of_forward_rates(), 10);
/// assert_eq!(model.numeraire(0.0).unwrap().get(0), 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedLiborModelBuilder {
    initial_forward_rate: f64,
    volatility: f64,
    basis_spread: f64,
    period_length: f64,
    number_of_rates: usize,
    simulation_steps_per_period: usize,
    number_of_paths: usize,
    seed: u64,
}

impl Default for SimulatedLiborModelBuilder {
    fn default() -> Self {
        Self {
            initial_forward_rate: 0.02,
            volatility: 0.2,
            basis_spread: 0.0,
            period_length: 0.5,
            number_of_rates: 20,
            simulation_steps_per_period: 1,
            number_of_paths: 1000,
            seed: 42,
        }
    }
}

impl SimulatedLiborModelBuilder {
    /// Flat initial forward curve level.
    pub fn initial_forward_rate(mut self, rate: f64) -> Self {
        self.initial_forward_rate = rate;
        self
    }

    /// Lognormal volatility of every forward rate.
    pub fn volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    /// LIBOR-OIS basis spread driving the numeraire adjustment.
    pub fn basis_spread(mut self, spread: f64) -> Self {
        self.basis_spread = spread;
        self
    }

    /// Forward-rate period length (tenor step).
    pub fn period_length(mut self, period_length: f64) -> Self {
        self.period_length = period_length;
        self
    }

    /// Number of forward rates.
    pub fn number_of_rates(mut self, n: usize) -> Self {
        self.number_of_rates = n;
        self
    }

    /// Simulation steps per forward-rate period.
    pub fn simulation_steps_per_period(mut self, n: usize) -> Self {
        self.simulation_steps_per_period = n;
        self
    }

    /// Number of Monte Carlo paths.
    pub fn number_of_paths(mut self, n: usize) -> Self {
        self.number_of_paths = n;
        self
    }

    /// Random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Simulates the paths.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::InvalidInput` for non-positive rates, periods or
    /// counts.
    pub fn build(self) -> Result<SimulatedLiborModel, MarginError> {
        if self.number_of_rates == 0 || self.number_of_paths == 0 {
            return Err(MarginError::InvalidInput(
                "number of rates and paths must be positive".to_string(),
            ));
        }
        if self.simulation_steps_per_period == 0 {
            return Err(MarginError::InvalidInput(
                "at least one simulation step per period is required".to_string(),
            ));
        }
        if !(self.initial_forward_rate > 0.0) || self.volatility < 0.0 {
            return Err(MarginError::InvalidInput(
                "forward rate must be positive and volatility non-negative".to_string(),
            ));
        }

        let tenor = TimeDiscretization::uniform(0.0, self.number_of_rates, self.period_length)?;
        let dt = self.period_length / self.simulation_steps_per_period as f64;
        let times = TimeDiscretization::uniform(
            0.0,
            self.number_of_rates * self.simulation_steps_per_period,
            dt,
        )?;

        let brownian = simulate_brownian(&times, self.number_of_paths, self.seed);
        let forward_rates = simulate_forward_rates(&self, &times, &tenor, &brownian);

        Ok(SimulatedLiborModel {
            id: ModelId::next(),
            basis_spread: self.basis_spread,
            times,
            tenor,
            number_of_paths: self.number_of_paths,
            forward_rates,
        })
    }
}

/// Brownian motion on `times`, indexed `[time_index][path]`.
fn simulate_brownian(times: &TimeDiscretization, paths: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut levels = vec![vec![0.0; paths]];
    for k in 0..times.number_of_time_steps() {
        let sqrt_dt = times.time_step(k).unwrap_or(0.0).sqrt();
        let previous = &levels[k];
        let next: Vec<f64> = previous
            .iter()
            .map(|w| {
                let z: f64 = StandardNormal.sample(&mut rng);
                w + sqrt_dt * z
            })
            .collect();
        levels.push(next);
    }
    levels
}

/// Forward rates indexed `[time_index][rate_index]`.
fn simulate_forward_rates(
    params: &SimulatedLiborModelBuilder,
    times: &TimeDiscretization,
    tenor: &TimeDiscretization,
    brownian: &[Vec<f64>],
) -> Vec<Vec<RandomVariable>> {
    let sigma = params.volatility;
    let mut rates: Vec<Vec<RandomVariable>> = Vec::with_capacity(times.len());

    for (k, &t) in times.times().iter().enumerate() {
        let mut at_time = Vec::with_capacity(params.number_of_rates);
        for i in 0..params.number_of_rates {
            let fixing = tenor.time(i).unwrap_or(0.0);
            if t > fixing + TIME_TOLERANCE {
                // Already fixed: carry the value observed at the fixing time.
                let fixed = rates[k - 1][i].clone();
                at_time.push(fixed);
            } else {
                let drift = -0.5 * sigma * sigma * t;
                let values = brownian[k]
                    .iter()
                    .map(|w| params.initial_forward_rate * (sigma * w + drift).exp())
                    .collect();
                at_time.push(RandomVariable::from_paths(values));
            }
        }
        rates.push(at_time);
    }
    rates
}

/// Reference single-factor lognormal LIBOR model.
#[derive(Debug, Clone)]
pub struct SimulatedLiborModel {
    id: ModelId,
    basis_spread: f64,
    times: TimeDiscretization,
    tenor: TimeDiscretization,
    number_of_paths: usize,
    forward_rates: Vec<Vec<RandomVariable>>,
}

impl SimulatedLiborModel {
    /// Starts a builder with default parameters.
    pub fn builder() -> SimulatedLiborModelBuilder {
        SimulatedLiborModelBuilder::default()
    }

    fn adjustment(&self, time: f64) -> f64 {
        (-self.basis_spread * time).exp()
    }

    fn time_index_at_or_before(&self, time: f64) -> Result<usize, MarginError> {
        self.times
            .index_nearest_less_or_equal(time)
            .ok_or_else(|| MarginError::InvalidInput(format!("time {} precedes simulation", time)))
    }

    fn rate(&self, time_index: usize, rate_index: usize) -> Result<&RandomVariable, MarginError> {
        self.forward_rates
            .get(time_index)
            .and_then(|rates| rates.get(rate_index))
            .ok_or_else(|| {
                MarginError::InvalidInput(format!(
                    "forward rate ({}, {}) out of range",
                    time_index, rate_index
                ))
            })
    }

    /// LIBOR discount factor from `from` to `to` using rates observed at
    /// simulation index `time_index`; flat extrapolation beyond the tenor.
    fn libor_discount(&self, from: f64, to: f64, time_index: usize) -> Result<RandomVariable, MarginError> {
        let mut bond = RandomVariable::one();
        if to <= from + TIME_TOLERANCE {
            return Ok(bond);
        }
        let n = self.number_of_forward_rates();
        let last_rate_index = n - 1;
        let mut start = from;
        while start < to - TIME_TOLERANCE {
            let period = self
                .tenor
                .index_nearest_less_or_equal(start)
                .unwrap_or(0)
                .min(last_rate_index);
            let period_end = if period == last_rate_index {
                to
            } else {
                self.tenor.time(period + 1).unwrap_or(to).min(to)
            };
            let accrual = period_end - start;
            let rate = self.rate(time_index, period)?;
            bond = &bond / &(&(rate * accrual) + 1.0);
            start = period_end;
        }
        Ok(bond)
    }
}

impl TermStructureModel for SimulatedLiborModel {
    fn id(&self) -> ModelId {
        self.id
    }

    fn time_discretization(&self) -> &TimeDiscretization {
        &self.times
    }

    fn forward_rate_discretization(&self) -> &TimeDiscretization {
        &self.tenor
    }

    fn number_of_paths(&self) -> usize {
        self.number_of_paths
    }

    fn numeraire(&self, time: f64) -> Result<RandomVariable, MarginError> {
        let n = self.number_of_forward_rates();
        let mut account = RandomVariable::one();
        for j in 0..n {
            let start = self.tenor.time(j).unwrap_or(0.0);
            if start >= time - TIME_TOLERANCE {
                break;
            }
            let end = self.tenor.time(j + 1).unwrap_or(start);
            let accrual = end.min(time) - start;
            let fixing_index = self.time_index_at_or_before(start)?;
            let rate = self.rate(fixing_index, j)?;
            account = &account * &(&(rate * accrual) + 1.0);
        }
        Ok(account * self.adjustment(time))
    }

    fn forward_rate(&self, time_index: usize, rate_index: usize) -> Result<RandomVariable, MarginError> {
        self.rate(time_index, rate_index).cloned()
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
        let time_index = self.time_index_at_or_before(time)?;
        self.libor_discount(time, maturity, time_index)
    }

    fn forward_bond_ois(&self, maturity: f64, time: f64) -> Result<RandomVariable, MarginError> {
        let libor = self.forward_bond_libor(maturity, time)?;
        Ok(libor * (self.adjustment(time) / self.adjustment(maturity)))
    }

    fn conditional_expectation_operator(
        &self,
        time: f64,
    ) -> Result<Box<dyn ConditionalExpectation>, MarginError> {
        if time <= TIME_TOLERANCE {
            return Ok(Box::new(RegressionEstimator::unconditional(time)));
        }
        let numeraire = self.numeraire(time)?;
        let basis = vec![RandomVariable::one(), numeraire.clone(), numeraire.squared()];
        Ok(Box::new(RegressionEstimator::new(time, basis)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> SimulatedLiborModel {
        SimulatedLiborModel::builder()
            .initial_forward_rate(0.03)
            .volatility(0.25)
            .period_length(0.5)
            .number_of_rates(8)
            .number_of_paths(2000)
            .seed(11)
            .build()
            .unwrap()
    }

    #[test]
    fn test_rates_are_martingales_on_average() {
        let model = model();
        let last = model.time_discretization().len() - 1;
        let rate = model.forward_rate(last, 7).unwrap();
        assert_relative_eq!(rate.average(), 0.03, max_relative = 0.05);
    }

    #[test]
    fn test_fixed_rates_are_frozen() {
        let model = model();
        let at_fixing = model.forward_rate(2, 2).unwrap();
        let later = model.forward_rate(5, 2).unwrap();
        assert_eq!(at_fixing, later);
    }

    #[test]
    fn test_numeraire_on_tenor() {
        let model = model();
        let expected = &(model.forward_rate(0, 0).unwrap() * 0.5) + 1.0;
        assert_eq!(model.numeraire(0.5).unwrap(), expected);
        assert_eq!(model.numeraire(0.0).unwrap().get(0), 1.0);
    }

    #[test]
    fn test_bond_interpolates_accrual() {
        let model = model();
        let full = model.forward_bond_libor(1.0, 0.0).unwrap();
        let l0 = model.forward_rate(0, 0).unwrap().get(0);
        let l1 = model.forward_rate(0, 1).unwrap().get(0);
        assert_relative_eq!(full.get(0), 1.0 / ((1.0 + 0.5 * l0) * (1.0 + 0.5 * l1)));

        let same = model.forward_bond_libor(2.0, 2.0).unwrap();
        assert_eq!(same.get(0), 1.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(SimulatedLiborModel::builder().number_of_rates(0).build().is_err());
        assert!(SimulatedLiborModel::builder().initial_forward_rate(-0.01).build().is_err());
        assert!(SimulatedLiborModel::builder().period_length(0.0).build().is_err());
    }

    #[test]
    fn test_regression_operator_is_time_bound() {
        let model = model();
        let operator = model.conditional_expectation_operator(1.5).unwrap();
        assert_eq!(operator.time(), 1.5);
        let numeraire = model.numeraire(1.5).unwrap();
        let projected = operator.expectation(&numeraire).unwrap();
        for (a, b) in projected.values().iter().zip(numeraire.values()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8);
        }
    }
}
