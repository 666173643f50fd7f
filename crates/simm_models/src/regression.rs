//! Conditional expectation estimation by least-squares regression.
//!
//! `E[X | F_t]` is approximated by projecting the path-wise values of `X` on a
//! set of basis functions that are measurable at `t` (for example powers of
//! the numeraire `N(t)`). The design matrix is decomposed once when the
//! estimator is built and reused for every projection at that time.

use nalgebra::{DMatrix, DVector, Dyn, SVD};
use simm_core::types::{MarginError, RandomVariable};

/// Singular values below this (relative to the largest) are treated as zero.
const SINGULAR_VALUE_EPS: f64 = 1e-12;

/// Operator projecting a random variable onto the filtration at a fixed time.
pub trait ConditionalExpectation: Send + Sync {
    /// Time whose information set the operator projects onto.
    fn time(&self) -> f64;

    /// Estimates `E[value | F_time]` path-wise.
    fn expectation(&self, value: &RandomVariable) -> Result<RandomVariable, MarginError>;
}

/// Least-squares regression on basis functions.
///
/// # Examples
///
/// ```
/// use simm_core::types::RandomVariable;
/// use simm_models::{ConditionalExpectation, RegressionEstimator};
///
/// let x = RandomVariable::from_paths(vec![1.0, 2.0, 3.0, 4.0]);
/// let estimator = RegressionEstimator::new(
///     1.0,
///     vec![RandomVariable::one(), x.clone()],
/// ).unwrap();
///
/// // A linear function of the basis is reproduced exactly.
/// let y = &(&x * 2.0) + 1.0;
/// let projected = estimator.expectation(&y).unwrap();
/// for (a, b) in projected.values().iter().zip(y.values()) {
///     assert!((a - b).abs() < 1e-10);
/// }
/// ```
pub struct RegressionEstimator {
    time: f64,
    num_paths: usize,
    design: DMatrix<f64>,
    svd: SVD<f64, Dyn, Dyn>,
}

impl RegressionEstimator {
    /// Builds an estimator from basis functions observed at `time`.
    ///
    /// Deterministic basis functions are broadcast to the path count of the
    /// stochastic ones. If every basis function is deterministic the estimator
    /// reduces to the unconditional expectation.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::Regression` if no basis function is given or the
    /// stochastic basis functions disagree on the number of paths.
    pub fn new(time: f64, basis: Vec<RandomVariable>) -> Result<Self, MarginError> {
        if basis.is_empty() {
            return Err(MarginError::Regression(
                "at least one basis function is required".to_string(),
            ));
        }

        let num_paths = basis.iter().map(RandomVariable::num_paths).max().unwrap_or(1);
        if basis
            .iter()
            .any(|b| !b.is_deterministic() && b.num_paths() != num_paths)
        {
            return Err(MarginError::Regression(
                "basis functions have inconsistent path counts".to_string(),
            ));
        }

        let design = DMatrix::from_fn(num_paths, basis.len(), |i, j| basis[j].get(i));
        let svd = design.clone().svd(true, true);

        Ok(Self {
            time,
            num_paths,
            design,
            svd,
        })
    }

    /// Estimator for the trivial filtration: every value maps to its average.
    pub fn unconditional(time: f64) -> Self {
        let design = DMatrix::from_element(1, 1, 1.0);
        let svd = design.clone().svd(true, true);
        Self {
            time,
            num_paths: 1,
            design,
            svd,
        }
    }

    /// Number of basis functions.
    pub fn number_of_basis_functions(&self) -> usize {
        self.design.ncols()
    }

    /// Regression coefficients of `value` on the basis.
    pub fn coefficients(&self, value: &RandomVariable) -> Result<DVector<f64>, MarginError> {
        if !value.is_deterministic() && value.num_paths() != self.num_paths {
            return Err(MarginError::Regression(format!(
                "value has {} paths, estimator expects {}",
                value.num_paths(),
                self.num_paths
            )));
        }
        let rhs = DVector::from_fn(self.num_paths, |i, _| value.get(i));
        let max_singular = self.svd.singular_values.max();
        self.svd
            .solve(&rhs, SINGULAR_VALUE_EPS * max_singular.max(1.0))
            .map_err(|e| MarginError::Regression(e.to_string()))
    }
}

impl ConditionalExpectation for RegressionEstimator {
    fn time(&self) -> f64 {
        self.time
    }

    fn expectation(&self, value: &RandomVariable) -> Result<RandomVariable, MarginError> {
        if self.num_paths == 1 {
            return Ok(value.expectation());
        }
        if value.is_deterministic() {
            return Ok(value.clone());
        }
        let beta = self.coefficients(value)?;
        let fitted = &self.design * beta;
        Ok(RandomVariable::from_paths(fitted.iter().copied().collect()))
    }
}

impl std::fmt::Debug for RegressionEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegressionEstimator")
            .field("time", &self.time)
            .field("num_paths", &self.num_paths)
            .field("basis_functions", &self.design.ncols())
            .finish()
    }
}
