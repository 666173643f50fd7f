//! Path-wise Monte Carlo random variables.
//!
//! A [`RandomVariable`] holds one value per simulation path. A variable with a
//! single value is deterministic and broadcasts against any number of paths,
//! so `RandomVariable::deterministic(1.0) + paths` adds one to every path.
//!
//! Arithmetic is provided through the standard operator traits for owned and
//! borrowed operands and for `f64` scalars.
//!
//! # Panics
//!
//! Binary operations between two stochastic variables with different path
//! counts panic. Both operands always come from the same simulation, so a
//! mismatch is a programming error rather than a recoverable condition.

use std::ops::{Add, Div, Mul, Neg, Sub};

/// Path-wise values of a simulated quantity.
///
/// # Examples
///
/// ```
/// use simm_core::types::RandomVariable;
///
/// let x = RandomVariable::from_paths(vec![1.0, 3.0]);
/// let one = RandomVariable::deterministic(1.0);
///
/// let y = &x + &one;
/// assert_eq!(y.values(), &[2.0, 4.0]);
/// assert_eq!(y.average(), 3.0);
/// assert!(one.is_deterministic());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RandomVariable {
    values: Vec<f64>,
}

impl RandomVariable {
    /// Creates a deterministic variable (same value on every path).
    pub fn deterministic(value: f64) -> Self {
        Self {
            values: vec![value],
        }
    }

    /// Deterministic zero.
    pub fn zero() -> Self {
        Self::deterministic(0.0)
    }

    /// Deterministic one.
    pub fn one() -> Self {
        Self::deterministic(1.0)
    }

    /// Creates a variable from path values.
    ///
    /// An empty vector is treated as deterministic zero; a single value is
    /// deterministic.
    pub fn from_paths(values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::zero();
        }
        Self { values }
    }

    /// Number of stored values (1 for a deterministic variable).
    pub fn num_paths(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the variable carries a single value.
    pub fn is_deterministic(&self) -> bool {
        self.values.len() == 1
    }

    /// Raw path values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Consumes the variable and returns its path values.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Value on `path`, broadcasting deterministic variables.
    pub fn get(&self, path: usize) -> f64 {
        if self.is_deterministic() {
            self.values[0]
        } else {
            self.values[path]
        }
    }

    /// Monte Carlo expectation.
    pub fn average(&self) -> f64 {
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Sample variance (population form, as used for Monte Carlo error estimates).
    pub fn variance(&self) -> f64 {
        let mean = self.average();
        self.values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / self.values.len() as f64
    }

    /// Smallest path value.
    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Largest path value.
    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Returns true if every path value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.min() == 0.0 && self.max() == 0.0
    }

    /// Collapses the variable to its expectation.
    pub fn expectation(&self) -> Self {
        Self::deterministic(self.average())
    }

    /// Applies `f` path-wise.
    pub fn apply(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combines two variables path-wise with broadcasting.
    ///
    /// # Panics
    ///
    /// Panics if both variables are stochastic with different path counts.
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        match (self.is_deterministic(), other.is_deterministic()) {
            (true, true) => Self::deterministic(f(self.values[0], other.values[0])),
            (true, false) => {
                let a = self.values[0];
                Self {
                    values: other.values.iter().map(|&b| f(a, b)).collect(),
                }
            }
            (false, true) => {
                let b = other.values[0];
                Self {
                    values: self.values.iter().map(|&a| f(a, b)).collect(),
                }
            }
            (false, false) => {
                assert_eq!(
                    self.values.len(),
                    other.values.len(),
                    "path count mismatch"
                );
                Self {
                    values: self
                        .values
                        .iter()
                        .zip(other.values.iter())
                        .map(|(&a, &b)| f(a, b))
                        .collect(),
                }
            }
        }
    }

    /// Path-wise square.
    pub fn squared(&self) -> Self {
        self.apply(|v| v * v)
    }

    /// Path-wise reciprocal.
    pub fn invert(&self) -> Self {
        self.apply(|v| 1.0 / v)
    }

    /// Path-wise exponential.
    pub fn exp(&self) -> Self {
        self.apply(f64::exp)
    }

    /// Path-wise natural logarithm.
    pub fn ln(&self) -> Self {
        self.apply(f64::ln)
    }

    /// Path-wise square root.
    pub fn sqrt(&self) -> Self {
        self.apply(f64::sqrt)
    }

    /// Path-wise power.
    pub fn powi(&self, n: i32) -> Self {
        self.apply(|v| v.powi(n))
    }

    /// Path-wise maximum with a constant.
    pub fn floor_at(&self, floor: f64) -> Self {
        self.apply(|v| v.max(floor))
    }
}

impl Default for RandomVariable {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<f64> for RandomVariable {
    fn from(value: f64) -> Self {
        Self::deterministic(value)
    }
}

impl From<Vec<f64>> for RandomVariable {
    fn from(values: Vec<f64>) -> Self {
        Self::from_paths(values)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&RandomVariable> for &RandomVariable {
            type Output = RandomVariable;

            fn $method(self, rhs: &RandomVariable) -> RandomVariable {
                self.zip_with(rhs, |a, b| a $op b)
            }
        }

        impl $trait<RandomVariable> for RandomVariable {
            type Output = RandomVariable;

            fn $method(self, rhs: RandomVariable) -> RandomVariable {
                (&self).$method(&rhs)
            }
        }

        impl $trait<&RandomVariable> for RandomVariable {
            type Output = RandomVariable;

            fn $method(self, rhs: &RandomVariable) -> RandomVariable {
                (&self).$method(rhs)
            }
        }

        impl $trait<RandomVariable> for &RandomVariable {
            type Output = RandomVariable;

            fn $method(self, rhs: RandomVariable) -> RandomVariable {
                self.$method(&rhs)
            }
        }

        impl $trait<f64> for &RandomVariable {
            type Output = RandomVariable;

            fn $method(self, rhs: f64) -> RandomVariable {
                self.apply(|a| a $op rhs)
            }
        }

        impl $trait<f64> for RandomVariable {
            type Output = RandomVariable;

            fn $method(self, rhs: f64) -> RandomVariable {
                (&self).$method(rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, +);
impl_binary_op!(Sub, sub, -);
impl_binary_op!(Mul, mul, *);
impl_binary_op!(Div, div, /);

impl Neg for &RandomVariable {
    type Output = RandomVariable;

    fn neg(self) -> RandomVariable {
        self.apply(|v| -v)
    }
}

impl Neg for RandomVariable {
    type Output = RandomVariable;

    fn neg(self) -> RandomVariable {
        -&self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_empty_paths_are_zero() {
        let x = RandomVariable::from_paths(Vec::new());
        assert!(x.is_deterministic());
        assert!(x.is_zero());
    }

    #[test]
    fn test_broadcasting() {
        let x = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
        let two = RandomVariable::deterministic(2.0);

        assert_eq!((&x * &two).values(), &[2.0, 4.0, 6.0]);
        assert_eq!((&two - &x).values(), &[1.0, 0.0, -1.0]);
        assert_eq!((&x / 2.0).values(), &[0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_statistics() {
        let x = RandomVariable::from_paths(vec![-1.0, 0.0, 4.0]);
        assert_relative_eq!(x.average(), 1.0);
        assert_eq!(x.min(), -1.0);
        assert_eq!(x.max(), 4.0);
        assert!(!x.is_zero());
        assert_relative_eq!(x.variance(), (4.0 + 1.0 + 9.0) / 3.0);
    }

    #[test]
    fn test_expectation_collapses_paths() {
        let x = RandomVariable::from_paths(vec![1.0, 5.0]);
        let e = x.expectation();
        assert!(e.is_deterministic());
        assert_eq!(e.get(7), 3.0);
    }

    #[test]
    fn test_invert_and_squared() {
        let x = RandomVariable::from_paths(vec![2.0, 4.0]);
        assert_eq!(x.invert().values(), &[0.5, 0.25]);
        assert_eq!(x.squared().values(), &[4.0, 16.0]);
        assert_eq!((-x).values(), &[-2.0, -4.0]);
    }

    #[test]
    #[should_panic(expected = "path count mismatch")]
    fn test_mismatched_paths_panic() {
        let a = RandomVariable::from_paths(vec![1.0, 2.0]);
        let b = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
        let _ = a + b;
    }

    proptest! {
        #[test]
        fn prop_add_then_sub_is_identity(
            values in prop::collection::vec(-1e6f64..1e6, 1..64),
            shift in -1e3f64..1e3,
        ) {
            let x = RandomVariable::from_paths(values.clone());
            let y = (&x + shift) - shift;
            for (a, b) in y.values().iter().zip(values.iter()) {
                prop_assert!((a - b).abs() <= 1e-9 * (1.0 + b.abs()));
            }
        }
    }
}
