//! Time grids and hashable time keys.
//!
//! This module provides:
//! - [`TimeDiscretization`]: a strictly increasing grid of year fractions used
//!   for simulation times and forward-rate tenors
//! - [`TimeKey`]: an `f64` wrapper with `Eq`, `Ord` and `Hash` for use as a
//!   map key (evaluation times, discount times)

use super::error::MarginError;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance used when matching a time against grid points.
pub const TIME_TOLERANCE: f64 = 1e-10;

/// A time in year fractions usable as a map key.
///
/// Equality and hashing use the bit pattern (with `-0.0` normalised to
/// `0.0`), so two keys are equal exactly when the times are bit-identical.
/// Ordering uses `f64::total_cmp`.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeKey(f64);

impl TimeKey {
    /// Creates a key from a time.
    pub fn new(time: f64) -> Self {
        // Normalise negative zero so that 0.0 and -0.0 collide.
        Self(if time == 0.0 { 0.0 } else { time })
    }

    /// The wrapped time.
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for TimeKey {
    fn from(time: f64) -> Self {
        Self::new(time)
    }
}

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for TimeKey {}

impl Hash for TimeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Hash as bits to avoid floating point issues
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strictly increasing grid of times.
///
/// # Examples
///
/// ```
/// use simm_core::types::TimeDiscretization;
///
/// let tenor = TimeDiscretization::uniform(0.0, 20, 0.5).unwrap();
/// assert_eq!(tenor.len(), 21);
/// assert_eq!(tenor.index_of(2.5), Some(5));
/// assert_eq!(tenor.index_nearest_less_or_equal(2.7), Some(5));
/// assert_eq!(tenor.index_nearest_greater_or_equal(2.7), Some(6));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDiscretization {
    times: Vec<f64>,
}

impl TimeDiscretization {
    /// Creates a grid from explicit times.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::InvalidTimeDiscretization` if `times` is empty,
    /// contains non-finite values or is not strictly increasing.
    pub fn new(times: Vec<f64>) -> Result<Self, MarginError> {
        if times.is_empty() {
            return Err(MarginError::InvalidTimeDiscretization(
                "time grid must not be empty".to_string(),
            ));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(MarginError::InvalidTimeDiscretization(
                "time grid contains non-finite values".to_string(),
            ));
        }
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(MarginError::InvalidTimeDiscretization(
                "time grid must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { times })
    }

    /// Creates the grid `start, start + dt, ..., start + n_steps * dt`.
    pub fn uniform(start: f64, n_steps: usize, dt: f64) -> Result<Self, MarginError> {
        if !(dt > 0.0) {
            return Err(MarginError::InvalidTimeDiscretization(format!(
                "time step must be positive, got {}",
                dt
            )));
        }
        Self::new((0..=n_steps).map(|i| start + i as f64 * dt).collect())
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// Always false: a discretization holds at least one time.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Number of intervals between grid points.
    pub fn number_of_time_steps(&self) -> usize {
        self.times.len() - 1
    }

    /// All grid times.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Time at `index`.
    pub fn time(&self, index: usize) -> Option<f64> {
        self.times.get(index).copied()
    }

    /// Length of the interval starting at `index`.
    pub fn time_step(&self, index: usize) -> Option<f64> {
        Some(self.time(index + 1)? - self.time(index)?)
    }

    /// First grid time.
    pub fn first(&self) -> f64 {
        self.times[0]
    }

    /// Last grid time.
    pub fn last(&self) -> f64 {
        self.times[self.times.len() - 1]
    }

    /// Index of the grid point equal to `time` (within [`TIME_TOLERANCE`]).
    pub fn index_of(&self, time: f64) -> Option<usize> {
        let i = self.index_nearest_less_or_equal(time)?;
        if (self.times[i] - time).abs() <= TIME_TOLERANCE {
            Some(i)
        } else {
            None
        }
    }

    /// Index of the largest grid time not after `time`.
    ///
    /// Returns `None` if `time` precedes the first grid point.
    pub fn index_nearest_less_or_equal(&self, time: f64) -> Option<usize> {
        let count = self
            .times
            .partition_point(|&t| t <= time + TIME_TOLERANCE);
        count.checked_sub(1)
    }

    /// Index of the smallest grid time not before `time`.
    ///
    /// Returns `None` if `time` lies after the last grid point.
    pub fn index_nearest_greater_or_equal(&self, time: f64) -> Option<usize> {
        let index = self
            .times
            .partition_point(|&t| t < time - TIME_TOLERANCE);
        if index < self.times.len() {
            Some(index)
        } else {
            None
        }
    }
}
