//! SIMM sensitivity schemes.
//!
//! A [`SensitivityScheme`] turns exact pivot sensitivities into the 12-bucket
//! interest-rate vector for one curve at one evaluation time. It draws the
//! exact sensitivities from an [`ExactDeltaSource`] (the engine) so that
//! schemes approximating later times from earlier ones reuse the persistent
//! cache.
//!
//! # Modes
//!
//! | Mode | Bucket vector at `t` |
//! |------|----------------------|
//! | `Exact` | exact sensitivities at `t` |
//! | `Melting` | time-0 sensitivities with maturities rolled down by `t` |
//! | `Interpolation` | linear in time between exact vectors on a coarse grid |

use crate::ladder::map_to_ladder;
use crate::projector::discount_pivot_maturities;
use simm_core::simm::{BucketSensitivities, CurveIndex, MaturityBucket, RiskClass};
use simm_core::types::time::TIME_TOLERANCE;
use simm_core::types::{MarginError, RandomVariable};
use simm_models::TermStructureModel;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How bucket sensitivities at later times are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SensitivityMode {
    /// Full projection at every evaluation time.
    #[default]
    Exact,
    /// Roll the time-0 sensitivities forward.
    Melting,
    /// Interpolate between exact sensitivities on a coarse time grid.
    Interpolation,
}

/// Weighting applied to approximated sensitivities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WeightMode {
    /// No weighting.
    #[default]
    Constant,
    /// Melted sensitivities are scaled by the remaining fraction of the
    /// product's life.
    TimeDependent,
}

impl FromStr for SensitivityMode {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(SensitivityMode::Exact),
            "melting" => Ok(SensitivityMode::Melting),
            "interpolation" => Ok(SensitivityMode::Interpolation),
            _ => Err(MarginError::InvalidInput(format!(
                "unknown sensitivity mode: {}",
                s
            ))),
        }
    }
}

impl FromStr for WeightMode {
    type Err = MarginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "constant" => Ok(WeightMode::Constant),
            "time_dependent" | "timedependent" => Ok(WeightMode::TimeDependent),
            _ => Err(MarginError::InvalidInput(format!("unknown weight mode: {}", s))),
        }
    }
}

/// Coordinates of exact sensitivities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeltaKind {
    /// Derivatives with respect to model quantities (`dV/dL`, `dV/dP`).
    Model,
    /// Derivatives with respect to market rates on the pivot grid.
    MarketRate,
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaKind::Model => write!(f, "model"),
            DeltaKind::MarketRate => write!(f, "market_rate"),
        }
    }
}

/// One bucket-vector request.
#[derive(Debug, Clone, Copy)]
pub struct BucketRequest<'a> {
    /// Risk class of the request.
    pub risk_class: RiskClass,
    /// Curve of the request.
    pub curve: &'a CurveIndex,
    /// Evaluation time.
    pub evaluation_time: f64,
    /// Final maturity of the product.
    pub final_maturity: f64,
}

/// Access to exact pivot sensitivities and the projection machinery.
pub trait ExactDeltaSource {
    /// Exact pivot sensitivities at `time`, served from the persistent cache
    /// when available.
    fn exact_delta(
        &mut self,
        time: f64,
        risk_class: RiskClass,
        curve: &CurveIndex,
        kind: DeltaKind,
    ) -> Result<Vec<RandomVariable>, MarginError>;

    /// Residual maturities matching [`exact_delta`](Self::exact_delta) at `time`.
    fn pivot_maturities(&self, time: f64, curve: &CurveIndex) -> Result<Vec<f64>, MarginError>;

    /// Conditional expectation of `value` given the information at `time`.
    fn conditional_expectation(
        &mut self,
        time: f64,
        value: &RandomVariable,
    ) -> Result<RandomVariable, MarginError>;
}

/// Pluggable mapping from exact sensitivities to SIMM buckets.
pub trait SensitivityScheme: Send + Sync + fmt::Debug {
    /// Mode the scheme was built with.
    fn sensitivity_mode(&self) -> SensitivityMode;

    /// Weighting the scheme was built with.
    fn weight_mode(&self) -> WeightMode;

    /// Bucket vector for one curve at the request's evaluation time.
    fn bucket_sensitivities(
        &self,
        request: &BucketRequest<'_>,
        source: &mut dyn ExactDeltaSource,
    ) -> Result<BucketSensitivities, MarginError>;

    /// Converts model sensitivities on `curve` at `evaluation_time` into
    /// market-rate sensitivities on the same pivots.
    fn market_rate_sensitivities(
        &self,
        curve: &CurveIndex,
        evaluation_time: f64,
        model_sensitivities: &[RandomVariable],
        model: &dyn TermStructureModel,
    ) -> Result<Vec<RandomVariable>, MarginError>;
}

/// Default scheme: linear split of pivot sensitivities onto the ladder.
///
/// Discount pivots are converted to zero-rate sensitivities,
/// `dV/dr = -dV/dP · m · P` with `P = exp(-r m)`. Forward-rate
/// sensitivities are used as they are.
///
/// # Examples
///
/// ```
/// use simm_sensitivity::{LadderSensitivityScheme, SensitivityMode, SensitivityScheme, WeightMode};
///
/// let scheme = LadderSensitivityScheme::new(SensitivityMode::Melting)
///     .with_weight_mode(WeightMode::TimeDependent)
///     .with_ois_sensitivities(false);
/// assert_eq!(scheme.sensitivity_mode(), SensitivityMode::Melting);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LadderSensitivityScheme {
    mode: SensitivityMode,
    weight_mode: WeightMode,
    interpolation_step: f64,
    consider_ois_sensitivities: bool,
}

impl Default for LadderSensitivityScheme {
    fn default() -> Self {
        Self::new(SensitivityMode::Exact)
    }
}

impl LadderSensitivityScheme {
    /// Creates a scheme in `mode` with constant weights, a one-year
    /// interpolation grid and OIS sensitivities enabled.
    pub fn new(mode: SensitivityMode) -> Self {
        Self {
            mode,
            weight_mode: WeightMode::Constant,
            interpolation_step: 1.0,
            consider_ois_sensitivities: true,
        }
    }

    /// Sets the weighting.
    pub fn with_weight_mode(mut self, weight_mode: WeightMode) -> Self {
        self.weight_mode = weight_mode;
        self
    }

    /// Sets the grid spacing used in `Interpolation` mode.
    pub fn with_interpolation_step(mut self, step: f64) -> Self {
        self.interpolation_step = step;
        self
    }

    /// Enables or disables discount-curve sensitivities.
    pub fn with_ois_sensitivities(mut self, consider: bool) -> Self {
        self.consider_ois_sensitivities = consider;
        self
    }

    /// Grid spacing used in `Interpolation` mode.
    pub fn interpolation_step(&self) -> f64 {
        self.interpolation_step
    }

    /// Whether discount-curve sensitivities are reported.
    pub fn considers_ois_sensitivities(&self) -> bool {
        self.consider_ois_sensitivities
    }

    fn exact_buckets(
        &self,
        time: f64,
        request: &BucketRequest<'_>,
        source: &mut dyn ExactDeltaSource,
    ) -> Result<BucketSensitivities, MarginError> {
        let sensitivities =
            source.exact_delta(time, request.risk_class, request.curve, DeltaKind::MarketRate)?;
        let maturities = source.pivot_maturities(time, request.curve)?;
        map_to_ladder(&maturities, &sensitivities)
    }

    fn melted_buckets(
        &self,
        request: &BucketRequest<'_>,
        source: &mut dyn ExactDeltaSource,
    ) -> Result<BucketSensitivities, MarginError> {
        let t = request.evaluation_time;
        let sensitivities =
            source.exact_delta(0.0, request.risk_class, request.curve, DeltaKind::MarketRate)?;
        let maturities = source.pivot_maturities(0.0, request.curve)?;

        let weight = match self.weight_mode {
            WeightMode::Constant => 1.0,
            WeightMode::TimeDependent if request.final_maturity > 0.0 => {
                ((request.final_maturity - t) / request.final_maturity).max(0.0)
            }
            WeightMode::TimeDependent => 0.0,
        };

        let (rolled, kept): (Vec<f64>, Vec<RandomVariable>) = maturities
            .iter()
            .zip(sensitivities)
            .filter(|(m, _)| **m - t > -TIME_TOLERANCE)
            .map(|(m, s)| ((m - t).max(0.0), &s * weight))
            .unzip();

        map_to_ladder(&rolled, &kept)
    }

    fn interpolated_buckets(
        &self,
        request: &BucketRequest<'_>,
        source: &mut dyn ExactDeltaSource,
    ) -> Result<BucketSensitivities, MarginError> {
        let t = request.evaluation_time;
        let step = self.interpolation_step;
        let lower = ((t + TIME_TOLERANCE) / step).floor() * step;
        if (t - lower).abs() <= TIME_TOLERANCE {
            return self.exact_buckets(t, request, source);
        }

        let upper = lower + step;
        let lambda = (t - lower) / step;
        let at_lower = self.exact_buckets(lower, request, source)?;
        let at_upper = if upper >= request.final_maturity - TIME_TOLERANCE {
            BucketSensitivities::zero()
        } else {
            self.exact_buckets(upper, request, source)?
        };

        let mut values = Vec::with_capacity(MaturityBucket::COUNT);
        for (bucket, lower_value) in at_lower.iter() {
            let projected = source.conditional_expectation(t, at_upper.get(bucket))?;
            values.push(&(lower_value * (1.0 - lambda)) + &(&projected * lambda));
        }
        BucketSensitivities::from_vec(values)
    }
}

impl SensitivityScheme for LadderSensitivityScheme {
    fn sensitivity_mode(&self) -> SensitivityMode {
        self.mode
    }

    fn weight_mode(&self) -> WeightMode {
        self.weight_mode
    }

    fn bucket_sensitivities(
        &self,
        request: &BucketRequest<'_>,
        source: &mut dyn ExactDeltaSource,
    ) -> Result<BucketSensitivities, MarginError> {
        if request.curve.is_discount() && !self.consider_ois_sensitivities {
            return Ok(BucketSensitivities::zero());
        }
        match self.mode {
            SensitivityMode::Exact => self.exact_buckets(request.evaluation_time, request, source),
            SensitivityMode::Melting => self.melted_buckets(request, source),
            SensitivityMode::Interpolation => self.interpolated_buckets(request, source),
        }
    }

    fn market_rate_sensitivities(
        &self,
        curve: &CurveIndex,
        evaluation_time: f64,
        model_sensitivities: &[RandomVariable],
        model: &dyn TermStructureModel,
    ) -> Result<Vec<RandomVariable>, MarginError> {
        if !curve.is_discount() {
            return Ok(model_sensitivities.to_vec());
        }

        let maturities = discount_pivot_maturities(evaluation_time, model)?;
        if maturities.len() != model_sensitivities.len() {
            return Err(MarginError::InvalidInput(format!(
                "{} discount pivots for {} sensitivities",
                maturities.len(),
                model_sensitivities.len()
            )));
        }

        maturities
            .iter()
            .zip(model_sensitivities)
            .map(|(&m, dv_dp)| {
                let bond = model.forward_bond_ois(evaluation_time + m, evaluation_time)?;
                Ok(-(&(dv_dp * &bond) * m))
            })
            .collect()
    }
}
