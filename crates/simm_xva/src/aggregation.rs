//! Margin aggregation seam.
//!
//! An aggregation turns the single-bucket sensitivities served by a
//! [`SensitivitySource`] into an initial margin. The SIMM risk-weight and
//! correlation schedule lives behind this trait; [`IrDeltaAggregation`] is a
//! reference implementation of the interest-rate delta margin with
//! caller-supplied parameters.
//!
//! ## Interest-rate delta margin
//!
//! ```text
//! WS_{c,k} = RW_k · s_{c,k} · scale
//! K        = sqrt( max( Σ_{c,k} Σ_{d,l} ρ_{kl} φ_{cd} WS_{c,k} WS_{d,l}, 0 ) )
//! ```
//!
//! with `c, d` the product's curves, `k, l` the twelve maturity buckets,
//! `ρ` the tenor correlation and `φ` the sub-curve correlation (1 on the
//! diagonal). `K` is evaluated path by path.

use simm_core::simm::{CurveIndex, MaturityBucket, RiskClass, RiskType};
use simm_core::types::{Currency, MarginError, RandomVariable};
use simm_sensitivity::{SensitivityQuery, SensitivitySource};
use std::fmt;
use tracing::trace;

/// Initial margin from bucketed sensitivities.
pub trait MarginAggregation: Send + Sync + fmt::Debug {
    /// Path-wise initial margin of the product behind `source` at
    /// `evaluation_time`, in `calculation_currency`.
    fn initial_margin(
        &self,
        evaluation_time: f64,
        calculation_currency: &Currency,
        source: &mut dyn SensitivitySource,
    ) -> Result<RandomVariable, MarginError>;
}

/// Parameters of [`IrDeltaAggregation`].
#[derive(Debug, Clone, PartialEq)]
pub struct IrDeltaParameters {
    risk_weights: [f64; MaturityBucket::COUNT],
    tenor_correlation: [[f64; MaturityBucket::COUNT]; MaturityBucket::COUNT],
    sub_curve_correlation: f64,
    scale: f64,
}

impl IrDeltaParameters {
    /// Creates parameters from per-bucket risk weights and a tenor
    /// correlation matrix.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the matrix is not symmetric, has a
    /// non-unit diagonal or has entries outside `[-1, 1]`.
    pub fn new(
        risk_weights: [f64; MaturityBucket::COUNT],
        tenor_correlation: [[f64; MaturityBucket::COUNT]; MaturityBucket::COUNT],
    ) -> Result<Self, MarginError> {
        for k in 0..MaturityBucket::COUNT {
            if (tenor_correlation[k][k] - 1.0).abs() > 1e-12 {
                return Err(MarginError::InvalidInput(format!(
                    "tenor correlation diagonal at {} is {}",
                    k, tenor_correlation[k][k]
                )));
            }
            for l in 0..k {
                let rho = tenor_correlation[k][l];
                if (rho - tenor_correlation[l][k]).abs() > 1e-12 || !(-1.0..=1.0).contains(&rho) {
                    return Err(MarginError::InvalidInput(format!(
                        "invalid tenor correlation at ({}, {}): {}",
                        k, l, rho
                    )));
                }
            }
        }
        Ok(Self {
            risk_weights,
            tenor_correlation,
            sub_curve_correlation: 1.0,
            scale: 1.0,
        })
    }

    /// Flat risk weight with tenor correlation
    /// `ρ_{kl} = exp(-decay · |ln(t_k / t_l)|)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use simm_xva::aggregation::IrDeltaParameters;
    ///
    /// let params = IrDeltaParameters::flat(50.0, 0.5).unwrap();
    /// assert_eq!(params.risk_weights()[0], 50.0);
    /// ```
    pub fn flat(risk_weight: f64, decay: f64) -> Result<Self, MarginError> {
        if decay < 0.0 || !decay.is_finite() {
            return Err(MarginError::InvalidInput(format!(
                "correlation decay must be non-negative, got {}",
                decay
            )));
        }
        let mut correlation = [[0.0; MaturityBucket::COUNT]; MaturityBucket::COUNT];
        for (k, bk) in MaturityBucket::ALL.iter().enumerate() {
            for (l, bl) in MaturityBucket::ALL.iter().enumerate() {
                correlation[k][l] = (-decay * (bk.years() / bl.years()).ln().abs()).exp();
            }
        }
        Self::new([risk_weight; MaturityBucket::COUNT], correlation)
    }

    /// Sets the correlation between different curves of one currency.
    pub fn with_sub_curve_correlation(mut self, correlation: f64) -> Self {
        self.sub_curve_correlation = correlation;
        self
    }

    /// Sets a factor applied to every sensitivity before weighting, for
    /// example the size of a basis-point shift.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Risk weight per maturity bucket.
    pub fn risk_weights(&self) -> &[f64; MaturityBucket::COUNT] {
        &self.risk_weights
    }

    /// Tenor correlation between two buckets.
    pub fn tenor_correlation(&self, k: MaturityBucket, l: MaturityBucket) -> f64 {
        self.tenor_correlation[k.index()][l.index()]
    }

    /// Correlation between different curves.
    pub fn sub_curve_correlation(&self) -> f64 {
        self.sub_curve_correlation
    }
}

/// Interest-rate delta margin of a single-currency product.
///
/// Queries every curve and bucket of the product. Delta in any other risk
/// class the product carries is queried as well so that an `Unsupported`
/// answer fails the margin instead of being dropped.
///
/// Vega and curvature of optional products are checked the same way by
/// default. The sensitivity engine serves neither, so the margin of any
/// product with optionality fails with `UnsupportedSensitivity` unless the
/// check is switched off with [`IrDeltaAggregation::with_option_risk_check`],
/// in which case the margin covers delta only.
#[derive(Debug, Clone)]
pub struct IrDeltaAggregation {
    parameters: IrDeltaParameters,
    check_option_risk: bool,
}

impl IrDeltaAggregation {
    /// Creates the aggregation.
    pub fn new(parameters: IrDeltaParameters) -> Self {
        Self {
            parameters,
            check_option_risk: true,
        }
    }

    /// Whether vega and curvature of optional products are queried.
    pub fn with_option_risk_check(mut self, enabled: bool) -> Self {
        self.check_option_risk = enabled;
        self
    }

    /// The parameters.
    pub fn parameters(&self) -> &IrDeltaParameters {
        &self.parameters
    }

    fn weighted_sensitivities(
        &self,
        evaluation_time: f64,
        source: &mut dyn SensitivitySource,
    ) -> Result<Vec<Vec<RandomVariable>>, MarginError> {
        let classification = source.classification().clone();
        let bucket_key = classification.effective_bucket_key().to_string();

        let mut weighted = Vec::with_capacity(classification.curve_indices().len());
        for curve in classification.curve_indices() {
            let mut row = Vec::with_capacity(MaturityBucket::COUNT);
            for bucket in MaturityBucket::ALL {
                let mut query =
                    SensitivityQuery::ir_delta(curve.clone(), bucket, bucket_key.clone(), evaluation_time);
                query.product_class = classification.product_class();
                let sensitivity = source
                    .get_sensitivity(&query)?
                    .into_result(RiskClass::InterestRate, RiskType::Delta)?;
                let weight = self.parameters.risk_weights[bucket.index()] * self.parameters.scale;
                row.push(sensitivity * weight);
            }
            weighted.push(row);
        }

        if self.check_option_risk && classification.has_optionality() {
            for risk_type in [RiskType::Vega, RiskType::Curvature] {
                for curve in classification.curve_indices() {
                    let mut query = SensitivityQuery::ir_delta(
                        curve.clone(),
                        MaturityBucket::ALL[0],
                        bucket_key.clone(),
                        evaluation_time,
                    )
                    .with_risk_type(risk_type);
                    query.product_class = classification.product_class();
                    source
                        .get_sensitivity(&query)?
                        .into_result(RiskClass::InterestRate, risk_type)?;
                }
            }
        }

        Ok(weighted)
    }
}

impl MarginAggregation for IrDeltaAggregation {
    fn initial_margin(
        &self,
        evaluation_time: f64,
        calculation_currency: &Currency,
        source: &mut dyn SensitivitySource,
    ) -> Result<RandomVariable, MarginError> {
        let classification = source.classification().clone();
        if classification.currency() != calculation_currency {
            return Err(MarginError::InvalidInput(format!(
                "product currency {} differs from calculation currency {}",
                classification.currency(),
                calculation_currency
            )));
        }

        for &risk_class in classification.risk_classes() {
            if risk_class == RiskClass::InterestRate {
                continue;
            }
            let mut query = SensitivityQuery::ir_delta(
                classification
                    .curve_indices()
                    .first()
                    .cloned()
                    .unwrap_or(CurveIndex::Ois),
                MaturityBucket::ALL[0],
                classification.effective_bucket_key(),
                evaluation_time,
            );
            query.product_class = classification.product_class();
            query.risk_class = risk_class;
            source
                .get_sensitivity(&query)?
                .into_result(risk_class, RiskType::Delta)?;
        }

        if !classification.has_risk_class(RiskClass::InterestRate) {
            return Ok(RandomVariable::zero());
        }

        let weighted = self.weighted_sensitivities(evaluation_time, source)?;
        let mut variance = RandomVariable::zero();
        for (c, row_c) in weighted.iter().enumerate() {
            for (d, row_d) in weighted.iter().enumerate() {
                let phi = if c == d {
                    1.0
                } else {
                    self.parameters.sub_curve_correlation
                };
                for (k, ws_k) in row_c.iter().enumerate() {
                    for (l, ws_l) in row_d.iter().enumerate() {
                        let rho = self.parameters.tenor_correlation[k][l] * phi;
                        if rho == 0.0 {
                            continue;
                        }
                        variance = variance + ws_k * ws_l * rho;
                    }
                }
            }
        }

        let margin = variance.floor_at(0.0).sqrt();
        trace!(evaluation_time, expected = margin.average(), "aggregated IR delta margin");
        Ok(margin)
    }
}
