//! Sensitivity result types.
//!
//! [`SensitivityValue`] separates "no sensitivity exists" (a supported zero)
//! from "this risk type is not implemented" (`Unsupported`), so aggregation
//! never silently treats a missing implementation as zero risk.

use super::classification::{MaturityBucket, RiskClass, RiskType};
use crate::types::{MarginError, RandomVariable};

/// Result of a single sensitivity query.
///
/// # Examples
/// ```
/// use simm_core::simm::{RiskClass, RiskType, SensitivityValue};
/// use simm_core::types::RandomVariable;
///
/// let zero = SensitivityValue::zero();
/// assert!(zero.is_supported());
///
/// let missing = SensitivityValue::Unsupported;
/// assert!(missing.into_result(RiskClass::InterestRate, RiskType::Vega).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SensitivityValue {
    /// A computed sensitivity (possibly zero by construction).
    Supported(RandomVariable),
    /// The risk type / risk class combination is not implemented.
    Unsupported,
}

impl SensitivityValue {
    /// A supported, deterministic zero sensitivity.
    pub fn zero() -> Self {
        SensitivityValue::Supported(RandomVariable::zero())
    }

    /// Returns true for `Supported`.
    pub fn is_supported(&self) -> bool {
        matches!(self, SensitivityValue::Supported(_))
    }

    /// The value, if supported.
    pub fn value(&self) -> Option<&RandomVariable> {
        match self {
            SensitivityValue::Supported(value) => Some(value),
            SensitivityValue::Unsupported => None,
        }
    }

    /// Converts to a `Result`, reporting `Unsupported` as
    /// [`MarginError::UnsupportedSensitivity`].
    pub fn into_result(
        self,
        risk_class: RiskClass,
        risk_type: RiskType,
    ) -> Result<RandomVariable, MarginError> {
        match self {
            SensitivityValue::Supported(value) => Ok(value),
            SensitivityValue::Unsupported => Err(MarginError::UnsupportedSensitivity {
                risk_class: risk_class.to_string(),
                risk_type: risk_type.to_string(),
            }),
        }
    }
}

/// Path-wise sensitivities on the twelve interest-rate maturity buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketSensitivities {
    values: [RandomVariable; MaturityBucket::COUNT],
}

impl BucketSensitivities {
    /// All-zero buckets.
    ///
    /// Returned in place of an empty result when a curve carries no residual
    /// sensitivity.
    pub fn zero() -> Self {
        Self {
            values: std::array::from_fn(|_| RandomVariable::zero()),
        }
    }

    /// Creates buckets from a ladder-ordered vector.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::InvalidInput` unless exactly twelve values are given.
    pub fn from_vec(values: Vec<RandomVariable>) -> Result<Self, MarginError> {
        let len = values.len();
        let values: [RandomVariable; MaturityBucket::COUNT] =
            values.try_into().map_err(|_| {
                MarginError::InvalidInput(format!(
                    "expected {} bucket sensitivities, got {}",
                    MaturityBucket::COUNT,
                    len
                ))
            })?;
        Ok(Self { values })
    }

    /// Sensitivity of `bucket`.
    pub fn get(&self, bucket: MaturityBucket) -> &RandomVariable {
        &self.values[bucket.index()]
    }

    /// Mutable sensitivity of `bucket`.
    pub fn get_mut(&mut self, bucket: MaturityBucket) -> &mut RandomVariable {
        &mut self.values[bucket.index()]
    }

    /// Iterates `(bucket, sensitivity)` in ladder order.
    pub fn iter(&self) -> impl Iterator<Item = (MaturityBucket, &RandomVariable)> {
        MaturityBucket::ALL.into_iter().zip(self.values.iter())
    }

    /// Ladder-ordered values.
    pub fn as_slice(&self) -> &[RandomVariable] {
        &self.values
    }

    /// Returns true if every bucket is exactly zero on every path.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(RandomVariable::is_zero)
    }

    /// Sum over all buckets (parallel-shift sensitivity).
    pub fn total(&self) -> RandomVariable {
        self.values
            .iter()
            .fold(RandomVariable::zero(), |acc, v| &acc + v)
    }
}

impl Default for BucketSensitivities {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_buckets() {
        let zero = BucketSensitivities::zero();
        assert!(zero.is_zero());
        assert_eq!(zero.iter().count(), 12);
    }

    #[test]
    fn test_from_vec_requires_twelve() {
        assert!(BucketSensitivities::from_vec(vec![RandomVariable::one(); 11]).is_err());

        let values: Vec<_> = (0..12).map(|i| RandomVariable::deterministic(i as f64)).collect();
        let buckets = BucketSensitivities::from_vec(values).unwrap();
        assert_eq!(buckets.get(MaturityBucket::Y5).get(0), 7.0);
        assert_eq!(buckets.total().get(0), 66.0);
    }

    #[test]
    fn test_supported_zero_is_not_unsupported() {
        let zero = SensitivityValue::zero();
        assert_eq!(zero.value().map(|v| v.is_zero()), Some(true));

        let err = SensitivityValue::Unsupported
            .into_result(RiskClass::CreditQ, RiskType::Delta)
            .unwrap_err();
        assert!(matches!(err, MarginError::UnsupportedSensitivity { .. }));
    }
}
