//! Mapping of pivot sensitivities onto the SIMM maturity ladder.
//!
//! A sensitivity at residual maturity `m` between two ladder points
//! `B_k <= m < B_{k+1}` is split linearly:
//!
//! ```text
//! w_k     = (B_{k+1} - m) / (B_{k+1} - B_k)
//! w_{k+1} = 1 - w_k
//! ```
//!
//! Maturities below 2w go entirely to 2w, beyond 30y entirely to 30y.

use simm_core::simm::{BucketSensitivities, MaturityBucket};
use simm_core::types::{MarginError, RandomVariable};

/// Splits each `(maturity, sensitivity)` pair onto the two neighbouring
/// ladder buckets.
///
/// # Errors
///
/// Returns `MarginError::InvalidInput` if the slices differ in length or a
/// maturity is not finite.
pub fn map_to_ladder(
    maturities: &[f64],
    sensitivities: &[RandomVariable],
) -> Result<BucketSensitivities, MarginError> {
    if maturities.len() != sensitivities.len() {
        return Err(MarginError::InvalidInput(format!(
            "{} maturities for {} sensitivities",
            maturities.len(),
            sensitivities.len()
        )));
    }

    let mut buckets = BucketSensitivities::zero();
    for (&maturity, sensitivity) in maturities.iter().zip(sensitivities) {
        if !maturity.is_finite() {
            return Err(MarginError::InvalidInput(format!(
                "non-finite maturity {}",
                maturity
            )));
        }
        if sensitivity.is_zero() {
            continue;
        }
        for (bucket, weight) in ladder_weights(maturity) {
            let slot = buckets.get_mut(bucket);
            *slot = &*slot + &(sensitivity * weight);
        }
    }
    Ok(buckets)
}

/// Ladder buckets receiving a share of a sensitivity at `maturity`.
fn ladder_weights(maturity: f64) -> Vec<(MaturityBucket, f64)> {
    let first = MaturityBucket::ALL[0];
    let last = MaturityBucket::ALL[MaturityBucket::COUNT - 1];

    if maturity <= first.years() {
        return vec![(first, 1.0)];
    }
    if maturity >= last.years() {
        return vec![(last, 1.0)];
    }

    MaturityBucket::ALL
        .windows(2)
        .find(|pair| maturity < pair[1].years())
        .map(|pair| {
            let (lower, upper) = (pair[0], pair[1]);
            let w = (upper.years() - maturity) / (upper.years() - lower.years());
            vec![(lower, w), (upper, 1.0 - w)]
        })
        .unwrap_or_else(|| vec![(last, 1.0)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_on_ladder_point() {
        let buckets = map_to_ladder(&[5.0], &[RandomVariable::deterministic(10.0)]).unwrap();
        assert_relative_eq!(buckets.get(MaturityBucket::Y5).get(0), 10.0, epsilon = 1e-12);
        assert_relative_eq!(buckets.get(MaturityBucket::Y10).get(0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_between_ladder_points() {
        let buckets = map_to_ladder(&[4.0], &[RandomVariable::deterministic(10.0)]).unwrap();
        assert_relative_eq!(buckets.get(MaturityBucket::Y3).get(0), 5.0, epsilon = 1e-12);
        assert_relative_eq!(buckets.get(MaturityBucket::Y5).get(0), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_outside_ladder_goes_to_ends() {
        let values = vec![RandomVariable::deterministic(1.0), RandomVariable::deterministic(2.0)];
        let buckets = map_to_ladder(&[0.0, 45.0], &values).unwrap();
        assert_relative_eq!(buckets.get(MaturityBucket::W2).get(0), 1.0);
        assert_relative_eq!(buckets.get(MaturityBucket::Y30).get(0), 2.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(map_to_ladder(&[1.0, 2.0], &[RandomVariable::one()]).is_err());
    }

    #[test]
    fn test_stochastic_sensitivities_keep_paths() {
        let values = vec![RandomVariable::from_paths(vec![1.0, 3.0])];
        let buckets = map_to_ladder(&[1.5], &values).unwrap();
        let y1 = buckets.get(MaturityBucket::Y1);
        assert_eq!(y1.num_paths(), 2);
        assert_relative_eq!(y1.get(1), 1.5, epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn prop_total_is_preserved(
            maturities in prop::collection::vec(0.0f64..40.0, 1..20),
            scale in -100.0f64..100.0,
        ) {
            let values: Vec<RandomVariable> = maturities
                .iter()
                .enumerate()
                .map(|(i, _)| RandomVariable::deterministic(scale * (i as f64 + 1.0)))
                .collect();
            let expected: f64 = values.iter().map(|v| v.get(0)).sum();
            let buckets = map_to_ladder(&maturities, &values).unwrap();
            prop_assert!((buckets.total().get(0) - expected).abs() < 1e-8 * (1.0 + expected.abs()));
        }
    }
}
