//! Error types for structured error handling.
//!
//! This module provides `MarginError`, the single error type propagated by
//! valuation, sensitivity projection, caching and margin aggregation.

use thiserror::Error;

/// Categorised margin computation errors.
///
/// Absent cache keys are never an error: they trigger computation.
/// No variant is retried locally; every failure propagates to the caller
/// requesting the margin.
///
/// # Examples
/// ```
/// use simm_core::types::MarginError;
///
/// let err = MarginError::ValuationFailure("negative variance".to_string());
/// assert_eq!(format!("{}", err), "Valuation failure: negative variance");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarginError {
    /// The stochastic valuation of the product could not be computed.
    #[error("Valuation failure: {0}")]
    ValuationFailure(String),

    /// A risk type / risk class combination has no sensitivity implementation.
    #[error("Unsupported sensitivity: {risk_type} for risk class {risk_class}")]
    UnsupportedSensitivity {
        /// Risk class name (e.g. `INTEREST_RATE`)
        risk_class: String,
        /// Risk type name (e.g. `vega`)
        risk_type: String,
    },

    /// The conditional expectation estimator failed.
    #[error("Regression failure: {0}")]
    Regression(String),

    /// Invalid input data or parameters.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Time grid is empty, unsorted or contains non-finite values.
    #[error("Invalid time discretization: {0}")]
    InvalidTimeDiscretization(String),
}

impl MarginError {
    /// Returns true for failures of the underlying stochastic valuation.
    pub fn is_valuation_failure(&self) -> bool {
        matches!(self, MarginError::ValuationFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display() {
        let err = MarginError::UnsupportedSensitivity {
            risk_class: "INTEREST_RATE".to_string(),
            risk_type: "vega".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported sensitivity: vega for risk class INTEREST_RATE"
        );
        assert!(!err.is_valuation_failure());
    }

    #[test]
    fn test_valuation_failure_flag() {
        let err = MarginError::ValuationFailure("boom".into());
        assert!(err.is_valuation_failure());
    }
}
