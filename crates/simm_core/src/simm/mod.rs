//! ISDA SIMM classification and sensitivity result types.
//!
//! - [`classification`]: product classes, risk classes, risk types, the
//!   interest-rate maturity bucket ladder and curve indices
//! - [`sensitivity`]: tagged sensitivity results and bucket vectors

pub mod classification;
pub mod sensitivity;

pub use classification::{CurveIndex, MaturityBucket, ProductClass, RiskClass, RiskType};
pub use sensitivity::{BucketSensitivities, SensitivityValue};
