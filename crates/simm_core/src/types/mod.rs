//! Core value types shared by every layer.
//!
//! - [`RandomVariable`]: path-wise Monte Carlo values with broadcasting arithmetic
//! - [`TimeDiscretization`] and [`TimeKey`]: simulation and tenor grids
//! - [`Currency`]: ISO currency code used as the SIMM interest-rate bucket key
//! - [`MarginError`]: error type for margin and sensitivity computations

pub mod currency;
pub mod error;
pub mod random_variable;
pub mod time;

pub use currency::Currency;
pub use error::MarginError;
pub use random_variable::RandomVariable;
pub use time::{TimeDiscretization, TimeKey, TIME_TOLERANCE};
