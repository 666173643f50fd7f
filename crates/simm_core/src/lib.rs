//! # simm_core: Foundation Types for SIMM Margin and MVA
//!
//! ## Layer 1 (Foundation) Role
//!
//! simm_core is the bottom layer of the 4-layer architecture, providing:
//! - Path-wise Monte Carlo values: `RandomVariable` (`types::random_variable`)
//! - Time grids: `TimeDiscretization`, `TimeKey` (`types::time`)
//! - Currency codes: `Currency` (`types::currency`)
//! - Error types: `MarginError` (`types::error`)
//! - SIMM classification: `ProductClass`, `RiskClass`, `RiskType`,
//!   `MaturityBucket`, `CurveIndex` (`simm::classification`)
//! - Sensitivity results: `SensitivityValue`, `BucketSensitivities`
//!   (`simm::sensitivity`)
//!
//! ## Zero Dependency Principle
//!
//! Layer 1 has no dependencies on other simm_* crates, with minimal external dependencies:
//! - thiserror: Error derivation
//! - serde: Serialisation support (optional)
//!
//! ## Usage Examples
//!
//! ```rust
//! use simm_core::types::{RandomVariable, TimeDiscretization};
//! use simm_core::simm::MaturityBucket;
//!
//! let x = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
//! let y = &x * 2.0;
//! assert_eq!(y.average(), 4.0);
//!
//! let grid = TimeDiscretization::uniform(0.0, 4, 0.5).unwrap();
//! assert_eq!(grid.index_nearest_less_or_equal(1.2), Some(2));
//!
//! assert_eq!(MaturityBucket::ALL.len(), 12);
//! assert_eq!(MaturityBucket::Y10.label(), "10y");
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Enable serialisation for classification enums and time keys

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod simm;
pub mod types;

pub use simm::{
    BucketSensitivities, CurveIndex, MaturityBucket, ProductClass, RiskClass, RiskType,
    SensitivityValue,
};
pub use types::{Currency, MarginError, RandomVariable, TimeDiscretization, TimeKey};
