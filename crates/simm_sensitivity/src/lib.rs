//! # simm_sensitivity: AAD Sensitivity Engine (L3)
//!
//! Extracts path-wise AAD gradients from a product valuation, projects them
//! onto forward-rate and OIS discount-bond pivots at arbitrary evaluation
//! times, maps them onto the SIMM interest-rate maturity ladder, and caches
//! the results so that every AAD pass and regression runs at most once per
//! distinct context.
//!
//! ## Components
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   SensitivityEngine<P>                   │
//! ├──────────────────────────────────────────────────────────┤
//! │  GradientProvider        - time-0 AAD gradient per model │
//! │  CurveSensitivityProjector - dV/dL, dV/dP at time t      │
//! │  SensitivityScheme       - pivots -> maturity buckets    │
//! │  SensitivityCache        - per-time + persistent tables  │
//! └──────────────────────────────────────────────────────────┘
//!          ↓
//! ┌──────────────────────────────────────────────────────────┐
//! │      simm_models: TermStructureModel, SimmProduct        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invalidation
//!
//! | Event | Gradient | Bucketed (per-time) | Exact (persistent) |
//! |-------|----------|---------------------|--------------------|
//! | Model change | recomputed | cleared | cleared |
//! | Scheme change | kept | cleared | cleared |
//! | Evaluation time change | kept | cleared | kept |
//!
//! ## Concurrency
//!
//! An engine owns all of its state and is meant for single-threaded use per
//! product. Independent engines can be driven from different threads.

#![warn(missing_docs)]

pub mod cache;
pub mod engine;
pub mod gradient;
pub mod interpolation;
pub mod ladder;
pub mod projector;
pub mod scheme;

pub use cache::{CacheStats, ExactDeltaKey, SensitivityCache};
pub use engine::{SensitivityEngine, SensitivityQuery, SensitivitySource};
pub use gradient::GradientProvider;
pub use interpolation::{interpolate_onto_pivot_grid, log_linear_bond_weights, BondInterpolation};
pub use ladder::map_to_ladder;
pub use projector::CurveSensitivityProjector;
pub use scheme::{
    BucketRequest, DeltaKind, ExactDeltaSource, LadderSensitivityScheme, SensitivityMode,
    SensitivityScheme, WeightMode,
};
