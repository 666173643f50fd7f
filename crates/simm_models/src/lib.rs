//! # simm_models: Model and Product Seams (L2)
//!
//! The sensitivity engine treats the stochastic term-structure model, the
//! regression operator and the product valuation as external collaborators.
//! This crate defines those seams and ships two reference models:
//!
//! - [`model`]: [`TermStructureModel`], [`ModelId`], [`FactorId`] and the
//!   numeraire adjustment map
//! - [`regression`]: [`ConditionalExpectation`] and the least-squares
//!   [`RegressionEstimator`]
//! - [`product`]: [`SimmProduct`] (differentiable valuation), [`Gradient`],
//!   [`ProductClassification`]
//! - [`flat`]: [`FlatCurveModel`], a deterministic single-rate model
//! - [`libor`]: [`SimulatedLiborModel`], a single-factor lognormal forward-rate
//!   model with a spot-LIBOR numeraire
//!
//! ## Example
//!
//! ```
//! use simm_models::{FlatCurveModel, TermStructureModel};
//!
//! let model = FlatCurveModel::new(0.01, 0.5, 20).unwrap();
//! let n = model.numeraire(2.0).unwrap();
//! assert!((n.get(0) - (0.02_f64).exp()).abs() < 1e-12);
//! assert_eq!(model.number_of_forward_rates(), 20);
//! ```

#![warn(missing_docs)]

pub mod flat;
pub mod libor;
pub mod model;
pub mod product;
pub mod regression;

pub use flat::FlatCurveModel;
pub use libor::{SimulatedLiborModel, SimulatedLiborModelBuilder};
pub use model::{
    FactorId, ModelId, NumeraireAdjustment, NumeraireAdjustmentMap, TermStructureModel,
};
pub use product::{Gradient, ProductClassification, SimmProduct, Valuation};
pub use regression::{ConditionalExpectation, RegressionEstimator};
