//! # simm_xva: Margin Orchestration (L4: Application)
//!
//! Initial margin profiles and the margin valuation adjustment (MVA) of
//! products whose sensitivities come from [`simm_sensitivity`].
//!
//! This crate provides:
//! - [`MarginOrchestrator`]: binds a product to a model and a sensitivity
//!   configuration, returns zero margin at or beyond maturity
//! - [`MarginAggregation`]: seam for the SIMM risk-weight formula, with the
//!   reference [`IrDeltaAggregation`]
//! - MVA with exact or expected margin ([`MvaMode`])
//! - [`MarginConfig`] loaded from TOML and `SIMM_*` environment variables
//! - Rayon-parallel portfolio MVA
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             simm_xva (L4)               │
//! ├─────────────────────────────────────────┤
//! │  config/       - MarginConfig, MvaConfig│
//! │  orchestrator/ - binding, IM(t)         │
//! │  aggregation/  - SIMM formula seam      │
//! │  mva/          - funding bond, MVA      │
//! │  portfolio/    - parallel MVA           │
//! └─────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────┐
//! │          simm_sensitivity (L3)          │
//! │  AAD projection and two-tier caching    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use simm_core::simm::{CurveIndex, ProductClass, RiskClass};
//! use simm_core::types::{Currency, MarginError, RandomVariable};
//! use simm_models::{
//!     FlatCurveModel, Gradient, ProductClassification, SimmProduct, TermStructureModel,
//!     Valuation,
//! };
//! use simm_xva::{IrDeltaAggregation, IrDeltaParameters, MarginConfig, MarginOrchestrator};
//! use std::sync::Arc;
//!
//! struct ZeroBond {
//!     classification: ProductClassification,
//! }
//!
//! impl SimmProduct for ZeroBond {
//!     fn classification(&self) -> &ProductClassification {
//!         &self.classification
//!     }
//!
//!     fn final_maturity(&self) -> f64 {
//!         2.0
//!     }
//!
//!     fn value_with_gradient(
//!         &self,
//!         _evaluation_time: f64,
//!         model: &dyn TermStructureModel,
//!     ) -> Result<Valuation, MarginError> {
//!         let mut gradient = Gradient::new();
//!         if let Some(adjustment) = model.numeraire_adjustments().get(2.0) {
//!             gradient.insert(adjustment.factor, RandomVariable::deterministic(-1.0));
//!         }
//!         Ok(Valuation { value: RandomVariable::zero(), gradient })
//!     }
//! }
//!
//! let product = ZeroBond {
//!     classification: ProductClassification::new(
//!         ProductClass::RatesFx,
//!         vec![RiskClass::InterestRate],
//!         vec![CurveIndex::Ois],
//!         Currency::eur(),
//!     ),
//! };
//! let aggregation = Arc::new(IrDeltaAggregation::new(IrDeltaParameters::flat(1.0, 0.5).unwrap()));
//! let mut orchestrator = MarginOrchestrator::new(product, MarginConfig::default(), aggregation);
//!
//! let model: Arc<dyn TermStructureModel> = Arc::new(FlatCurveModel::new(0.02, 0.5, 8).unwrap());
//! assert!(orchestrator.initial_margin(0.5, &model).unwrap().average() > 0.0);
//! assert!(orchestrator.initial_margin(2.0, &model).unwrap().is_zero());
//! ```

#![warn(missing_docs)]

pub mod aggregation;
pub mod config;
pub mod mva;
pub mod orchestrator;
pub mod portfolio;

pub use aggregation::{IrDeltaAggregation, IrDeltaParameters, MarginAggregation};
pub use config::{ConfigError, MarginConfig, MvaConfig};
pub use mva::{margin_valuation_adjustment, MvaMode};
pub use orchestrator::MarginOrchestrator;
pub use portfolio::{portfolio_mva, PortfolioMva};
