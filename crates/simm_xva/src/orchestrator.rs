//! Margin orchestration for a single product.
//!
//! [`MarginOrchestrator`] binds a product's [`SensitivityEngine`] to a model
//! and a sensitivity configuration and hands it to a [`MarginAggregation`].
//!
//! # Binding
//!
//! The orchestrator is either unbound or bound to a `(model, scheme)` pair.
//! A request with a different model, or after the configuration changed,
//! re-binds first:
//!
//! 1. the engine receives the scheme built from the configuration, which
//!    drops both cache tiers and the product's extra state;
//! 2. the engine is bound to the model, which recomputes the gradient if the
//!    model differs;
//! 3. the persistent sensitivity table is cleared.
//!
//! A failed re-binding leaves the orchestrator unbound, so the next request
//! tries again.

use crate::aggregation::MarginAggregation;
use crate::config::MarginConfig;
use crate::mva::margin_valuation_adjustment;
use simm_core::types::{MarginError, RandomVariable};
use simm_models::{ModelId, SimmProduct, TermStructureModel};
use simm_sensitivity::{LadderSensitivityScheme, SensitivityEngine};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
struct Binding {
    model: ModelId,
    scheme: LadderSensitivityScheme,
}

/// Initial margin and MVA of one product.
#[derive(Debug)]
pub struct MarginOrchestrator<P> {
    engine: SensitivityEngine<P>,
    config: MarginConfig,
    aggregation: Arc<dyn MarginAggregation>,
    binding: Option<Binding>,
    rebinds: u64,
}

impl<P: SimmProduct> MarginOrchestrator<P> {
    /// Creates an unbound orchestrator.
    pub fn new(product: P, config: MarginConfig, aggregation: Arc<dyn MarginAggregation>) -> Self {
        let scheme = Arc::new(config.sensitivity_scheme());
        Self {
            engine: SensitivityEngine::new(product, scheme),
            config,
            aggregation,
            binding: None,
            rebinds: 0,
        }
    }

    /// Replaces the aggregation used by later requests.
    pub fn with_aggregation(mut self, aggregation: Arc<dyn MarginAggregation>) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &MarginConfig {
        &self.config
    }

    /// Replaces the configuration. A changed sensitivity scheme takes effect
    /// through a re-binding on the next request.
    pub fn set_config(&mut self, config: MarginConfig) {
        self.config = config;
    }

    /// The sensitivity engine.
    pub fn engine(&self) -> &SensitivityEngine<P> {
        &self.engine
    }

    /// Mutable access to the sensitivity engine.
    ///
    /// Binding another model through the engine does not affect later
    /// requests: they re-bind to the model they are given.
    pub fn engine_mut(&mut self) -> &mut SensitivityEngine<P> {
        &mut self.engine
    }

    /// Whether the orchestrator is bound to a model.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Number of re-bindings so far.
    pub fn rebinds(&self) -> u64 {
        self.rebinds
    }

    /// Path-wise initial margin at `evaluation_time` under `model`.
    ///
    /// Exactly zero at or beyond the product's final maturity.
    ///
    /// # Errors
    ///
    /// Valuation failures and unsupported sensitivities requested by the
    /// aggregation are propagated unchanged.
    pub fn initial_margin(
        &mut self,
        evaluation_time: f64,
        model: &Arc<dyn TermStructureModel>,
    ) -> Result<RandomVariable, MarginError> {
        if evaluation_time >= self.engine.product().final_maturity() {
            return Ok(RandomVariable::zero());
        }
        self.ensure_bound(model, false)?;
        let aggregation = Arc::clone(&self.aggregation);
        aggregation.initial_margin(evaluation_time, &self.config.calculation_currency, &mut self.engine)
    }

    /// Initial margin computed with `aggregation`, which replaces the current
    /// one. Always re-binds.
    pub fn initial_margin_with_scheme(
        &mut self,
        evaluation_time: f64,
        model: &Arc<dyn TermStructureModel>,
        aggregation: Arc<dyn MarginAggregation>,
    ) -> Result<RandomVariable, MarginError> {
        if evaluation_time >= self.engine.product().final_maturity() {
            return Ok(RandomVariable::zero());
        }
        self.aggregation = aggregation;
        self.ensure_bound(model, true)?;
        let aggregation = Arc::clone(&self.aggregation);
        aggregation.initial_margin(evaluation_time, &self.config.calculation_currency, &mut self.engine)
    }

    /// Margin valuation adjustment of the product under `model`, using the
    /// MVA settings of the configuration.
    pub fn mva(&mut self, model: &Arc<dyn TermStructureModel>) -> Result<f64, MarginError> {
        let final_maturity = self.engine.product().final_maturity();
        let mva_config = self.config.mva.clone();
        margin_valuation_adjustment(final_maturity, &mva_config, model.as_ref(), |time| {
            self.initial_margin(time, model)
        })
    }

    fn ensure_bound(
        &mut self,
        model: &Arc<dyn TermStructureModel>,
        force: bool,
    ) -> Result<(), MarginError> {
        let target = Binding {
            model: model.id(),
            scheme: self.config.sensitivity_scheme(),
        };
        let engine_model = self.engine.model().map(|m| m.id());
        if !force && engine_model == Some(target.model) && self.binding.as_ref() == Some(&target) {
            return Ok(());
        }

        debug!(
            model = %target.model,
            previous = ?self.binding.as_ref().map(|b| b.model.value()),
            forced = force,
            "re-binding margin orchestrator"
        );
        self.binding = None;
        self.engine.set_scheme(Arc::new(target.scheme.clone()));
        self.engine.bind_model(Arc::clone(model))?;
        self.engine.clear_exact_cache();
        self.binding = Some(target);
        self.rebinds += 1;
        Ok(())
    }
}
