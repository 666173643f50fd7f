//! Time-0 AAD gradient ownership.
//!
//! The gradient of the product value at time 0 is the single AAD pass all
//! sensitivities at later evaluation times are derived from. It depends on
//! the model only, never on the evaluation time.

use simm_core::types::MarginError;
use simm_models::{Gradient, ModelId, NumeraireAdjustmentMap, SimmProduct, TermStructureModel};
use tracing::debug;

/// Lazily computed gradient bound to the model it was computed under.
#[derive(Debug, Default)]
pub struct GradientProvider {
    gradient: Option<Gradient>,
    model: Option<ModelId>,
    computations: u64,
}

impl GradientProvider {
    /// Creates a provider with no gradient.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure a gradient computed under `model` is available.
    ///
    /// Values the product at time 0, keeps the full reverse-mode gradient and
    /// merges the model's numeraire adjustment factors into `adjustments`.
    /// Returns `true` if a new gradient was computed, `false` if the cached
    /// one was still valid for `model`.
    ///
    /// # Errors
    ///
    /// Propagates the valuation failure. The provider is left without a
    /// gradient, so the next call retries the valuation.
    pub fn ensure<P: SimmProduct + ?Sized>(
        &mut self,
        product: &P,
        model: &dyn TermStructureModel,
        adjustments: &mut NumeraireAdjustmentMap,
    ) -> Result<bool, MarginError> {
        if self.gradient.is_some() && self.model == Some(model.id()) {
            return Ok(false);
        }

        self.gradient = None;
        self.model = Some(model.id());

        let valuation = product.value_with_gradient(0.0, model)?;
        adjustments.merge(&model.numeraire_adjustments());

        debug!(
            model = %model.id(),
            nodes = valuation.gradient.len(),
            "computed time-0 AAD gradient"
        );

        self.gradient = Some(valuation.gradient);
        self.computations += 1;
        Ok(true)
    }

    /// Gradient of `product` under `model`, computing it if needed.
    pub fn gradient<P: SimmProduct + ?Sized>(
        &mut self,
        product: &P,
        model: &dyn TermStructureModel,
        adjustments: &mut NumeraireAdjustmentMap,
    ) -> Result<&Gradient, MarginError> {
        self.ensure(product, model, adjustments)?;
        self.gradient.as_ref().ok_or_else(|| {
            MarginError::ValuationFailure("gradient unavailable after valuation".to_string())
        })
    }

    /// The current gradient, if computed.
    pub fn current(&self) -> Option<&Gradient> {
        self.gradient.as_ref()
    }

    /// Model the current gradient belongs to.
    pub fn model(&self) -> Option<ModelId> {
        self.model
    }

    /// Drops the gradient; the next [`ensure`](Self::ensure) recomputes it.
    pub fn invalidate(&mut self) {
        self.gradient = None;
        self.model = None;
    }

    /// Number of AAD passes performed so far.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}
