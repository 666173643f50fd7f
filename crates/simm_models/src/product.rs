//! Differentiable product seam and SIMM product classification.

use crate::model::{FactorId, TermStructureModel};
use simm_core::simm::{CurveIndex, ProductClass, RiskClass};
use simm_core::types::{Currency, MarginError, RandomVariable};
use std::collections::HashMap;

/// Path-wise reverse-mode gradient of a product value.
///
/// Maps an AAD node to `dV/dx` for that node. Nodes the value does not
/// depend on are absent and read back as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradient {
    derivatives: HashMap<FactorId, RandomVariable>,
}

impl Gradient {
    /// Creates an empty gradient.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the derivative with respect to `factor`.
    pub fn insert(&mut self, factor: FactorId, derivative: RandomVariable) {
        self.derivatives.insert(factor, derivative);
    }

    /// Adds `derivative` to the derivative stored for `factor`.
    pub fn accumulate(&mut self, factor: FactorId, derivative: RandomVariable) {
        match self.derivatives.get_mut(&factor) {
            Some(existing) => *existing = &*existing + &derivative,
            None => {
                self.derivatives.insert(factor, derivative);
            }
        }
    }

    /// Derivative with respect to `factor`, if the value depends on it.
    pub fn get(&self, factor: FactorId) -> Option<&RandomVariable> {
        self.derivatives.get(&factor)
    }

    /// Derivative with respect to `factor`, zero if absent.
    pub fn derivative(&self, factor: FactorId) -> RandomVariable {
        self.derivatives
            .get(&factor)
            .cloned()
            .unwrap_or_else(RandomVariable::zero)
    }

    /// Number of nodes with a recorded derivative.
    pub fn len(&self) -> usize {
        self.derivatives.len()
    }

    /// Returns true if no derivative is recorded.
    pub fn is_empty(&self) -> bool {
        self.derivatives.is_empty()
    }

    /// Iterates `(node, derivative)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&FactorId, &RandomVariable)> {
        self.derivatives.iter()
    }
}

impl FromIterator<(FactorId, RandomVariable)> for Gradient {
    fn from_iter<I: IntoIterator<Item = (FactorId, RandomVariable)>>(iter: I) -> Self {
        Self {
            derivatives: iter.into_iter().collect(),
        }
    }
}

/// Result of a differentiable valuation.
#[derive(Debug, Clone)]
pub struct Valuation {
    /// Path-wise product value.
    pub value: RandomVariable,
    /// Reverse-mode gradient of `value` over all model nodes.
    pub gradient: Gradient,
}

/// SIMM classification of a product. Immutable after construction.
///
/// # Examples
///
/// ```
/// use simm_core::simm::{CurveIndex, ProductClass, RiskClass};
/// use simm_core::types::Currency;
/// use simm_models::ProductClassification;
///
/// let swap = ProductClassification::new(
///     ProductClass::RatesFx,
///     vec![RiskClass::InterestRate],
///     vec![CurveIndex::Ois, CurveIndex::libor_6m()],
///     Currency::eur(),
/// );
///
/// assert!(swap.applies_to(
///     ProductClass::RatesFx,
///     RiskClass::InterestRate,
///     &CurveIndex::libor_6m(),
///     "EUR",
/// ));
/// assert!(!swap.applies_to(
///     ProductClass::RatesFx,
///     RiskClass::InterestRate,
///     &CurveIndex::libor_6m(),
///     "USD",
/// ));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProductClassification {
    product_class: ProductClass,
    risk_classes: Vec<RiskClass>,
    curve_indices: Vec<CurveIndex>,
    currency: Currency,
    has_optionality: bool,
    bucket_key: Option<String>,
}

impl ProductClassification {
    /// Creates a linear product classification whose bucket is implied by
    /// its currency.
    pub fn new(
        product_class: ProductClass,
        risk_classes: Vec<RiskClass>,
        curve_indices: Vec<CurveIndex>,
        currency: Currency,
    ) -> Self {
        Self {
            product_class,
            risk_classes,
            curve_indices,
            currency,
            has_optionality: false,
            bucket_key: None,
        }
    }

    /// Marks the product as non-linear (vega and curvature become relevant).
    pub fn with_optionality(mut self, has_optionality: bool) -> Self {
        self.has_optionality = has_optionality;
        self
    }

    /// Sets an explicit SIMM bucket key (risk classes other than interest rate).
    pub fn with_bucket_key(mut self, bucket_key: impl Into<String>) -> Self {
        self.bucket_key = Some(bucket_key.into());
        self
    }

    /// SIMM product class.
    pub fn product_class(&self) -> ProductClass {
        self.product_class
    }

    /// Risk classes the product contributes to.
    pub fn risk_classes(&self) -> &[RiskClass] {
        &self.risk_classes
    }

    /// Curves the product is sensitive to.
    pub fn curve_indices(&self) -> &[CurveIndex] {
        &self.curve_indices
    }

    /// Product currency.
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Whether the product has optionality.
    pub fn has_optionality(&self) -> bool {
        self.has_optionality
    }

    /// Explicit bucket key, `None` when implied by the currency.
    pub fn bucket_key(&self) -> Option<&str> {
        self.bucket_key.as_deref()
    }

    /// Bucket key used to match queries: the explicit key, or the currency code.
    pub fn effective_bucket_key(&self) -> &str {
        self.bucket_key
            .as_deref()
            .unwrap_or_else(|| self.currency.code())
    }

    /// Returns true if the product carries the given risk class.
    pub fn has_risk_class(&self, risk_class: RiskClass) -> bool {
        self.risk_classes.contains(&risk_class)
    }

    /// Returns true if a query with these coordinates can have a non-zero
    /// sensitivity for this product.
    pub fn applies_to(
        &self,
        product_class: ProductClass,
        risk_class: RiskClass,
        curve: &CurveIndex,
        bucket_key: &str,
    ) -> bool {
        self.product_class == product_class
            && self.has_risk_class(risk_class)
            && self.curve_indices.contains(curve)
            && self.effective_bucket_key() == bucket_key
    }
}

/// A product that can be valued under a [`TermStructureModel`] with a full
/// reverse-mode gradient.
///
/// Payoff definitions live outside this workspace; implementors only need to
/// provide the valuation, the classification and the final maturity.
pub trait SimmProduct: Send {
    /// SIMM classification of the product.
    fn classification(&self) -> &ProductClassification;

    /// Time of the last cash flow. Margin is zero from this time on.
    fn final_maturity(&self) -> f64;

    /// Values the product as of `evaluation_time` under `model` and returns the
    /// gradient of the value with respect to every model node.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::ValuationFailure` if the valuation cannot be computed.
    fn value_with_gradient(
        &self,
        evaluation_time: f64,
        model: &dyn TermStructureModel,
    ) -> Result<Valuation, MarginError>;

    /// Drops product-specific state derived from a previous model, such as
    /// exercise decisions or cached underlying sensitivities.
    fn clear_extra_state(&mut self) {}
}

impl<P: SimmProduct + ?Sized> SimmProduct for Box<P> {
    fn classification(&self) -> &ProductClassification {
        (**self).classification()
    }

    fn final_maturity(&self) -> f64 {
        (**self).final_maturity()
    }

    fn value_with_gradient(
        &self,
        evaluation_time: f64,
        model: &dyn TermStructureModel,
    ) -> Result<Valuation, MarginError> {
        (**self).value_with_gradient(evaluation_time, model)
    }

    fn clear_extra_state(&mut self) {
        (**self).clear_extra_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_defaults_to_zero() {
        let mut gradient = Gradient::new();
        gradient.insert(FactorId(1), RandomVariable::deterministic(2.0));
        gradient.accumulate(FactorId(1), RandomVariable::deterministic(0.5));
        gradient.accumulate(FactorId(2), RandomVariable::deterministic(-1.0));

        assert_eq!(gradient.derivative(FactorId(1)).get(0), 2.5);
        assert_eq!(gradient.derivative(FactorId(2)).get(0), -1.0);
        assert!(gradient.derivative(FactorId(99)).is_zero());
        assert_eq!(gradient.len(), 2);
    }

    #[test]
    fn test_explicit_bucket_key() {
        let product = ProductClassification::new(
            ProductClass::Credit,
            vec![RiskClass::CreditQ],
            vec![CurveIndex::Ois],
            Currency::usd(),
        )
        .with_bucket_key("3")
        .with_optionality(true);

        assert_eq!(product.effective_bucket_key(), "3");
        assert!(product.has_optionality());
        assert!(product.applies_to(
            ProductClass::Credit,
            RiskClass::CreditQ,
            &CurveIndex::Ois,
            "3"
        ));
        assert!(!product.applies_to(
            ProductClass::RatesFx,
            RiskClass::CreditQ,
            &CurveIndex::Ois,
            "3"
        ));
    }
}
